//! GHL lead payload mapping.
//!
//! Projects a succeeded payment intent's metadata bag into the fixed lead
//! shape the GHL inbound webhook expects.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::stripe::{Metadata, PaymentIntent};

/// First name used when the landing page did not collect a business name.
pub const DEFAULT_FIRST_NAME: &str = "Business Owner";

/// Campaign status every new lead starts in.
pub const CAMPAIGN_STATUS_PENDING: &str = "pending";

/// Lead source tag reported to GHL.
pub const LEAD_SOURCE: &str = "localhire_landing_page";

/// Lead payload posted to GHL.
///
/// Optional fields are omitted from the JSON body when the metadata did not
/// carry them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPayload {
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    pub pay_per_hour: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<i64>,
    pub campaign_status: &'static str,

    pub stripe_payment_id: String,
    pub payment_amount: String,

    pub source: &'static str,
    pub submitted_at: String,
}

impl LeadPayload {
    /// Build a lead from a succeeded payment intent.
    pub fn from_payment_intent(intent: &PaymentIntent, submitted_at: DateTime<Utc>) -> Self {
        let metadata = &intent.metadata;
        let budget = metadata.get("budget").cloned();

        LeadPayload {
            first_name: non_empty(metadata, "businessName")
                .unwrap_or_else(|| DEFAULT_FIRST_NAME.to_string()),
            phone: metadata.get("phone").cloned(),
            email: non_empty(metadata, "email").unwrap_or_default(),

            job_title: metadata.get("jobTitle").cloned(),
            pay_per_hour: non_empty(metadata, "payPerHour").unwrap_or_default(),
            postcode: metadata.get("postcode").cloned(),

            daily_budget: budget.as_deref().and_then(daily_budget),
            budget,
            campaign_status: CAMPAIGN_STATUS_PENDING,

            stripe_payment_id: intent.id.clone(),
            payment_amount: format_payment_amount(intent.amount),

            source: LEAD_SOURCE,
            submitted_at: submitted_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

fn non_empty(metadata: &Metadata, key: &str) -> Option<String> {
    metadata.get(key).filter(|v| !v.is_empty()).cloned()
}

/// Daily budget in pence for a weekly budget in pounds, spread over nine days.
///
/// Returns `None` when the budget is blank or not a number.
pub fn daily_budget(budget: &str) -> Option<i64> {
    let budget = budget.trim();
    if budget.is_empty() {
        return None;
    }

    budget
        .parse::<f64>()
        .ok()
        .filter(|b| b.is_finite())
        .map(|b| (b * 100.0 / 9.0).floor() as i64)
}

/// Render an amount in minor units as a major-unit decimal string.
///
/// Trailing zeros are dropped: 9000 → "90", 9050 → "90.5", 9005 → "90.05".
pub fn format_payment_amount(minor_units: i64) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    let (major, fraction) = (abs / 100, abs % 100);

    match fraction {
        0 => format!("{}{}", sign, major),
        f if f % 10 == 0 => format!("{}{}.{}", sign, major, f / 10),
        f => format!("{}{}.{:02}", sign, major, f),
    }
}
