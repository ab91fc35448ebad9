//! Route table.

use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use super::handlers::{
    create_payment_intent, health, method_not_allowed, payment_preflight, stripe_webhook,
    AppState,
};

pub const PAYMENT_PATH: &str = "/api/payment";
pub const WEBHOOK_PATH: &str = "/api/webhook";

const CORS_ALLOW_METHODS: &str = "GET,OPTIONS,POST,PUT";
const CORS_ALLOW_HEADERS: &str =
    "X-CSRF-Token, X-Requested-With, Accept, Content-Type, Authorization";

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(payment_routes())
        .route(
            WEBHOOK_PATH,
            post(stripe_webhook).fallback(method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Payment route with permissive CORS headers on every response.
///
/// The browser calls this endpoint directly from the landing page, so the
/// headers are set on 405s and errors as well as successes.
fn payment_routes() -> Router<AppState> {
    Router::new()
        .route(
            PAYMENT_PATH,
            post(create_payment_intent)
                .options(payment_preflight)
                .fallback(method_not_allowed),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        ))
}
