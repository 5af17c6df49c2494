use super::common::{map_service_error, negotiate};
use crate::{
    errors::ApiError,
    events::PaymentProvider,
    services::payments::WebhookSignature,
    views, AppState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/stripe/webhook/", post(stripe_webhook))
        .route("/stripe/success/", get(stripe_success))
        .route("/stripe/cancel/", get(stripe_cancel))
        .route("/heleket/webhook/", post(heleket_webhook))
        .route("/heleket/success/", get(heleket_success))
        .route("/heleket/cancel/", get(heleket_cancel))
        .route("/heleket/processing/", get(heleket_processing))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn signature_from(headers: &HeaderMap) -> WebhookSignature {
    WebhookSignature {
        stripe: header(headers, STRIPE_SIGNATURE_HEADER),
        timestamp: header(headers, TIMESTAMP_HEADER),
        signature: header(headers, SIGNATURE_HEADER),
    }
}

async fn receive(
    state: &AppState,
    provider: PaymentProvider,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ApiError> {
    state
        .services
        .payments
        .handle_webhook(provider, &signature_from(headers), body)
        .await
        .map_err(map_service_error)?;
    Ok((StatusCode::OK, Json(json!({ "received": true }))).into_response())
}

fn status_page(headers: &HeaderMap, status: &str, title: &str, message: &str) -> Response {
    negotiate(
        headers,
        || views::payment_status(title, message),
        json!({ "status": status, "title": title, "message": message }),
    )
}

/// Stripe event callback
#[utoipa::path(
    post,
    path = "/payment/stripe/webhook/",
    summary = "Stripe webhook",
    description = "Verifies the Stripe-Signature header when a secret is configured. Payment-succeeded events confirm the referenced pending order.",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event received"),
        (status = 400, description = "Body is not JSON", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid webhook signature", body = crate::errors::ErrorResponse),
    ),
    tag = "payment"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    receive(&state, PaymentProvider::Stripe, &headers, &body).await
}

/// Heleket event callback
#[utoipa::path(
    post,
    path = "/payment/heleket/webhook/",
    summary = "Heleket webhook",
    description = "Verifies x-timestamp / x-signature when a secret is configured. Paid statuses confirm the referenced pending order.",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event received"),
        (status = 400, description = "Body is not JSON", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid webhook signature", body = crate::errors::ErrorResponse),
    ),
    tag = "payment"
)]
pub async fn heleket_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    receive(&state, PaymentProvider::Heleket, &headers, &body).await
}

#[utoipa::path(get, path = "/payment/stripe/success/", responses((status = 200, description = "Payment succeeded")), tag = "payment")]
pub async fn stripe_success(headers: HeaderMap) -> Response {
    status_page(
        &headers,
        "success",
        "Payment successful",
        "Thank you! Your payment has been received.",
    )
}

#[utoipa::path(get, path = "/payment/stripe/cancel/", responses((status = 200, description = "Payment cancelled")), tag = "payment")]
pub async fn stripe_cancel(headers: HeaderMap) -> Response {
    status_page(
        &headers,
        "cancelled",
        "Payment cancelled",
        "Your payment was cancelled. Your order has not been paid.",
    )
}

#[utoipa::path(get, path = "/payment/heleket/success/", responses((status = 200, description = "Payment succeeded")), tag = "payment")]
pub async fn heleket_success(headers: HeaderMap) -> Response {
    status_page(
        &headers,
        "success",
        "Payment successful",
        "Thank you! Your crypto payment has been received.",
    )
}

#[utoipa::path(get, path = "/payment/heleket/cancel/", responses((status = 200, description = "Payment cancelled")), tag = "payment")]
pub async fn heleket_cancel(headers: HeaderMap) -> Response {
    status_page(
        &headers,
        "cancelled",
        "Payment cancelled",
        "Your crypto payment was cancelled.",
    )
}

#[utoipa::path(get, path = "/payment/heleket/processing/", responses((status = 200, description = "Payment processing")), tag = "payment")]
pub async fn heleket_processing(headers: HeaderMap) -> Response {
    status_page(
        &headers,
        "processing",
        "Payment processing",
        "Your payment is being confirmed on the network. This can take a few minutes.",
    )
}
