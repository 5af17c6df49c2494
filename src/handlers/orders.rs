use super::common::{map_service_error, negotiate, success_response, validate_input, JsonOrForm};
use crate::{
    auth::{CurrentUser, MaybeUser, StaffUser},
    entities::order::OrderStatus,
    errors::{ApiError, ServiceError},
    services::{
        orders::{CreateOrderInput, OrderView},
        trimmed,
    },
    session, views, AppState,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderForm {
    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters."))]
    #[serde(deserialize_with = "trimmed")]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters."))]
    #[serde(deserialize_with = "trimmed")]
    pub last_name: String,
    #[validate(email(message = "Enter a valid email address."))]
    #[serde(deserialize_with = "trimmed")]
    pub email: String,
    #[validate(length(min = 1, max = 20, message = "Phone must be 1-20 characters."))]
    #[serde(deserialize_with = "trimmed")]
    pub phone: String,
    #[validate(length(min = 1, max = 255, message = "Address must be 1-255 characters."))]
    #[serde(deserialize_with = "trimmed")]
    pub address1: String,
    #[validate(length(min = 1, max = 100, message = "City must be 1-100 characters."))]
    #[serde(deserialize_with = "trimmed")]
    pub city: String,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

impl From<CreateOrderForm> for CreateOrderInput {
    fn from(form: CreateOrderForm) -> Self {
        Self {
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            email: form.email.trim().to_string(),
            phone: form.phone.trim().to_string(),
            address1: form.address1.trim().to_string(),
            city: form.city.trim().to_string(),
            special_instructions: form.special_instructions,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusForm {
    /// pending, confirmed, shipped, delivered or cancelled
    pub status: String,
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout/", get(checkout))
        .route("/create/", post(create_order))
        .route("/success/:id/", get(order_success))
        .route("/history/", get(order_history))
        .route("/detail/:id/", get(order_detail))
        .route("/:id/status/", post(update_order_status))
}

/// Id of the session's cart, without creating one.
async fn existing_cart_id(state: &AppState, session: &Session) -> Result<Option<Uuid>, ServiceError> {
    if session.id().is_none() {
        return Ok(None);
    }
    let key = session::session_key(session).await?;
    let stored = session::cart_id(session).await?;
    Ok(state
        .services
        .cart
        .find_cart(&key, stored)
        .await?
        .map(|cart| cart.id))
}

/// Checkout page data
#[utoipa::path(
    get,
    path = "/orders/checkout/",
    summary = "Checkout",
    description = "Cart contents for checkout. Redirects to / when the cart is missing or empty.",
    responses(
        (status = 200, description = "Checkout fragment or cart summary"),
        (status = 303, description = "Cart is empty"),
    ),
    tag = "orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Some(cart_id) = existing_cart_id(&state, &session)
        .await
        .map_err(map_service_error)?
    else {
        return Ok(Redirect::to("/").into_response());
    };

    let summary = state
        .services
        .cart
        .summary(cart_id)
        .await
        .map_err(map_service_error)?;
    if summary.is_empty() {
        return Ok(Redirect::to("/").into_response());
    }

    let currency = &state.config.currency;
    Ok(negotiate(
        &headers,
        || views::checkout(&summary, currency),
        &summary,
    ))
}

/// Place an order from the session cart
#[utoipa::path(
    post,
    path = "/orders/create/",
    summary = "Create order",
    description = "Turns the session cart into a pending order, decrements stock and deletes the cart.",
    request_body = CreateOrderForm,
    responses(
        (status = 200, description = "Order placed"),
        (status = 400, description = "Invalid form, empty cart or insufficient stock", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    session: Session,
    MaybeUser(user): MaybeUser,
    JsonOrForm(form): JsonOrForm<CreateOrderForm>,
) -> Result<Response, ApiError> {
    validate_input(&form)?;

    let cart_id = existing_cart_id(&state, &session)
        .await
        .map_err(map_service_error)?;
    let order = state
        .services
        .orders
        .create_order(cart_id, user.map(|u| u.id), form.into())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(json!({
        "success": true,
        "message": "Order placed successfully!",
        "order_id": order.id,
        "redirect_url": format!("/orders/success/{}/", order.id),
    })))
}

/// Order confirmation
#[utoipa::path(
    get,
    path = "/orders/success/{id}/",
    summary = "Order success",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items", body = OrderView),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn order_success(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .orders
        .get_order(order_id)
        .await
        .map_err(map_service_error)?;

    let currency = &state.config.currency;
    Ok(negotiate(
        &headers,
        || views::order_success(&order, currency),
        &order,
    ))
}

/// The logged-in user's orders, newest first
#[utoipa::path(
    get,
    path = "/orders/history/",
    summary = "Order history",
    responses(
        (status = 200, description = "Orders of the current user"),
        (status = 401, description = "Authentication required", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn order_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let orders = state
        .services
        .orders
        .history(user.id)
        .await
        .map_err(map_service_error)?;

    let currency = &state.config.currency;
    Ok(negotiate(
        &headers,
        || views::order_history(&orders, currency),
        &orders,
    ))
}

/// Order detail for its owner or staff
#[utoipa::path(
    get,
    path = "/orders/detail/{id}/",
    summary = "Order detail",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items", body = OrderView),
        (status = 401, description = "Authentication required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn order_detail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .orders
        .detail_for(&user, order_id)
        .await
        .map_err(map_service_error)?;

    let currency = &state.config.currency;
    Ok(negotiate(
        &headers,
        || views::order_detail(&order, currency),
        &order,
    ))
}

/// Move an order through its lifecycle
#[utoipa::path(
    post,
    path = "/orders/{id}/status/",
    summary = "Update order status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateStatusForm,
    responses(
        (status = 200, description = "Status updated"),
        (status = 400, description = "Unknown status or transition not allowed", body = crate::errors::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::errors::ErrorResponse),
        (status = 403, description = "Staff access required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Path(order_id): Path<Uuid>,
    JsonOrForm(form): JsonOrForm<UpdateStatusForm>,
) -> Result<Response, ApiError> {
    let next: OrderStatus = form
        .status
        .parse()
        .map_err(|e: String| map_service_error(ServiceError::InvalidStatus(e)))?;

    let order = state
        .services
        .orders
        .update_status(order_id, next)
        .await
        .map_err(map_service_error)?;

    tracing::info!(%order_id, staff = %staff.id, status = %order.status, "status changed by staff");
    Ok(success_response(json!({
        "success": true,
        "message": format!("Order status updated to {}", order.status.label()),
        "order_id": order.id,
        "status": order.status,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> CreateOrderForm {
        CreateOrderForm {
            first_name: "Ayla".into(),
            last_name: "Karimova".into(),
            email: "ayla@example.com".into(),
            phone: "+994501234567".into(),
            address1: "28 May Street 5".into(),
            city: "Baku".into(),
            special_instructions: None,
        }
    }

    #[test]
    fn checkout_form_rules() {
        assert!(form().validate().is_ok());
        assert!(CreateOrderForm { email: "nope".into(), ..form() }.validate().is_err());
        assert!(CreateOrderForm { phone: "1".repeat(21), ..form() }.validate().is_err());
        assert!(CreateOrderForm { city: String::new(), ..form() }.validate().is_err());
    }

    #[test]
    fn whitespace_only_fields_fail_length_rules() {
        let form: CreateOrderForm = serde_json::from_value(json!({
            "first_name": "   ",
            "last_name": "Karimova",
            "email": " ayla@example.com ",
            "phone": "+994501234567",
            "address1": "   ",
            "city": "  "
        }))
        .unwrap();
        assert_eq!(form.email, "ayla@example.com");
        let errors = form.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("address1"));
        assert!(fields.contains_key("city"));
        assert!(!fields.contains_key("email"));
    }

    #[test]
    fn form_values_are_trimmed() {
        let input: CreateOrderInput = CreateOrderForm {
            first_name: "  Ayla ".into(),
            ..form()
        }
        .into();
        assert_eq!(input.first_name, "Ayla");
    }
}
