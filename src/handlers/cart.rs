use super::common::{
    empty_string_as_none, is_htmx, map_service_error, negotiate, success_response,
    validate_input, JsonOrForm,
};
use crate::{
    entities::cart,
    errors::{ApiError, ServiceError},
    services::cart::{AddToCartInput, CartSummary},
    session, views, AppState,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const CART_MODAL_PATH: &str = "/cart/modal/";

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddToCartForm {
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Product size to add; the first size in stock when omitted
    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[schema(value_type = Option<String>, format = Uuid)]
    pub size_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateItemForm {
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/add/:slug/", post(add_to_cart))
        .route("/item/:id/update/", post(update_item))
        .route("/item/:id/remove/", post(remove_item))
        .route("/clear/", post(clear_cart))
        .route("/count/", get(cart_count))
        .route("/summary/", get(cart_summary))
        .route("/modal/", get(cart_modal))
}

/// Resolves the session's cart, creating it if needed, and remembers its id.
pub(crate) async fn current_cart(
    state: &AppState,
    session: &Session,
) -> Result<cart::Model, ServiceError> {
    let key = session::session_key(session).await?;
    let stored = session::cart_id(session).await?;
    let cart = state.services.cart.resolve_cart(&key, stored).await?;
    if stored != Some(cart.id) {
        session::set_cart_id(session, cart.id).await?;
    }
    Ok(cart)
}

async fn current_summary(state: &AppState, session: &Session) -> Result<CartSummary, ApiError> {
    let cart = current_cart(state, session)
        .await
        .map_err(map_service_error)?;
    state
        .services
        .cart
        .summary(cart.id)
        .await
        .map_err(map_service_error)
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/cart/add/{slug}/",
    summary = "Add to cart",
    description = "Adds a product size to the session cart, merging with an existing line. HTMX clients are redirected to the cart modal.",
    params(("slug" = String, Path, description = "Product slug")),
    request_body = AddToCartForm,
    responses(
        (status = 200, description = "Product added"),
        (status = 303, description = "Redirect to the cart modal (HTMX)"),
        (status = 400, description = "Invalid quantity or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or size not found", body = crate::errors::ErrorResponse),
    ),
    tag = "cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(slug): Path<String>,
    JsonOrForm(form): JsonOrForm<AddToCartForm>,
) -> Result<Response, ApiError> {
    validate_input(&form)?;

    let cart = current_cart(&state, &session)
        .await
        .map_err(map_service_error)?;
    let outcome = state
        .services
        .cart
        .add_product(
            cart.id,
            AddToCartInput {
                slug,
                product_size_id: form.size_id,
                quantity: form.quantity,
            },
        )
        .await
        .map_err(map_service_error)?;

    if is_htmx(&headers) {
        return Ok(Redirect::to(CART_MODAL_PATH).into_response());
    }

    Ok(success_response(json!({
        "success": true,
        "total_items": outcome.total_items,
        "message": format!("{} added to cart", outcome.product_name),
        "cart_item_id": outcome.cart_item_id,
    })))
}

/// Change the quantity of a cart line
#[utoipa::path(
    post,
    path = "/cart/item/{id}/update/",
    summary = "Update cart item",
    description = "Sets a line's quantity. Zero removes the line.",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    request_body = UpdateItemForm,
    responses(
        (status = 200, description = "Cart updated"),
        (status = 400, description = "Invalid quantity or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse),
    ),
    tag = "cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    session: Session,
    Path(item_id): Path<Uuid>,
    JsonOrForm(form): JsonOrForm<UpdateItemForm>,
) -> Result<Response, ApiError> {
    let cart = current_cart(&state, &session)
        .await
        .map_err(map_service_error)?;
    let total_items = state
        .services
        .cart
        .update_item(cart.id, item_id, form.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(json!({
        "success": true,
        "total_items": total_items,
        "message": "Cart updated",
    })))
}

/// Remove a line from the cart
#[utoipa::path(
    post,
    path = "/cart/item/{id}/remove/",
    summary = "Remove cart item",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Item removed; HTMX clients get the cart modal"),
        (status = 400, description = "Item not found", body = crate::errors::ErrorResponse),
    ),
    tag = "cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let cart = current_cart(&state, &session)
        .await
        .map_err(map_service_error)?;
    let total_items = state
        .services
        .cart
        .remove_item(cart.id, item_id)
        .await
        .map_err(map_service_error)?;

    if is_htmx(&headers) {
        let summary = state
            .services
            .cart
            .summary(cart.id)
            .await
            .map_err(map_service_error)?;
        return Ok(views::cart_modal(&summary, &state.config.currency).into_response());
    }

    Ok(success_response(json!({
        "success": true,
        "total_items": total_items,
        "message": "Item removed from cart",
    })))
}

/// Empty the cart
#[utoipa::path(
    post,
    path = "/cart/clear/",
    summary = "Clear cart",
    responses(
        (status = 200, description = "Cart cleared; HTMX clients get the empty cart fragment"),
    ),
    tag = "cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let cart = current_cart(&state, &session)
        .await
        .map_err(map_service_error)?;
    state
        .services
        .cart
        .clear(cart.id)
        .await
        .map_err(map_service_error)?;

    Ok(negotiate(
        &headers,
        views::empty_cart,
        json!({ "success": true, "message": "Cart cleared" }),
    ))
}

/// Item count and subtotal
#[utoipa::path(
    get,
    path = "/cart/count/",
    summary = "Cart count",
    responses((status = 200, description = "Total items and subtotal")),
    tag = "cart"
)]
pub async fn cart_count(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, ApiError> {
    let summary = current_summary(&state, &session).await?;
    Ok(success_response(json!({
        "total_items": summary.total_items,
        "subtotal": summary.subtotal.to_f64().unwrap_or_default(),
    })))
}

/// Cart contents, newest lines first
#[utoipa::path(
    get,
    path = "/cart/summary/",
    summary = "Cart summary",
    responses((status = 200, description = "Cart contents", body = CartSummary)),
    tag = "cart"
)]
pub async fn cart_summary(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let summary = current_summary(&state, &session).await?;
    let currency = &state.config.currency;
    Ok(negotiate(
        &headers,
        || views::cart_summary(&summary, currency),
        &summary,
    ))
}

/// Cart contents rendered for the cart modal
#[utoipa::path(
    get,
    path = "/cart/modal/",
    summary = "Cart modal",
    responses((status = 200, description = "Cart modal fragment or cart contents", body = CartSummary)),
    tag = "cart"
)]
pub async fn cart_modal(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let summary = current_summary(&state, &session).await?;
    let currency = &state.config.currency;
    Ok(negotiate(
        &headers,
        || views::cart_modal(&summary, currency),
        &summary,
    ))
}
