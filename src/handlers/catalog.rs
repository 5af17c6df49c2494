use super::common::{map_service_error, negotiate};
use crate::{
    errors::ApiError,
    services::catalog::{ProductDetail, ProductSummary},
    views, AppState,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/products/", get(list_products))
        .route("/products/:slug/", get(get_product))
}

/// List active products
#[utoipa::path(
    get,
    path = "/catalog/products/",
    summary = "List products",
    description = "Active products ordered by name. Returns an HTML fragment when HX-Request is set.",
    responses(
        (status = 200, description = "Products retrieved", body = [ProductSummary]),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "catalog"
)]
pub async fn list_products(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let products = state
        .services
        .catalog
        .list_products()
        .await
        .map_err(map_service_error)?;

    let currency = &state.config.currency;
    Ok(negotiate(
        &headers,
        || views::product_list(&products, currency),
        &products,
    ))
}

/// Product with its sizes
#[utoipa::path(
    get,
    path = "/catalog/products/{slug}/",
    summary = "Get product",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Product retrieved", body = ProductDetail),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "catalog"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let product = state
        .services
        .catalog
        .get_product_by_slug(&slug)
        .await
        .map_err(map_service_error)?;

    let currency = &state.config.currency;
    Ok(negotiate(
        &headers,
        || views::product_detail(&product, currency),
        &product,
    ))
}
