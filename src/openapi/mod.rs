use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront API

Backend of a small storefront: catalog browsing, a session-bound shopping cart,
checkout, user accounts and payment-provider callbacks.

## Sessions

Cart identity and login state live in a server-side session. The session id travels
in the `id` cookie; send it back on every request.

## Content negotiation

Endpoints answer JSON by default. Requests carrying `HX-Request: true` get an HTML
fragment instead where one exists (cart modal, cart summary, checkout, order pages).

## Error Handling

```json
{
  "success": false,
  "error": "Bad Request",
  "message": "Only 3 items available",
  "request_id": "5f0c6f3e-...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    tags(
        (name = "catalog", description = "Product catalog"),
        (name = "cart", description = "Session shopping cart"),
        (name = "orders", description = "Checkout and order lifecycle"),
        (name = "users", description = "Accounts and login"),
        (name = "payment", description = "Payment provider callbacks and return pages"),
        (name = "health", description = "Health check")
    ),
    paths(
        crate::handlers::health::health_check,

        // Catalog
        crate::handlers::catalog::list_products,
        crate::handlers::catalog::get_product,

        // Cart
        crate::handlers::cart::add_to_cart,
        crate::handlers::cart::update_item,
        crate::handlers::cart::remove_item,
        crate::handlers::cart::clear_cart,
        crate::handlers::cart::cart_count,
        crate::handlers::cart::cart_summary,
        crate::handlers::cart::cart_modal,

        // Orders
        crate::handlers::orders::checkout,
        crate::handlers::orders::create_order,
        crate::handlers::orders::order_success,
        crate::handlers::orders::order_history,
        crate::handlers::orders::order_detail,
        crate::handlers::orders::update_order_status,

        // Users
        crate::handlers::users::register,
        crate::handlers::users::login,
        crate::handlers::users::logout,
        crate::handlers::users::profile,
        crate::handlers::users::account_details,
        crate::handlers::users::update_account,

        // Payment
        crate::handlers::payment::stripe_webhook,
        crate::handlers::payment::stripe_success,
        crate::handlers::payment::stripe_cancel,
        crate::handlers::payment::heleket_webhook,
        crate::handlers::payment::heleket_success,
        crate::handlers::payment::heleket_cancel,
        crate::handlers::payment::heleket_processing,
    ),
    components(
        schemas(
            crate::services::catalog::ProductSummary,
            crate::services::catalog::ProductDetail,
            crate::services::catalog::SizeOption,
            crate::services::cart::CartSummary,
            crate::services::cart::CartLine,
            crate::services::orders::OrderView,
            crate::services::orders::OrderLine,
            crate::services::users::RegisterInput,
            crate::services::users::LoginInput,
            crate::services::users::UpdateAccountInput,
            crate::services::users::UserProfile,
            crate::entities::order::OrderStatus,
            crate::handlers::cart::AddToCartForm,
            crate::handlers::cart::UpdateItemForm,
            crate::handlers::orders::CreateOrderForm,
            crate::handlers::orders::UpdateStatusForm,
            crate::handlers::health::HealthResponse,
            crate::handlers::health::ComponentStatus,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url(OPENAPI_JSON_PATH, ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from(OPENAPI_JSON_PATH).try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_storefront_paths() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/cart/add/{slug}/"));
        assert!(json.contains("/orders/create/"));
        assert!(json.contains("/payment/heleket/webhook/"));
    }
}
