mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, response_text, TestApp};
use rust_decimal_macros::dec;

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn request_ids_are_generated_and_echoed() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None).await;
    let generated = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .expect("generated request id");
    assert!(!generated.is_empty());

    let response = app
        .request_with_headers(
            Method::GET,
            "/catalog/products/missing/",
            None,
            &[("x-request-id", "req-surface-1")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "req-surface-1");
    let body = response_json(response).await;
    assert_eq!(body["request_id"], "req-surface-1");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn root_lists_products() {
    let app = TestApp::new().await;
    app.seed_product("Wool Scarf", "wool-scarf", dec!(12.50)).await;

    let response = app.request(Method::GET, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let response = app
        .request_with_headers(Method::GET, "/", None, &[("HX-Request", "true")])
        .await;
    assert!(response_text(response).await.contains("Wool Scarf"));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = response_json(response).await;
    assert!(doc["paths"].get("/orders/create/").is_some());
    assert!(doc["paths"].get("/payment/stripe/webhook/").is_some());
}
