//! Integration tests for payment-provider callbacks and status pages.

mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{response_json, response_text, TestApp};
use hmac::{Hmac, Mac};
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, EntityTrait};
use serde_json::json;
use sha2::Sha256;
use storefront_api::entities::order::{self, OrderStatus};
use uuid::Uuid;

const STRIPE_SECRET: &str = "whsec_integration";
const HELEKET_SECRET: &str = "heleket_integration";

fn hmac_hex(secret: &str, timestamp: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

async fn pending_order(app: &TestApp) -> Uuid {
    let product = app.seed_product("Notebook", "notebook", dec!(6)).await;
    let size = app.seed_size("A5", 0).await;
    let ps = app.seed_product_size(&product, &size, 10, None).await;
    app.request(
        Method::POST,
        "/cart/add/notebook/",
        Some(json!({ "quantity": 1, "size_id": ps.id })),
    )
    .await;
    let body = response_json(
        app.request(
            Method::POST,
            "/orders/create/",
            Some(json!({
                "first_name": "Ayla",
                "last_name": "Karimova",
                "email": "ayla@example.com",
                "phone": "+994501234567",
                "address1": "28 May Street 5",
                "city": "Baku"
            })),
        )
        .await,
    )
    .await;
    Uuid::parse_str(body["order_id"].as_str().expect("order id")).expect("uuid")
}

async fn status_of(app: &TestApp, order_id: Uuid) -> OrderStatus {
    order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .expect("query order")
        .expect("order exists")
        .status
}

#[tokio::test]
async fn unsigned_heleket_payment_confirms_the_order_when_no_secret_is_set() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;

    let payload = json!({ "status": "paid", "order_id": order_id.to_string() }).to_string();
    let response = app
        .post_raw("/payment/heleket/webhook/", payload.as_bytes(), &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({ "received": true }));
    assert_eq!(status_of(&app, order_id).await, OrderStatus::Confirmed);

    // Replays leave the already confirmed order alone.
    let response = app
        .post_raw("/payment/heleket/webhook/", payload.as_bytes(), &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, order_id).await, OrderStatus::Confirmed);
}

#[tokio::test]
async fn non_payment_events_are_acknowledged_without_side_effects() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;

    let payload = json!({
        "type": "payment_intent.payment_failed",
        "data": { "object": { "metadata": { "order_id": order_id.to_string() } } }
    })
    .to_string();
    let response = app
        .post_raw("/payment/stripe/webhook/", payload.as_bytes(), &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, order_id).await, OrderStatus::Pending);
}

#[tokio::test]
async fn signed_stripe_webhook_is_verified() {
    let app = TestApp::with_config(|cfg| {
        cfg.stripe_webhook_secret = Some(STRIPE_SECRET.to_string());
    })
    .await;
    let order_id = pending_order(&app).await;

    let payload = json!({
        "type": "checkout.session.completed",
        "data": { "object": { "metadata": { "order_id": order_id.to_string() } } }
    })
    .to_string();
    let now = Utc::now().timestamp().to_string();

    let response = app
        .post_raw("/payment/stripe/webhook/", payload.as_bytes(), &[])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response_json(response).await["message"],
        "Invalid webhook signature"
    );

    let forged = format!("t={},v1={}", now, hmac_hex("wrong", &now, payload.as_bytes()));
    let response = app
        .post_raw(
            "/payment/stripe/webhook/",
            payload.as_bytes(),
            &[("Stripe-Signature", &forged)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let stale_ts = (Utc::now().timestamp() - 3_600).to_string();
    let stale = format!(
        "t={},v1={}",
        stale_ts,
        hmac_hex(STRIPE_SECRET, &stale_ts, payload.as_bytes())
    );
    let response = app
        .post_raw(
            "/payment/stripe/webhook/",
            payload.as_bytes(),
            &[("Stripe-Signature", &stale)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(status_of(&app, order_id).await, OrderStatus::Pending);

    let valid = format!(
        "t={},v1={}",
        now,
        hmac_hex(STRIPE_SECRET, &now, payload.as_bytes())
    );
    let response = app
        .post_raw(
            "/payment/stripe/webhook/",
            payload.as_bytes(),
            &[("Stripe-Signature", &valid)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, order_id).await, OrderStatus::Confirmed);
}

#[tokio::test]
async fn signed_body_that_is_not_json_is_a_bad_request() {
    let app = TestApp::with_config(|cfg| {
        cfg.stripe_webhook_secret = Some(STRIPE_SECRET.to_string());
    })
    .await;

    let payload = b"not json";
    let now = Utc::now().timestamp().to_string();
    let header = format!("t={},v1={}", now, hmac_hex(STRIPE_SECRET, &now, payload));
    let response = app
        .post_raw(
            "/payment/stripe/webhook/",
            payload,
            &[("Stripe-Signature", &header)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signed_heleket_webhook_is_verified() {
    let app = TestApp::with_config(|cfg| {
        cfg.heleket_webhook_secret = Some(HELEKET_SECRET.to_string());
    })
    .await;
    let order_id = pending_order(&app).await;

    let payload = json!({ "status": "paid_over", "order_id": order_id.to_string() }).to_string();
    let now = Utc::now().timestamp().to_string();

    let response = app
        .post_raw(
            "/payment/heleket/webhook/",
            payload.as_bytes(),
            &[("x-timestamp", &now)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong = hmac_hex(HELEKET_SECRET, &now, b"{}");
    let response = app
        .post_raw(
            "/payment/heleket/webhook/",
            payload.as_bytes(),
            &[("x-timestamp", &now), ("x-signature", &wrong)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(status_of(&app, order_id).await, OrderStatus::Pending);

    let signature = hmac_hex(HELEKET_SECRET, &now, payload.as_bytes());
    let response = app
        .post_raw(
            "/payment/heleket/webhook/",
            payload.as_bytes(),
            &[("x-timestamp", &now), ("x-signature", &signature)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, order_id).await, OrderStatus::Confirmed);
}

#[tokio::test]
async fn status_pages_render_for_json_and_htmx() {
    let app = TestApp::new().await;

    let cases = [
        ("/payment/stripe/success/", "success", "Payment successful"),
        ("/payment/stripe/cancel/", "cancelled", "Payment cancelled"),
        ("/payment/heleket/success/", "success", "Payment successful"),
        ("/payment/heleket/cancel/", "cancelled", "Payment cancelled"),
        ("/payment/heleket/processing/", "processing", "Payment processing"),
    ];
    for (uri, status, title) in cases {
        let response = app.request(Method::GET, uri, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let body = response_json(response).await;
        assert_eq!(body["status"], status);
        assert_eq!(body["title"], title);

        let response = app
            .request_with_headers(Method::GET, uri, None, &[("HX-Request", "true")])
            .await;
        let html = response_text(response).await;
        assert!(html.contains(title), "{uri}");
        assert!(html.contains("Back to shop"));
    }
}

#[tokio::test]
async fn storage_failure_asks_the_provider_to_retry() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;
    app.state
        .db
        .execute_unprepared("ALTER TABLE orders RENAME TO orders_offline")
        .await
        .expect("rename orders table");

    let payload = json!({ "status": "paid", "order_id": order_id.to_string() }).to_string();
    let response = app
        .post_raw("/payment/heleket/webhook/", payload.as_bytes(), &[])
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Database error");
}
