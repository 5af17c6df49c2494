#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth::hash_password,
    build_router,
    config::{AppConfig, SessionBackend},
    db,
    entities::{cart, order, product, product_size, size, user},
    events::{self, EventSender},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "id";

/// Helper harness: the full router over a fresh in-memory SQLite database,
/// with a single-client cookie jar so the session survives across requests.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    cookie: Mutex<Option<String>>,
    _event_task: tokio::task::JoinHandle<()>,
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.cors_allow_any_origin = true;
    cfg.session_backend = SessionBackend::Memory;
    cfg
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = test_config();
        customize(&mut cfg);

        let pool = db::connect(&cfg)
            .await
            .expect("failed to create test database");
        db::migrate(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), Arc::new(cfg), event_sender);
        let router = build_router(state.clone());

        Self {
            router,
            state,
            cookie: Mutex::new(None),
            _event_task: event_task,
        }
    }

    /// Forget the session cookie, as a new browser would.
    pub fn clear_cookies(&self) {
        *self.cookie.lock().unwrap() = None;
    }

    pub fn session_cookie(&self) -> Option<String> {
        self.cookie.lock().unwrap().clone()
    }

    fn remember_cookie(&self, response: &Response) {
        for value in response.headers().get_all(header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or_default().trim();
            if let Some(id) = pair.strip_prefix(&format!("{}=", SESSION_COOKIE)) {
                let mut jar = self.cookie.lock().unwrap();
                *jar = if id.is_empty() { None } else { Some(pair.to_string()) };
            }
        }
    }

    async fn send(&self, mut builder: axum::http::request::Builder, body: Body) -> Response {
        if let Some(cookie) = self.session_cookie() {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = builder.body(body).expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");
        self.remember_cookie(&response);
        response
    }

    /// JSON request (or bodiless when `body` is `None`).
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
            }
            None => Body::empty(),
        };
        self.send(builder, body).await
    }

    /// urlencoded form POST, optionally as an HTMX request.
    pub async fn post_form(&self, uri: &str, form: &str, htmx: bool) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if htmx {
            builder = builder.header("HX-Request", "true");
        }
        self.send(builder, Body::from(form.to_string())).await
    }

    /// Raw body POST with extra headers, used for webhooks.
    pub async fn post_raw(&self, uri: &str, payload: &[u8], headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder, Body::from(payload.to_vec())).await
    }

    pub async fn seed_product(&self, name: &str, slug: &str, price: Decimal) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            slug: Set(slug.to_string()),
            description: Set(Some(format!("{} seeded for tests", name))),
            price: Set(price),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_size(&self, name: &str, display_order: i32) -> size::Model {
        size::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            display_order: Set(display_order),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed size")
    }

    pub async fn seed_product_size(
        &self,
        product: &product::Model,
        size: &size::Model,
        stock: i32,
        price: Option<Decimal>,
    ) -> product_size::Model {
        product_size::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            size_id: Set(size.id),
            stock: Set(stock),
            price: Set(price),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product size")
    }

    pub async fn seed_user(&self, email: &str, password: &str, is_staff: bool) -> user::Model {
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            password_hash: Set(hash_password(password).expect("hash password")),
            first_name: Set("Test".to_string()),
            last_name: Set("User".to_string()),
            company: Set(None),
            address1: Set(None),
            address2: Set(None),
            city: Set(None),
            country: Set(None),
            province: Set(None),
            postal_code: Set(None),
            phone: Set(None),
            is_active: Set(true),
            is_staff: Set(is_staff),
            date_joined: Set(Utc::now()),
            last_login: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user")
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.request(
            Method::POST,
            "/users/login/",
            Some(serde_json::json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn stock_of(&self, product_size_id: Uuid) -> i32 {
        product_size::Entity::find_by_id(product_size_id)
            .one(&*self.state.db)
            .await
            .expect("query product size")
            .expect("product size exists")
            .stock
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(&*self.state.db)
            .await
            .expect("count orders")
    }

    pub async fn cart_count(&self) -> u64 {
        cart::Entity::find()
            .count(&*self.state.db)
            .await
            .expect("count carts")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
