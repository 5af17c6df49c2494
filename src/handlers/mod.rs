pub mod cart;
pub mod catalog;
pub mod common;
pub mod health;
pub mod orders;
pub mod payment;
pub mod users;

use crate::{
    config::AppConfig,
    events::EventSender,
    services::{CartService, CatalogService, OrderService, PaymentService, UserService},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub users: Arc<UserService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        let catalog = CatalogService::new(db.clone(), config.clone());
        let cart = CartService::new(db.clone(), event_sender.clone(), catalog.clone());
        let orders = OrderService::new(db.clone(), event_sender.clone());
        let users = UserService::new(db, event_sender.clone());
        let payments = PaymentService::new(
            orders.clone(),
            event_sender,
            config.stripe_webhook_secret.clone(),
            config.heleket_webhook_secret.clone(),
            config.webhook_tolerance_secs,
        );

        Self {
            catalog: Arc::new(catalog),
            cart: Arc::new(cart),
            orders: Arc::new(orders),
            users: Arc::new(users),
            payments: Arc::new(payments),
        }
    }
}
