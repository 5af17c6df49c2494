use crate::{
    entities::{
        cart, cart_item,
        order::{self, OrderStatus},
        order_item, product_size, user,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::cart::{cart_totals, load_lines},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Customer details captured at checkout.
#[derive(Debug, Clone)]
pub struct CreateOrderInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address1: String,
    pub city: String,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub size_name: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub total_price: Decimal,
}

impl From<order_item::Model> for OrderLine {
    fn from(item: order_item::Model) -> Self {
        let total_price = item.total_price();
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name,
            size_name: item.size_name,
            quantity: item.quantity,
            price: item.price,
            total_price,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address1: String,
    pub city: String,
    pub special_instructions: Option<String>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub created_at: chrono::DateTime<Utc>,
    pub items: Vec<OrderLine>,
}

impl OrderView {
    fn new(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            first_name: order.first_name,
            last_name: order.last_name,
            email: order.email,
            phone: order.phone,
            address1: order.address1,
            city: order.city,
            special_instructions: order.special_instructions,
            status: order.status,
            total_amount: order.total_amount,
            created_at: order.created_at,
            items: items.into_iter().map(OrderLine::from).collect(),
        }
    }
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Turns the cart into an order.
    ///
    /// Runs as one transaction: the order and its frozen lines are written,
    /// stock is decremented with a guarded update, and the cart is deleted.
    /// Any shortfall rolls the whole checkout back.
    #[instrument(skip(self, input))]
    pub async fn create_order(
        &self,
        cart_id: Option<Uuid>,
        user_id: Option<Uuid>,
        input: CreateOrderInput,
    ) -> Result<order::Model, ServiceError> {
        let cart_id =
            cart_id.ok_or_else(|| ServiceError::ValidationError("Cart is empty".to_string()))?;

        let txn = self.db.begin().await?;

        let lines = load_lines(&txn, cart_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }
        let (_, subtotal) = cart_totals(&lines);

        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            first_name: Set(input.first_name),
            last_name: Set(input.last_name),
            email: Set(input.email),
            phone: Set(input.phone),
            address1: Set(input.address1),
            city: Set(input.city),
            special_instructions: Set(input
                .special_instructions
                .filter(|s| !s.trim().is_empty())),
            status: Set(OrderStatus::Pending),
            total_amount: Set(subtotal),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for line in &lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                product_size_id: Set(Some(line.product_size_id)),
                product_name: Set(line.product_name.clone()),
                size_name: Set(Some(line.size_name.clone()).filter(|s| !s.is_empty())),
                quantity: Set(line.quantity),
                price: Set(line.unit_price),
            }
            .insert(&txn)
            .await?;

            let updated = product_size::Entity::update_many()
                .col_expr(
                    product_size::Column::Stock,
                    Expr::col(product_size::Column::Stock).sub(line.quantity),
                )
                .filter(product_size::Column::Id.eq(line.product_size_id))
                .filter(product_size::Column::Stock.gte(line.quantity))
                .exec(&txn)
                .await?;

            if updated.rows_affected == 0 {
                let available = product_size::Entity::find_by_id(line.product_size_id)
                    .one(&txn)
                    .await?
                    .map(|ps| ps.stock)
                    .unwrap_or(0);
                warn!(
                    order_id = %order.id,
                    product = %line.product_slug,
                    requested = line.quantity,
                    available,
                    "stock shortfall at checkout"
                );
                return Err(ServiceError::InsufficientStock(format!(
                    "Only {} items available for {}",
                    available, line.product_name
                )));
            }
        }

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;
        cart::Entity::delete_by_id(cart_id).exec(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                user_id,
                total: order.total_amount,
            })
            .await;
        info!(order_id = %order.id, total = %order.total_amount, "order created");
        Ok(order)
    }

    /// Order with its lines; 404 if unknown.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::ProductName)
            .all(&*self.db)
            .await?;
        Ok(OrderView::new(order, items))
    }

    /// Orders placed by a user, newest first.
    #[instrument(skip(self))]
    pub async fn history(&self, user_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Order detail visible to its owner or to staff; anyone else gets 404.
    #[instrument(skip(self, viewer), fields(viewer = %viewer.id))]
    pub async fn detail_for(
        &self,
        viewer: &user::Model,
        order_id: Uuid,
    ) -> Result<OrderView, ServiceError> {
        let view = self.get_order(order_id).await?;
        if viewer.is_staff || view.user_id == Some(viewer.id) {
            Ok(view)
        } else {
            Err(ServiceError::NotFound("Order not found".to_string()))
        }
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let current = order.status;
        if current.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order is already {}",
                current
            )));
        }
        if !current.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot change order status from {} to {}",
                current, next
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(next);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: current.to_string(),
                new_status: next.to_string(),
            })
            .await;
        info!(%order_id, from = %current, to = %next, "order status updated");
        Ok(updated)
    }

    /// Confirms an order if it is still pending. Returns whether it changed.
    #[instrument(skip(self))]
    pub async fn confirm_if_pending(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(
                order::Column::Status,
                Expr::value(OrderStatus::Confirmed.as_str()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&*self.db)
            .await?;

        let confirmed = result.rows_affected > 0;
        if confirmed {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: OrderStatus::Pending.to_string(),
                    new_status: OrderStatus::Confirmed.to_string(),
                })
                .await;
        }
        Ok(confirmed)
    }
}
