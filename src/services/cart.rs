use crate::{
    entities::{cart, cart_item, product, product_size, size},
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::{find_active_product, CatalogService},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// One cart line joined with its product and size.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLine {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_slug: String,
    pub product_size_id: Uuid,
    pub size_name: String,
    pub quantity: i32,
    pub stock: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartSummary {
    pub cart_id: Uuid,
    /// Newest first
    pub items: Vec<CartLine>,
    pub total_items: i64,
    pub subtotal: Decimal,
}

impl CartSummary {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AddToCartInput {
    pub slug: String,
    pub product_size_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct AddToCartOutcome {
    pub cart_item_id: Uuid,
    pub product_name: String,
    pub total_items: i64,
}

/// Sum of quantities and of line totals.
pub fn cart_totals(lines: &[CartLine]) -> (i64, Decimal) {
    lines.iter().fold((0i64, Decimal::ZERO), |(count, sum), line| {
        (count + i64::from(line.quantity), sum + line.total_price)
    })
}

/// Session-bound shopping carts.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    catalog: CatalogService,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        catalog: CatalogService,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
        }
    }

    /// Returns the cart stored in the session if it still belongs to this
    /// session key, otherwise the session's cart, creating it if needed.
    #[instrument(skip(self))]
    pub async fn resolve_cart(
        &self,
        session_key: &str,
        stored_cart_id: Option<Uuid>,
    ) -> Result<cart::Model, ServiceError> {
        if let Some(cart) = self.find_cart(session_key, stored_cart_id).await? {
            return Ok(cart);
        }

        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_key: Set(session_key.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::CartCreated { cart_id: cart.id })
            .await;
        info!(cart_id = %cart.id, "created cart");
        Ok(cart)
    }

    /// Non-creating variant of [`CartService::resolve_cart`].
    #[instrument(skip(self))]
    pub async fn find_cart(
        &self,
        session_key: &str,
        stored_cart_id: Option<Uuid>,
    ) -> Result<Option<cart::Model>, ServiceError> {
        if let Some(cart_id) = stored_cart_id {
            let stored = cart::Entity::find_by_id(cart_id)
                .filter(cart::Column::SessionKey.eq(session_key))
                .one(&*self.db)
                .await?;
            if stored.is_some() {
                return Ok(stored);
            }
        }

        Ok(cart::Entity::find()
            .filter(cart::Column::SessionKey.eq(session_key))
            .one(&*self.db)
            .await?)
    }

    /// Moves a cart to a new session key, e.g. after the session id is cycled on login.
    #[instrument(skip(self))]
    pub async fn rebind_session(
        &self,
        cart_id: Uuid,
        old_session_key: &str,
        new_session_key: &str,
    ) -> Result<(), ServiceError> {
        cart::Entity::update_many()
            .col_expr(cart::Column::SessionKey, Expr::value(new_session_key))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::SessionKey.eq(old_session_key))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Adds a product to the cart, merging with an existing line for the same size.
    #[instrument(skip(self))]
    pub async fn add_product(
        &self,
        cart_id: Uuid,
        input: AddToCartInput,
    ) -> Result<AddToCartOutcome, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let product = find_active_product(&txn, &input.slug).await?;
        let (product_size, _size) = self
            .catalog
            .resolve_size(&txn, &product, input.product_size_id)
            .await?;

        if product_size.stock < input.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Only {} items available",
                product_size.stock
            )));
        }

        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .filter(cart_item::Column::ProductSizeId.eq(product_size.id))
            .one(&txn)
            .await?;

        let item = match existing {
            Some(item) => {
                let merged = item.quantity + input.quantity;
                if merged > product_size.stock {
                    return Err(ServiceError::InsufficientStock(format!(
                        "Cannot add {} items. Only {} more available.",
                        input.quantity,
                        (product_size.stock - item.quantity).max(0)
                    )));
                }
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(merged);
                active.update(&txn).await?
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart_id),
                    product_id: Set(product.id),
                    product_size_id: Set(product_size.id),
                    quantity: Set(input.quantity),
                    added_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await?
            }
        };

        touch_cart(&txn, cart_id).await?;
        let total_items = total_items(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id,
                item_id: item.id,
                product_size_id: product_size.id,
                quantity: input.quantity,
            })
            .await;

        info!(
            %cart_id,
            product = %product.slug,
            quantity = input.quantity,
            "added product to cart"
        );
        Ok(AddToCartOutcome {
            cart_item_id: item.id,
            product_name: product.name,
            total_items,
        })
    }

    /// Sets a line's quantity; zero removes the line. Returns the new item count.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<i64, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError("Invalid quantity".to_string()));
        }

        let txn = self.db.begin().await?;

        let item = cart_item::Entity::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Item not found".to_string()))?;

        if quantity == 0 {
            item.delete(&txn).await?;
        } else {
            let product_size = product_size::Entity::find_by_id(item.product_size_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Size not found".to_string()))?;
            if quantity > product_size.stock {
                return Err(ServiceError::InsufficientStock(format!(
                    "Only {} items available",
                    product_size.stock
                )));
            }
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.update(&txn).await?;
        }

        touch_cart(&txn, cart_id).await?;
        let total_items = total_items(&txn, cart_id).await?;
        txn.commit().await?;

        let event = if quantity == 0 {
            Event::CartItemRemoved { cart_id, item_id }
        } else {
            Event::CartItemUpdated {
                cart_id,
                item_id,
                quantity,
            }
        };
        self.event_sender.send_or_log(event).await;

        Ok(total_items)
    }

    /// Deletes a line. Returns the new item count.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<i64, ServiceError> {
        let txn = self.db.begin().await?;
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidInput("Item not found".to_string()));
        }

        touch_cart(&txn, cart_id).await?;
        let total_items = total_items(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id, item_id })
            .await;
        Ok(total_items)
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;
        touch_cart(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart_id))
            .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn summary(&self, cart_id: Uuid) -> Result<CartSummary, ServiceError> {
        let items = load_lines(&*self.db, cart_id).await?;
        let (total_items, subtotal) = cart_totals(&items);
        Ok(CartSummary {
            cart_id,
            items,
            total_items,
            subtotal,
        })
    }
}

async fn touch_cart<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> Result<(), ServiceError> {
    cart::Entity::update_many()
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(cart_id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn total_items<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> Result<i64, ServiceError> {
    let items = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .all(conn)
        .await?;
    Ok(items.iter().map(|i| i64::from(i.quantity)).sum())
}

/// Loads the lines of a cart, newest first, with product and size details.
pub(crate) async fn load_lines<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<Vec<CartLine>, ServiceError> {
    let items = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_desc(cart_item::Column::AddedAt)
        .all(conn)
        .await?;

    if items.is_empty() {
        return Ok(Vec::new());
    }

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let size_ids: Vec<Uuid> = items.iter().map(|i| i.product_size_id).collect();

    let products: HashMap<Uuid, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let sizes: HashMap<Uuid, (product_size::Model, Option<size::Model>)> =
        product_size::Entity::find()
            .filter(product_size::Column::Id.is_in(size_ids))
            .find_also_related(size::Entity)
            .all(conn)
            .await?
            .into_iter()
            .map(|(ps, sz)| (ps.id, (ps, sz)))
            .collect();

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = products.get(&item.product_id).ok_or_else(|| {
            ServiceError::InternalError(format!("cart item {} has no product", item.id))
        })?;
        let (product_size, size) = sizes.get(&item.product_size_id).ok_or_else(|| {
            ServiceError::InternalError(format!("cart item {} has no size", item.id))
        })?;
        let unit_price = product_size.unit_price(product);
        lines.push(CartLine {
            item_id: item.id,
            product_id: product.id,
            product_name: product.name.clone(),
            product_slug: product.slug.clone(),
            product_size_id: product_size.id,
            size_name: size.as_ref().map(|s| s.name.clone()).unwrap_or_default(),
            quantity: item.quantity,
            stock: product_size.stock,
            unit_price,
            total_price: unit_price * Decimal::from(item.quantity),
            added_at: item.added_at,
        });
    }
    Ok(lines)
}
