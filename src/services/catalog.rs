use crate::{
    config::AppConfig,
    entities::{product, product_size, size, size::DEFAULT_SIZE_NAME},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// A purchasable size of a product, with its effective price.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SizeOption {
    pub product_size_id: Uuid,
    pub size_id: Uuid,
    pub name: String,
    pub display_order: i32,
    pub stock: i32,
    pub price: Decimal,
    pub in_stock: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductDetail {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub sizes: Vec<SizeOption>,
}

impl From<product::Model> for ProductSummary {
    fn from(p: product::Model) -> Self {
        Self {
            id: p.id,
            name: p.name,
            slug: p.slug,
            price: p.price,
        }
    }
}

/// Read-only access to the product catalog, plus default size provisioning.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    /// Active products ordered by name.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<ProductSummary>, ServiceError> {
        let products = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(products.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<ProductDetail, ServiceError> {
        let product = find_active_product(&*self.db, slug).await?;
        let sizes = sizes_for(&*self.db, &product).await?;
        Ok(ProductDetail {
            id: product.id,
            name: product.name,
            slug: product.slug,
            description: product.description,
            price: product.price,
            sizes,
        })
    }

    /// Picks the product size an add-to-cart request refers to.
    ///
    /// An explicit `product_size_id` must belong to the product and be in
    /// stock. Without one, the first in-stock size (by display order) is used;
    /// a product with no sizes at all gets a default size provisioned.
    #[instrument(skip(self, conn, product), fields(product = %product.slug))]
    pub async fn resolve_size<C: ConnectionTrait>(
        &self,
        conn: &C,
        product: &product::Model,
        product_size_id: Option<Uuid>,
    ) -> Result<(product_size::Model, size::Model), ServiceError> {
        if let Some(id) = product_size_id {
            let (ps, sz) = product_size::Entity::find_by_id(id)
                .filter(product_size::Column::ProductId.eq(product.id))
                .find_also_related(size::Entity)
                .one(conn)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Size not found".to_string()))?;
            let sz = sz.ok_or_else(|| ServiceError::NotFound("Size not found".to_string()))?;
            if !ps.in_stock() {
                return Err(ServiceError::InsufficientStock(format!(
                    "Size \"{}\" is temporarily out of stock",
                    sz.name
                )));
            }
            return Ok((ps, sz));
        }

        let sizes = product_size::Entity::find()
            .filter(product_size::Column::ProductId.eq(product.id))
            .find_also_related(size::Entity)
            .order_by_asc(size::Column::DisplayOrder)
            .all(conn)
            .await?;

        if sizes.is_empty() {
            return self.provision_default_size(conn, product).await;
        }

        sizes
            .into_iter()
            .find_map(|(ps, sz)| match sz {
                Some(sz) if ps.in_stock() => Some((ps, sz)),
                _ => None,
            })
            .ok_or_else(|| {
                ServiceError::InsufficientStock(format!(
                    "Product \"{}\" is temporarily out of stock",
                    product.name
                ))
            })
    }

    async fn provision_default_size<C: ConnectionTrait>(
        &self,
        conn: &C,
        product: &product::Model,
    ) -> Result<(product_size::Model, size::Model), ServiceError> {
        let default_size = match size::Entity::find()
            .filter(size::Column::Name.eq(DEFAULT_SIZE_NAME))
            .one(conn)
            .await?
        {
            Some(existing) => existing,
            None => {
                size::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    name: Set(DEFAULT_SIZE_NAME.to_string()),
                    display_order: Set(0),
                }
                .insert(conn)
                .await?
            }
        };

        let product_size = product_size::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            size_id: Set(default_size.id),
            stock: Set(self.config.default_size_stock),
            price: Set(None),
        }
        .insert(conn)
        .await?;

        info!(
            product = %product.slug,
            stock = product_size.stock,
            "provisioned default size"
        );
        Ok((product_size, default_size))
    }
}

pub(crate) async fn find_active_product<C: ConnectionTrait>(
    conn: &C,
    slug: &str,
) -> Result<product::Model, ServiceError> {
    product::Entity::find()
        .filter(product::Column::Slug.eq(slug))
        .filter(product::Column::IsActive.eq(true))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
}

async fn sizes_for<C: ConnectionTrait>(
    conn: &C,
    product: &product::Model,
) -> Result<Vec<SizeOption>, ServiceError> {
    let rows = product_size::Entity::find()
        .filter(product_size::Column::ProductId.eq(product.id))
        .find_also_related(size::Entity)
        .order_by_asc(size::Column::DisplayOrder)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(ps, sz)| {
            sz.map(|sz| SizeOption {
                product_size_id: ps.id,
                size_id: sz.id,
                name: sz.name,
                display_order: sz.display_order,
                stock: ps.stock,
                price: ps.unit_price(product),
                in_stock: ps.in_stock(),
            })
        })
        .collect())
}
