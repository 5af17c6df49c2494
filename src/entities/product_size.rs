use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sized variant of a product; `stock` is the remaining quantity.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_sizes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub size_id: Uuid,
    pub stock: i32,
    /// Overrides the product price when set
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub price: Option<Decimal>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::size::Entity",
        from = "Column::SizeId",
        to = "super::size::Column::Id"
    )]
    Size,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::size::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Size.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Effective unit price: the size override, else the product price.
    pub fn unit_price(&self, product: &super::product::Model) -> Decimal {
        self.price.unwrap_or(product.price)
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn product(price: Decimal) -> super::super::product::Model {
        super::super::product::Model {
            id: Uuid::new_v4(),
            name: "Linen Shirt".into(),
            slug: "linen-shirt".into(),
            description: None,
            price,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn size(price: Option<Decimal>, stock: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            size_id: Uuid::new_v4(),
            stock,
            price,
        }
    }

    #[test]
    fn unit_price_prefers_size_override() {
        let p = product(dec!(40.00));
        assert_eq!(size(Some(dec!(45.50)), 1).unit_price(&p), dec!(45.50));
        assert_eq!(size(None, 1).unit_price(&p), dec!(40.00));
    }

    #[test]
    fn zero_stock_is_not_in_stock() {
        assert!(!size(None, 0).in_stock());
        assert!(size(None, 3).in_stock());
    }
}
