pub mod cart;
pub mod catalog;
pub mod orders;
pub mod payments;
pub mod users;

pub use cart::CartService;
pub use catalog::CatalogService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use users::UserService;

/// Deserializes a string with surrounding whitespace removed, so length rules
/// see what will be stored.
pub fn trimmed<'de, D>(de: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = <String as serde::Deserialize>::deserialize(de)?;
    Ok(raw.trim().to_string())
}
