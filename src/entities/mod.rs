pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_size;
pub mod session_record;
pub mod size;
pub mod user;
