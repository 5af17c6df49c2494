//! HTML fragments returned to `HX-Request` clients.

use crate::{
    entities::order,
    services::{
        cart::CartSummary,
        catalog::{ProductDetail, ProductSummary},
        orders::OrderView,
    },
};
use maud::{html, Markup};
use rust_decimal::Decimal;

pub fn money(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {}", amount.round_dp(2), currency)
}

pub fn empty_cart() -> Markup {
    html! {
        div #cart-content .cart-empty {
            p { "Your cart is empty." }
            a href="/" { "Continue shopping" }
        }
    }
}

fn cart_lines(summary: &CartSummary, currency: &str, editable: bool) -> Markup {
    html! {
        ul .cart-items {
            @for line in &summary.items {
                li .cart-item id={ "cart-item-" (line.item_id.to_string()) } {
                    span .name { (line.product_name) }
                    span .size { (line.size_name) }
                    @if editable {
                        form hx-post={ "/cart/item/" (line.item_id.to_string()) "/update/" } hx-target="#cart-content" {
                            input type="number" name="quantity" min="0" max=(line.stock) value=(line.quantity);
                            button type="submit" { "Update" }
                        }
                        button hx-post={ "/cart/item/" (line.item_id.to_string()) "/remove/" } hx-target="#cart-content" { "Remove" }
                    } @else {
                        span .quantity { "× " (line.quantity) }
                    }
                    span .price { (money(line.total_price, currency)) }
                }
            }
        }
        p .cart-total {
            "Items: " (summary.total_items) " · Subtotal: " (money(summary.subtotal, currency))
        }
    }
}

pub fn cart_modal(summary: &CartSummary, currency: &str) -> Markup {
    if summary.is_empty() {
        return empty_cart();
    }
    html! {
        div #cart-content .cart-modal {
            h2 { "Your cart" }
            (cart_lines(summary, currency, true))
            div .cart-actions {
                button hx-post="/cart/clear/" hx-target="#cart-content" { "Clear cart" }
                a href="/orders/checkout/" { "Checkout" }
            }
        }
    }
}

pub fn cart_summary(summary: &CartSummary, currency: &str) -> Markup {
    if summary.is_empty() {
        return empty_cart();
    }
    html! {
        div #cart-summary {
            (cart_lines(summary, currency, false))
        }
    }
}

pub fn checkout(summary: &CartSummary, currency: &str) -> Markup {
    html! {
        div #checkout {
            h2 { "Checkout" }
            (cart_lines(summary, currency, false))
            form hx-post="/orders/create/" {
                input name="first_name" placeholder="First name" required;
                input name="last_name" placeholder="Last name" required;
                input type="email" name="email" placeholder="Email" required;
                input name="phone" placeholder="Phone" required;
                input name="address1" placeholder="Address" required;
                input name="city" placeholder="City" required;
                textarea name="special_instructions" placeholder="Special instructions" {}
                button type="submit" { "Place order" }
            }
        }
    }
}

fn order_lines(order: &OrderView, currency: &str) -> Markup {
    html! {
        table .order-items {
            tr { th { "Product" } th { "Size" } th { "Qty" } th { "Price" } th { "Total" } }
            @for item in &order.items {
                tr {
                    td { (item.product_name) }
                    td { (item.size_name.as_deref().unwrap_or("-")) }
                    td { (item.quantity) }
                    td { (money(item.price, currency)) }
                    td { (money(item.total_price, currency)) }
                }
            }
        }
        p .order-total { "Total: " (money(order.total_amount, currency)) }
    }
}

pub fn order_success(order: &OrderView, currency: &str) -> Markup {
    html! {
        div #order-success {
            h2 { "Thank you for your order!" }
            p { "Order #" (order.id.to_string()) " has been placed and is " (order.status.label()) "." }
            (order_lines(order, currency))
        }
    }
}

pub fn order_detail(order: &OrderView, currency: &str) -> Markup {
    html! {
        div #order-detail {
            h2 { "Order #" (order.id.to_string()) }
            p .status { "Status: " (order.status.label()) }
            p { (order.first_name) " " (order.last_name) ", " (order.address1) ", " (order.city) }
            @if let Some(notes) = &order.special_instructions {
                p .notes { (notes) }
            }
            (order_lines(order, currency))
        }
    }
}

pub fn order_history(orders: &[order::Model], currency: &str) -> Markup {
    html! {
        div #order-history {
            @if orders.is_empty() {
                p { "You have not placed any orders yet." }
            } @else {
                ul {
                    @for o in orders {
                        li {
                            a href={ "/orders/detail/" (o.id.to_string()) "/" } { "Order #" (o.id.to_string()) }
                            " · " (o.created_at.format("%Y-%m-%d").to_string())
                            " · " (o.status.label())
                            " · " (money(o.total_amount, currency))
                        }
                    }
                }
            }
        }
    }
}

pub fn product_list(products: &[ProductSummary], currency: &str) -> Markup {
    html! {
        ul .products {
            @for p in products {
                li {
                    a href={ "/catalog/products/" (p.slug) "/" } { (p.name) }
                    " " span .price { (money(p.price, currency)) }
                }
            }
        }
    }
}

pub fn product_detail(product: &ProductDetail, currency: &str) -> Markup {
    html! {
        div .product {
            h2 { (product.name) }
            @if let Some(description) = &product.description {
                p { (description) }
            }
            form hx-post={ "/cart/add/" (product.slug) "/" } hx-target="#cart-content" {
                select name="size_id" {
                    @for size in &product.sizes {
                        option value=(size.product_size_id.to_string()) disabled[!size.in_stock] {
                            (size.name) " - " (money(size.price, currency))
                        }
                    }
                }
                input type="number" name="quantity" min="1" value="1";
                button type="submit" { "Add to cart" }
            }
        }
    }
}

pub fn payment_status(title: &str, message: &str) -> Markup {
    html! {
        div .payment-status {
            h2 { (title) }
            p { (message) }
            a href="/" { "Back to shop" }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cart::CartLine;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn summary_with_one_line() -> CartSummary {
        CartSummary {
            cart_id: Uuid::new_v4(),
            items: vec![CartLine {
                item_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                product_name: "Silk <Tie>".into(),
                product_slug: "silk-tie".into(),
                product_size_id: Uuid::new_v4(),
                size_name: "One Size".into(),
                quantity: 2,
                stock: 5,
                unit_price: dec!(15),
                total_price: dec!(30),
                added_at: Utc::now(),
            }],
            total_items: 2,
            subtotal: dec!(30),
        }
    }

    #[test]
    fn money_has_two_decimals() {
        assert_eq!(money(dec!(5), "AZN"), "5.00 AZN");
        assert_eq!(money(dec!(12.345), "AZN"), "12.34 AZN");
    }

    #[test]
    fn modal_lists_lines_and_escapes_names() {
        let html = cart_modal(&summary_with_one_line(), "AZN").into_string();
        assert!(html.contains("Silk &lt;Tie&gt;"));
        assert!(html.contains("30.00 AZN"));
        assert!(html.contains("/orders/checkout/"));
    }

    #[test]
    fn empty_summary_renders_empty_cart() {
        let mut summary = summary_with_one_line();
        summary.items.clear();
        let html = cart_summary(&summary, "AZN").into_string();
        assert!(html.contains("Your cart is empty."));
    }
}
