use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Upper bound on the quantity of a single product in a cart.
pub const MAX_CART_QUANTITY: i32 = 99;

/// A cart row joined with the product it references.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub stock: i32,
    pub is_active: bool,
}

impl CartLine {
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }

    pub fn is_purchasable(&self) -> bool {
        self.is_active && self.stock >= self.quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct CartItemDto {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub line_total_cents: i64,
    pub in_stock: bool,
}

impl From<&CartLine> for CartItemDto {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            name: line.name.clone(),
            unit_price_cents: line.unit_price_cents,
            quantity: line.quantity,
            line_total_cents: line.line_total_cents(),
            in_stock: line.is_purchasable(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct CartDto {
    pub items: Vec<CartItemDto>,
    pub item_count: i32,
    pub subtotal_cents: i64,
}

impl CartDto {
    pub fn from_lines(lines: &[CartLine]) -> Self {
        Self {
            items: lines.iter().map(CartItemDto::from).collect(),
            item_count: lines.iter().map(|l| l.quantity).sum(),
            subtotal_cents: lines.iter().map(CartLine::line_total_cents).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 99))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    /// Zero removes the line
    #[validate(range(min = 0, max = 99))]
    pub quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: i64, qty: i32, stock: i32) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            name: "Item".to_string(),
            unit_price_cents: price,
            quantity: qty,
            stock,
            is_active: true,
        }
    }

    #[test]
    fn test_cart_totals() {
        let cart = CartDto::from_lines(&[line(250, 2, 10), line(1000, 1, 1)]);
        assert_eq!(cart.item_count, 3);
        assert_eq!(cart.subtotal_cents, 1500);
        assert_eq!(cart.items[0].line_total_cents, 500);
    }

    #[test]
    fn test_out_of_stock_line_is_flagged() {
        let dto = CartItemDto::from(&line(100, 5, 2));
        assert!(!dto.in_stock);
    }

    #[test]
    fn test_empty_cart() {
        let cart = CartDto::from_lines(&[]);
        assert!(cart.items.is_empty());
        assert_eq!(cart.subtotal_cents, 0);
    }
}
