//! Per-user shopping cart.

use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::validate_request;
use crate::domain::{
    AddCartItemRequest, AppError, CartDto, CartRepository, MAX_CART_QUANTITY, Product,
    ProductRepository, UpdateCartItemRequest,
};

pub struct CartService {
    carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
}

impl CartService {
    #[must_use]
    pub fn new(carts: Arc<dyn CartRepository>, products: Arc<dyn ProductRepository>) -> Self {
        Self { carts, products }
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartDto, AppError> {
        let lines = self.carts.cart_lines(user_id).await?;
        Ok(CartDto::from_lines(&lines))
    }

    /// Adds to the existing line when the product is already in the cart.
    #[instrument(skip(self, request), fields(product_id = %request.product_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        request: &AddCartItemRequest,
    ) -> Result<CartDto, AppError> {
        validate_request(request)?;

        let product = self.purchasable(request.product_id).await?;
        let existing = self
            .carts
            .cart_quantity(user_id, product.id)
            .await?
            .unwrap_or(0);
        let quantity = existing + request.quantity;
        check_quantity(&product, quantity)?;

        self.carts
            .set_cart_quantity(user_id, product.id, quantity)
            .await?;
        debug!(quantity, "Cart line updated");
        self.get_cart(user_id).await
    }

    /// Sets the quantity of a line; zero removes it.
    #[instrument(skip(self, request))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        request: &UpdateCartItemRequest,
    ) -> Result<CartDto, AppError> {
        validate_request(request)?;

        if self.carts.cart_quantity(user_id, product_id).await?.is_none() {
            return Err(AppError::not_found("cart item"));
        }
        if request.quantity == 0 {
            self.carts.remove_cart_item(user_id, product_id).await?;
            return self.get_cart(user_id).await;
        }

        let product = self.purchasable(product_id).await?;
        check_quantity(&product, request.quantity)?;
        self.carts
            .set_cart_quantity(user_id, product_id, request.quantity)
            .await?;
        self.get_cart(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<CartDto, AppError> {
        self.carts.remove_cart_item(user_id, product_id).await?;
        self.get_cart(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<(), AppError> {
        let removed = self.carts.clear_cart(user_id).await?;
        debug!(removed, "Cart cleared");
        Ok(())
    }

    async fn purchasable(&self, product_id: Uuid) -> Result<Product, AppError> {
        self.products
            .get_product(product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::not_found(format!("product {product_id}")))
    }
}

fn check_quantity(product: &Product, quantity: i32) -> Result<(), AppError> {
    if quantity > MAX_CART_QUANTITY {
        return Err(AppError::invalid(
            "quantity",
            format!("at most {MAX_CART_QUANTITY} of a product per order"),
        ));
    }
    if !product.has_stock_for(quantity) {
        warn!(product_id = %product.id, requested = quantity, stock = product.stock, "Insufficient stock");
        return Err(AppError::conflict(format!(
            "Only {} of '{}' in stock",
            product.stock, product.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockStore;

    fn setup() -> (Arc<MockStore>, CartService, Product) {
        let store = Arc::new(MockStore::new());
        let product = store.seed_product(Product::new("MUG", "Mug", "kitchen", 1200, 10));
        (store.clone(), CartService::new(store.clone(), store), product)
    }

    fn add(product_id: Uuid, quantity: i32) -> AddCartItemRequest {
        AddCartItemRequest {
            product_id,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_add_merges_quantities() {
        let (_, service, product) = setup();
        let user = Uuid::new_v4();

        service.add_item(user, &add(product.id, 2)).await.unwrap();
        let cart = service.add_item(user, &add(product.id, 3)).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
        assert_eq!(cart.subtotal_cents, 6000);
        assert_eq!(cart.item_count, 5);
    }

    #[tokio::test]
    async fn test_add_beyond_stock_conflicts() {
        let (_, service, product) = setup();
        let user = Uuid::new_v4();
        service.add_item(user, &add(product.id, 8)).await.unwrap();
        assert!(matches!(
            service.add_item(user, &add(product.id, 3)).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_add_beyond_line_limit_is_invalid() {
        let (store, service, _) = setup();
        let bulk = store.seed_product(Product::new("BULK", "Bulk", "misc", 1, 1000));
        let user = Uuid::new_v4();
        service.add_item(user, &add(bulk.id, 99)).await.unwrap();
        assert!(matches!(
            service.add_item(user, &add(bulk.id, 1)).await,
            Err(AppError::Validation(_))
        ));
        assert!(service.add_item(user, &add(bulk.id, 0)).await.is_err());
    }

    #[tokio::test]
    async fn test_add_inactive_product_not_found() {
        let (store, service, _) = setup();
        let mut gone = Product::new("GONE", "Gone", "misc", 100, 5);
        gone.is_active = false;
        let gone = store.seed_product(gone);
        assert!(matches!(
            service.add_item(Uuid::new_v4(), &add(gone.id, 1)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_zero_removes_and_missing_is_not_found() {
        let (_, service, product) = setup();
        let user = Uuid::new_v4();

        assert!(matches!(
            service
                .update_item(user, product.id, &UpdateCartItemRequest { quantity: 1 })
                .await,
            Err(AppError::NotFound(_))
        ));

        service.add_item(user, &add(product.id, 2)).await.unwrap();
        let cart = service
            .update_item(user, product.id, &UpdateCartItemRequest { quantity: 7 })
            .await
            .unwrap();
        assert_eq!(cart.items[0].quantity, 7);

        let cart = service
            .update_item(user, product.id, &UpdateCartItemRequest { quantity: 0 })
            .await
            .unwrap();
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (store, service, product) = setup();
        let other = store.seed_product(Product::new("TEA", "Tea", "kitchen", 500, 10));
        let user = Uuid::new_v4();
        service.add_item(user, &add(product.id, 1)).await.unwrap();
        service.add_item(user, &add(other.id, 1)).await.unwrap();

        let cart = service.remove_item(user, product.id).await.unwrap();
        assert_eq!(cart.items.len(), 1);

        service.clear(user).await.unwrap();
        assert!(service.get_cart(user).await.unwrap().items.is_empty());
    }
}
