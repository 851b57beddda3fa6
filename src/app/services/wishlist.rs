use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::CartService;
use crate::domain::{
    AddCartItemRequest, AppError, CartDto, ProductRepository, WishlistEntry, WishlistRepository,
};

pub struct WishlistService {
    wishlists: Arc<dyn WishlistRepository>,
    products: Arc<dyn ProductRepository>,
    cart: Arc<CartService>,
}

impl WishlistService {
    #[must_use]
    pub fn new(
        wishlists: Arc<dyn WishlistRepository>,
        products: Arc<dyn ProductRepository>,
        cart: Arc<CartService>,
    ) -> Self {
        Self {
            wishlists,
            products,
            cart,
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>, AppError> {
        self.wishlists.list_wishlist(user_id).await
    }

    /// Adding a product that is already listed is not an error.
    #[instrument(skip(self))]
    pub async fn add(&self, user_id: Uuid, product_id: Uuid) -> Result<Vec<WishlistEntry>, AppError> {
        self.products
            .get_product(product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::not_found(format!("product {product_id}")))?;
        let added = self.wishlists.add_to_wishlist(user_id, product_id).await?;
        debug!(added, "Wishlist add");
        self.list(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<(), AppError> {
        let removed = self.wishlists.remove_from_wishlist(user_id, product_id).await?;
        debug!(removed, "Wishlist remove");
        Ok(())
    }

    /// Puts one unit in the cart, then drops the wishlist entry. If the
    /// cart rejects the item the wishlist is left untouched.
    #[instrument(skip(self))]
    pub async fn move_to_cart(&self, user_id: Uuid, product_id: Uuid) -> Result<CartDto, AppError> {
        let listed = self
            .wishlists
            .list_wishlist(user_id)
            .await?
            .iter()
            .any(|e| e.product.id == product_id);
        if !listed {
            return Err(AppError::not_found("wishlist item"));
        }

        let cart = self
            .cart
            .add_item(
                user_id,
                &AddCartItemRequest {
                    product_id,
                    quantity: 1,
                },
            )
            .await?;
        self.wishlists
            .remove_from_wishlist(user_id, product_id)
            .await?;
        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Product;
    use crate::test_utils::MockStore;

    fn setup() -> (Arc<MockStore>, WishlistService) {
        let store = Arc::new(MockStore::new());
        let cart = Arc::new(CartService::new(store.clone(), store.clone()));
        let service = WishlistService::new(store.clone(), store.clone(), cart);
        (store, service)
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (store, service) = setup();
        let product = store.seed_product(Product::new("W", "Watch", "misc", 9900, 2));
        let user = Uuid::new_v4();

        service.add(user, product.id).await.unwrap();
        let entries = service.add(user, product.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].product.id, product.id);
    }

    #[tokio::test]
    async fn test_add_inactive_product_not_found() {
        let (store, service) = setup();
        let mut product = Product::new("X", "Gone", "misc", 100, 1);
        product.is_active = false;
        let product = store.seed_product(product);
        assert!(matches!(
            service.add(Uuid::new_v4(), product.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (store, service) = setup();
        let product = store.seed_product(Product::new("W", "Watch", "misc", 9900, 2));
        let user = Uuid::new_v4();
        service.add(user, product.id).await.unwrap();

        service.remove(user, product.id).await.unwrap();
        service.remove(user, product.id).await.unwrap();
        assert!(service.list(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_to_cart() {
        let (store, service) = setup();
        let product = store.seed_product(Product::new("W", "Watch", "misc", 9900, 2));
        let user = Uuid::new_v4();
        service.add(user, product.id).await.unwrap();

        let cart = service.move_to_cart(user, product.id).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 1);
        assert!(service.list(user).await.unwrap().is_empty());

        assert!(matches!(
            service.move_to_cart(user, product.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_move_out_of_stock_keeps_entry() {
        let (store, service) = setup();
        let product = store.seed_product(Product::new("Z", "Zero", "misc", 100, 0));
        let user = Uuid::new_v4();
        service.add(user, product.id).await.unwrap();

        assert!(matches!(
            service.move_to_cart(user, product.id).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(service.list(user).await.unwrap().len(), 1);
    }
}
