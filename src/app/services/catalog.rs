//! Product catalog: public browsing and admin maintenance.

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::validate_request;
use crate::domain::{
    AppError, CreateProductRequest, PaginatedResponse, Product, ProductQuery, ProductRepository,
    UpdateProductRequest,
};

pub struct CatalogService {
    products: Arc<dyn ProductRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        Self { products }
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create(&self, request: &CreateProductRequest) -> Result<Product, AppError> {
        validate_request(request)?;

        let product = Product::from_request(request);
        self.products.create_product(&product).await?;
        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: Uuid,
        request: &UpdateProductRequest,
    ) -> Result<Product, AppError> {
        validate_request(request)?;

        let mut product = self.load(id).await?;
        product.apply(request);
        self.products.update_product(&product).await?;
        info!(product_id = %product.id, "Product updated");
        Ok(product)
    }

    /// Soft delete: the product disappears from the catalog but existing
    /// orders keep referencing it.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut product = self.load(id).await?;
        if product.is_active {
            product.apply(&UpdateProductRequest {
                is_active: Some(false),
                ..Default::default()
            });
            self.products.update_product(&product).await?;
            info!(product_id = %product.id, "Product deactivated");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<Product, AppError> {
        let stock = self.products.adjust_stock(id, delta).await?;
        info!(product_id = %id, delta, stock, "Stock adjusted");
        self.load(id).await
    }

    /// Inactive products are only visible when `include_inactive` is set.
    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid, include_inactive: bool) -> Result<Product, AppError> {
        let product = self.load(id).await?;
        if !product.is_active && !include_inactive {
            return Err(AppError::not_found(format!("product {id}")));
        }
        Ok(product)
    }

    #[instrument(skip(self, query))]
    pub async fn list(&self, query: &ProductQuery) -> Result<PaginatedResponse<Product>, AppError> {
        if query.min_price.is_some_and(|p| p < 0) || query.max_price.is_some_and(|p| p < 0) {
            return Err(AppError::invalid("min_price", "prices cannot be negative"));
        }
        if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
            if min > max {
                return Err(AppError::invalid(
                    "min_price",
                    "min_price must not exceed max_price",
                ));
            }
        }

        let page = query.pagination();
        let (products, total) = self.products.list_products(query).await?;
        Ok(PaginatedResponse::new(products, total, &page))
    }

    pub async fn categories(&self) -> Result<Vec<String>, AppError> {
        self.products.list_categories().await
    }

    async fn load(&self, id: Uuid) -> Result<Product, AppError> {
        self.products
            .get_product(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("product {id}")))
    }
}
