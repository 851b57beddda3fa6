//! Address book and shipping quotes.

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::validate_request;
use crate::domain::{
    Address, AddressRepository, AddressRequest, AppError, MAX_ADDRESSES_PER_USER, ShippingQuote,
};

pub struct ShippingService {
    addresses: Arc<dyn AddressRepository>,
}

impl ShippingService {
    #[must_use]
    pub fn new(addresses: Arc<dyn AddressRepository>) -> Self {
        Self { addresses }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Address>, AppError> {
        self.addresses.list_addresses(user_id).await
    }

    /// The first address a user saves becomes their default.
    #[instrument(skip(self, request))]
    pub async fn create(&self, user_id: Uuid, request: &AddressRequest) -> Result<Address, AppError> {
        validate_request(request)?;

        let address = self
            .addresses
            .insert_address(
                &Address::from_request(user_id, request),
                MAX_ADDRESSES_PER_USER,
            )
            .await?;
        info!(address_id = %address.id, is_default = address.is_default, "Address created");
        Ok(address)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        request: &AddressRequest,
    ) -> Result<Address, AppError> {
        validate_request(request)?;

        let mut address = self.load(user_id, id).await?;
        address.apply(request);
        if !self.addresses.update_address(&address).await? {
            return Err(AppError::not_found("address"));
        }
        Ok(address)
    }

    /// Removing the default address promotes the newest remaining one.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        if !self.addresses.delete_address(user_id, id).await? {
            return Err(AppError::not_found("address"));
        }
        info!(address_id = %id, "Address deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_default(&self, user_id: Uuid, id: Uuid) -> Result<Address, AppError> {
        if !self.addresses.set_default_address(user_id, id).await? {
            return Err(AppError::not_found("address"));
        }
        self.load(user_id, id).await
    }

    pub fn quote(&self, subtotal_cents: i64) -> Result<ShippingQuote, AppError> {
        if subtotal_cents < 0 {
            return Err(AppError::invalid(
                "subtotal_cents",
                "subtotal cannot be negative",
            ));
        }
        Ok(ShippingQuote::for_subtotal(subtotal_cents))
    }

    async fn load(&self, user_id: Uuid, id: Uuid) -> Result<Address, AppError> {
        self.addresses
            .get_address(user_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("address"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FLAT_SHIPPING_CENTS, FREE_SHIPPING_THRESHOLD_CENTS};
    use crate::test_utils::MockStore;

    fn setup() -> ShippingService {
        ShippingService::new(Arc::new(MockStore::new()))
    }

    fn request(recipient: &str) -> AddressRequest {
        AddressRequest::new(recipient, "1 Main St", "Springfield", "12345", "us")
    }

    #[tokio::test]
    async fn test_first_address_becomes_default() {
        let service = setup();
        let user = Uuid::new_v4();
        let first = service.create(user, &request("Ann")).await.unwrap();
        let second = service.create(user, &request("Bob")).await.unwrap();

        assert!(first.is_default);
        assert!(!second.is_default);
        assert_eq!(first.country, "US");
    }

    #[tokio::test]
    async fn test_new_default_demotes_previous() {
        let service = setup();
        let user = Uuid::new_v4();
        let first = service.create(user, &request("Ann")).await.unwrap();
        let mut req = request("Bob");
        req.is_default = true;
        let second = service.create(user, &req).await.unwrap();

        let list = service.list(user).await.unwrap();
        assert_eq!(list[0].id, second.id);
        assert!(!list.iter().find(|a| a.id == first.id).unwrap().is_default);
    }

    #[tokio::test]
    async fn test_address_limit() {
        let service = setup();
        let user = Uuid::new_v4();
        for i in 0..MAX_ADDRESSES_PER_USER {
            service.create(user, &request(&format!("R{i}"))).await.unwrap();
        }
        assert!(matches!(
            service.create(user, &request("One too many")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_respect_limit() {
        let service = Arc::new(setup());
        let user = Uuid::new_v4();
        let handles: Vec<_> = (0..MAX_ADDRESSES_PER_USER + 5)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.create(user, &request(&format!("R{i}"))).await })
            })
            .collect();

        let mut created = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(AppError::Conflict(_)) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(created, MAX_ADDRESSES_PER_USER);
        assert_eq!(rejected, 5);

        let list = service.list(user).await.unwrap();
        assert_eq!(list.len(), MAX_ADDRESSES_PER_USER);
        assert_eq!(list.iter().filter(|a| a.is_default).count(), 1);
    }

    #[tokio::test]
    async fn test_other_users_addresses_are_invisible() {
        let service = setup();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let address = service.create(owner, &request("Ann")).await.unwrap();

        assert!(matches!(
            service.update(stranger, address.id, &request("X")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(stranger, address.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.set_default(stranger, address.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deleting_default_promotes_newest() {
        let service = setup();
        let user = Uuid::new_v4();
        let first = service.create(user, &request("A")).await.unwrap();
        service.create(user, &request("B")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newest = service.create(user, &request("C")).await.unwrap();

        service.delete(user, first.id).await.unwrap();
        let list = service.list(user).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, newest.id);
        assert!(list[0].is_default);
    }

    #[tokio::test]
    async fn test_set_default() {
        let service = setup();
        let user = Uuid::new_v4();
        service.create(user, &request("A")).await.unwrap();
        let b = service.create(user, &request("B")).await.unwrap();

        let updated = service.set_default(user, b.id).await.unwrap();
        assert!(updated.is_default);
        assert_eq!(
            service
                .list(user)
                .await
                .unwrap()
                .iter()
                .filter(|a| a.is_default)
                .count(),
            1
        );
    }

    #[test]
    fn test_quote() {
        let service = setup();
        assert_eq!(service.quote(1000).unwrap().shipping_cents, FLAT_SHIPPING_CENTS);
        assert_eq!(
            service
                .quote(FREE_SHIPPING_THRESHOLD_CENTS)
                .unwrap()
                .shipping_cents,
            0
        );
        assert!(service.quote(-1).is_err());
    }
}
