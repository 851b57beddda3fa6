//! Mock implementations for testing.
//!
//! [`MockStore`] keeps every table in memory behind one mutex and implements
//! all repository traits, so services and the router can be exercised without
//! Postgres. The port doubles record what they were asked to do.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    Address, AddressRepository, AnalyticsRepository, AnalyticsSummary, AppError, CartLine,
    CartRepository, CreatePaymentIntent, DailySales, DatabaseError, EmailMessage, EmailSender,
    ExternalAuthProvider, ExternalIdentity, ExternalLoginOutcome, ExternalServiceError,
    FileStorage, HealthCheck, Order, OrderRepository, OrderStatus, PaginationParams, Payment,
    PaymentEvent, PaymentGateway, PaymentIntent, PaymentRepository, PaymentSettlement,
    PaymentStatus, Product, ProductQuery, ProductRepository, ProductSort, RefreshToken, Review,
    ReviewRepository, StatusCount, TopProduct, User, UserRepository, WishlistEntry,
    WishlistRepository, average_rating,
};

/// Configuration for mock behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// If true, operations will fail.
    pub should_fail: bool,
    /// Custom error message for failures.
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone)]
struct CartRow {
    user_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    added_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    external_logins: HashMap<(String, String), Uuid>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    products: HashMap<Uuid, Product>,
    cart: Vec<CartRow>,
    addresses: HashMap<Uuid, Address>,
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
    reviews: HashMap<Uuid, Review>,
    wishlist: HashMap<(Uuid, Uuid), DateTime<Utc>>,
}

impl Tables {
    fn refresh_rating(&mut self, product_id: Uuid) {
        let ratings: Vec<i16> = self
            .reviews
            .values()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.rating)
            .collect();
        if let Some(product) = self.products.get_mut(&product_id) {
            product.average_rating = average_rating(&ratings);
            product.review_count = ratings.len() as i32;
        }
    }

    fn cart_lines(&self, user_id: Uuid) -> Vec<CartLine> {
        let mut rows: Vec<&CartRow> = self.cart.iter().filter(|r| r.user_id == user_id).collect();
        rows.sort_by_key(|r| (r.added_at, r.product_id));
        rows.into_iter()
            .filter_map(|row| {
                self.products.get(&row.product_id).map(|p| CartLine {
                    product_id: p.id,
                    name: p.name.clone(),
                    unit_price_cents: p.price_cents,
                    quantity: row.quantity,
                    stock: p.stock,
                    is_active: p.is_active,
                })
            })
            .collect()
    }

    fn restore_stock(&mut self, order_id: Uuid) {
        let Some(order) = self.orders.get(&order_id) else {
            return;
        };
        let items: Vec<(Uuid, i32)> = order
            .items
            .iter()
            .map(|i| (i.product_id, i.quantity))
            .collect();
        for (product_id, quantity) in items {
            if let Some(product) = self.products.get_mut(&product_id) {
                product.stock += quantity;
            }
        }
    }
}

fn paginate<T>(items: Vec<T>, page: &PaginationParams) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let page_items = items
        .into_iter()
        .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
        .take(page.limit() as usize)
        .collect();
    (page_items, total)
}

/// In-memory store implementing every repository trait.
pub struct MockStore {
    tables: Mutex<Tables>,
    config: MockConfig,
    call_count: AtomicU64,
    is_healthy: AtomicBool,
}

impl MockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            config,
            call_count: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn seed_user(&self, user: User) -> User {
        self.lock().users.insert(user.id, user.clone());
        user
    }

    pub fn seed_product(&self, product: Product) -> Product {
        self.lock().products.insert(product.id, product.clone());
        product
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.lock().users.get(&id).cloned()
    }

    pub fn product(&self, id: Uuid) -> Option<Product> {
        self.lock().products.get(&id).cloned()
    }

    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.lock().orders.get(&id).cloned()
    }

    pub fn refresh_tokens_for(&self, user_id: Uuid) -> Vec<RefreshToken> {
        self.lock()
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn external_login_count(&self) -> usize {
        self.lock().external_logins.len()
    }

    /// Moves an order's creation time into the past.
    pub fn backdate_order(&self, id: Uuid, by: Duration) {
        if let Some(order) = self.lock().orders.get_mut(&id) {
            order.created_at -= by;
        }
    }

    /// Marks a token revoked at the given time.
    pub fn revoke_token_at(&self, token_id: Uuid, at: DateTime<Utc>) {
        if let Some(token) = self.lock().refresh_tokens.get_mut(&token_id) {
            token.revoked_at = Some(at);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    fn enter(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock database error".to_string());
            return Err(AppError::Database(DatabaseError::Query(msg)));
        }
        Ok(self.lock())
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthCheck for MockStore {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Unavailable(
                "Mock database unhealthy".to_string(),
            )));
        }
        self.enter().map(|_| ())
    }
}

#[async_trait]
impl UserRepository for MockStore {
    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let mut t = self.enter()?;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::duplicate_of("users_email_key").into());
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.enter()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .enter()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), AppError> {
        let mut t = self.enter()?;
        match t.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(DatabaseError::NotFound(user.id.to_string()).into()),
        }
    }

    async fn list_users(
        &self,
        search: Option<&str>,
        page: &PaginationParams,
    ) -> Result<(Vec<User>, u64), AppError> {
        let t = self.enter()?;
        let term = search.map(str::to_lowercase);
        let mut users: Vec<User> = t
            .users
            .values()
            .filter(|u| {
                term.as_deref().is_none_or(|term| {
                    u.email.to_lowercase().contains(term)
                        || u.display_name.to_lowercase().contains(term)
                })
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(users, page))
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), AppError> {
        let mut t = self.enter()?;
        if t.refresh_tokens.values().any(|r| r.token_hash == token.token_hash) {
            return Err(DatabaseError::duplicate_of("refresh_tokens_token_hash_key").into());
        }
        t.refresh_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, AppError> {
        Ok(self
            .enter()?
            .refresh_tokens
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn rotate_refresh_token(
        &self,
        current_id: Uuid,
        replacement: &RefreshToken,
    ) -> Result<bool, AppError> {
        let mut t = self.enter()?;
        match t.refresh_tokens.get_mut(&current_id) {
            Some(current) if current.revoked_at.is_none() => {
                current.revoked_at = Some(Utc::now());
                current.replaced_by = Some(replacement.id);
            }
            _ => return Ok(false),
        }
        t.refresh_tokens.insert(replacement.id, replacement.clone());
        Ok(true)
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> Result<bool, AppError> {
        let mut t = self.enter()?;
        match t.refresh_tokens.get_mut(&id) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut t = self.enter()?;
        let now = Utc::now();
        let mut revoked = 0;
        for token in t.refresh_tokens.values_mut() {
            if token.user_id == user_id && token.revoked_at.is_none() {
                token.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_refresh_tokens(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let mut t = self.enter()?;
        let initial = t.refresh_tokens.len();
        t.refresh_tokens
            .retain(|_, r| r.expires_at >= before && r.revoked_at.is_none_or(|at| at >= before));
        Ok((initial - t.refresh_tokens.len()) as u64)
    }

    async fn upsert_external_login(
        &self,
        identity: &ExternalIdentity,
        candidate: &User,
        token_hash: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<ExternalLoginOutcome, AppError> {
        let mut t = self.enter()?;
        let key = (identity.provider.clone(), identity.subject.clone());

        let linked = t.external_logins.get(&key).and_then(|id| t.users.get(id)).cloned();
        let mut created_user = false;
        let user = match linked {
            Some(user) => user,
            None => match t.users.values().find(|u| u.email == candidate.email).cloned() {
                Some(user) => user,
                None => {
                    t.users.insert(candidate.id, candidate.clone());
                    created_user = true;
                    candidate.clone()
                }
            },
        };

        if !user.is_active {
            return Ok(ExternalLoginOutcome {
                user,
                refresh_token: None,
                created_user: false,
                linked_login: false,
            });
        }

        let linked_login = !t.external_logins.contains_key(&key);
        if linked_login {
            t.external_logins.insert(key, user.id);
        }

        let mut user = user;
        user.last_login_at = Some(Utc::now());
        t.users.insert(user.id, user.clone());
        let token = RefreshToken::new(user.id, token_hash.to_string(), token_expires_at);
        t.refresh_tokens.insert(token.id, token.clone());

        Ok(ExternalLoginOutcome {
            user,
            refresh_token: Some(token),
            created_user,
            linked_login,
        })
    }
}

#[async_trait]
impl ProductRepository for MockStore {
    async fn create_product(&self, product: &Product) -> Result<(), AppError> {
        let mut t = self.enter()?;
        if t.products.values().any(|p| p.sku == product.sku) {
            return Err(DatabaseError::duplicate_of("products_sku_key").into());
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, AppError> {
        Ok(self.enter()?.products.get(&id).cloned())
    }

    async fn update_product(&self, product: &Product) -> Result<(), AppError> {
        let mut t = self.enter()?;
        if let Some(existing) = t.products.get_mut(&product.id) {
            // Stock and rating aggregates are owned by their own operations
            let stock = existing.stock;
            let (rating, count) = (existing.average_rating, existing.review_count);
            *existing = product.clone();
            existing.stock = stock;
            existing.average_rating = rating;
            existing.review_count = count;
        }
        Ok(())
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64), AppError> {
        let t = self.enter()?;
        let mut products: Vec<Product> = t
            .products
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        match query.sort {
            ProductSort::Newest => products.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ProductSort::PriceAsc => products.sort_by_key(|p| p.price_cents),
            ProductSort::PriceDesc => products.sort_by(|a, b| b.price_cents.cmp(&a.price_cents)),
            ProductSort::Rating => products.sort_by(|a, b| {
                b.average_rating
                    .total_cmp(&a.average_rating)
                    .then(b.review_count.cmp(&a.review_count))
            }),
            ProductSort::Name => products.sort_by(|a, b| a.name.cmp(&b.name)),
        }
        Ok(paginate(products, &query.pagination()))
    }

    async fn list_categories(&self) -> Result<Vec<String>, AppError> {
        let t = self.enter()?;
        let mut categories: Vec<String> = t
            .products
            .values()
            .filter(|p| p.is_active)
            .map(|p| p.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<i32, AppError> {
        let mut t = self.enter()?;
        let product = t
            .products
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("product {id}")))?;
        let next = product.stock + delta;
        if next < 0 {
            return Err(AppError::invalid("delta", "stock cannot go below zero"));
        }
        product.stock = next;
        Ok(next)
    }
}

#[async_trait]
impl CartRepository for MockStore {
    async fn cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, AppError> {
        Ok(self.enter()?.cart_lines(user_id))
    }

    async fn cart_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<i32>, AppError> {
        Ok(self
            .enter()?
            .cart
            .iter()
            .find(|r| r.user_id == user_id && r.product_id == product_id)
            .map(|r| r.quantity))
    }

    async fn set_cart_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), AppError> {
        let mut t = self.enter()?;
        match t
            .cart
            .iter_mut()
            .find(|r| r.user_id == user_id && r.product_id == product_id)
        {
            Some(row) => row.quantity = quantity,
            None => t.cart.push(CartRow {
                user_id,
                product_id,
                quantity,
                added_at: Utc::now(),
            }),
        }
        Ok(())
    }

    async fn remove_cart_item(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, AppError> {
        let mut t = self.enter()?;
        let before = t.cart.len();
        t.cart
            .retain(|r| !(r.user_id == user_id && r.product_id == product_id));
        Ok(t.cart.len() < before)
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut t = self.enter()?;
        let before = t.cart.len();
        t.cart.retain(|r| r.user_id != user_id);
        Ok((before - t.cart.len()) as u64)
    }
}

#[async_trait]
impl AddressRepository for MockStore {
    async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<Address>, AppError> {
        let t = self.enter()?;
        let mut addresses: Vec<Address> = t
            .addresses
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        addresses.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(addresses)
    }

    async fn get_address(&self, user_id: Uuid, id: Uuid) -> Result<Option<Address>, AppError> {
        Ok(self
            .enter()?
            .addresses
            .get(&id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn insert_address(&self, address: &Address, limit: usize) -> Result<Address, AppError> {
        let mut t = self.enter()?;
        let held = t
            .addresses
            .values()
            .filter(|a| a.user_id == address.user_id)
            .count();
        if held >= limit {
            return Err(AppError::conflict(format!(
                "An account can hold at most {limit} addresses"
            )));
        }
        let mut address = address.clone();
        if held == 0 {
            address.is_default = true;
        }
        if address.is_default {
            for other in t.addresses.values_mut().filter(|a| a.user_id == address.user_id) {
                other.is_default = false;
            }
        }
        t.addresses.insert(address.id, address.clone());
        Ok(address)
    }

    async fn update_address(&self, address: &Address) -> Result<bool, AppError> {
        let mut t = self.enter()?;
        let owned = t
            .addresses
            .get(&address.id)
            .is_some_and(|a| a.user_id == address.user_id);
        if !owned {
            return Ok(false);
        }
        if address.is_default {
            for other in t.addresses.values_mut().filter(|a| a.user_id == address.user_id) {
                other.is_default = false;
            }
        }
        t.addresses.insert(address.id, address.clone());
        Ok(true)
    }

    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut t = self.enter()?;
        let owned = t.addresses.get(&id).is_some_and(|a| a.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        let removed = t.addresses.remove(&id);
        if removed.is_some_and(|a| a.is_default) {
            if let Some(next) = t
                .addresses
                .values_mut()
                .filter(|a| a.user_id == user_id)
                .max_by_key(|a| a.created_at)
            {
                next.is_default = true;
            }
        }
        Ok(true)
    }

    async fn set_default_address(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut t = self.enter()?;
        let owned = t.addresses.get(&id).is_some_and(|a| a.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        for address in t.addresses.values_mut().filter(|a| a.user_id == user_id) {
            address.is_default = address.id == id;
        }
        Ok(true)
    }
}

#[async_trait]
impl OrderRepository for MockStore {
    async fn place_order(&self, order: &Order) -> Result<(), AppError> {
        let mut t = self.enter()?;
        for item in &order.items {
            let available = t
                .products
                .get(&item.product_id)
                .is_some_and(|p| p.is_active && p.stock >= item.quantity);
            if !available {
                return Err(AppError::conflict(format!(
                    "Insufficient stock for '{}'",
                    item.product_name
                )));
            }
        }
        for item in &order.items {
            if let Some(product) = t.products.get_mut(&item.product_id) {
                product.stock -= item.quantity;
            }
        }
        t.cart.retain(|r| r.user_id != order.user_id);
        t.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.enter()?.orders.get(&id).cloned())
    }

    async fn list_orders(
        &self,
        user_id: Option<Uuid>,
        status: Option<OrderStatus>,
        page: &PaginationParams,
    ) -> Result<(Vec<Order>, u64), AppError> {
        let t = self.enter()?;
        let mut orders: Vec<Order> = t
            .orders
            .values()
            .filter(|o| user_id.is_none_or(|u| o.user_id == u))
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(orders, page))
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        tracking_number: Option<&str>,
        restore_stock: bool,
    ) -> Result<Option<Order>, AppError> {
        let mut t = self.enter()?;
        let allowed = t.orders.get(&id).is_some_and(|o| from.contains(&o.status));
        if !allowed {
            return Ok(None);
        }
        if restore_stock {
            t.restore_stock(id);
        }
        if to == OrderStatus::Cancelled {
            for payment in t
                .payments
                .values_mut()
                .filter(|p| p.order_id == id && p.status == PaymentStatus::Succeeded)
            {
                payment.status = PaymentStatus::RefundPending;
                payment.updated_at = Utc::now();
            }
        }
        let order = t.orders.get_mut(&id).map(|order| {
            order.status = to;
            if let Some(tracking) = tracking_number {
                order.tracking_number = Some(tracking.to_string());
            }
            order.updated_at = Utc::now();
            order.clone()
        });
        Ok(order)
    }

    async fn stale_pending_orders(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let t = self.enter()?;
        let mut stale: Vec<&Order> = t
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < created_before)
            .collect();
        stale.sort_by_key(|o| o.created_at);
        Ok(stale
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|o| o.id)
            .collect())
    }

    async fn has_purchased(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, AppError> {
        Ok(self.enter()?.orders.values().any(|o| {
            o.user_id == user_id && o.status.is_paid_or_later() && o.contains_product(product_id)
        }))
    }
}

#[async_trait]
impl PaymentRepository for MockStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let mut t = self.enter()?;
        if t.payments
            .values()
            .any(|p| p.provider_intent_id == payment.provider_intent_id)
        {
            return Err(DatabaseError::duplicate_of("payments_provider_intent_id_key").into());
        }
        t.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, AppError> {
        Ok(self
            .enter()?
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn find_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, AppError> {
        Ok(self
            .enter()?
            .payments
            .values()
            .find(|p| p.provider_intent_id == intent_id)
            .cloned())
    }

    async fn update_payment_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), AppError> {
        if let Some(payment) = self.enter()?.payments.get_mut(&id) {
            payment.status = status;
            payment.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn settle_payment(&self, intent_id: &str) -> Result<PaymentSettlement, AppError> {
        let mut t = self.enter()?;
        let Some(payment) = t
            .payments
            .values()
            .find(|p| p.provider_intent_id == intent_id)
            .cloned()
        else {
            return Ok(PaymentSettlement::UnknownIntent);
        };
        if matches!(
            payment.status,
            PaymentStatus::Succeeded | PaymentStatus::RefundPending
        ) {
            return Ok(PaymentSettlement::AlreadySettled);
        }

        let now = Utc::now();
        let order_id = payment.order_id;
        let paid = match t.orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::Pending => {
                order.status = OrderStatus::Paid;
                order.updated_at = now;
                true
            }
            _ => false,
        };
        if let Some(stored) = t.payments.get_mut(&payment.id) {
            stored.status = if paid {
                PaymentStatus::Succeeded
            } else {
                PaymentStatus::RefundPending
            };
            stored.updated_at = now;
        }
        Ok(if paid {
            PaymentSettlement::OrderPaid { order_id }
        } else {
            PaymentSettlement::RefundPending { order_id }
        })
    }
}

#[async_trait]
impl ReviewRepository for MockStore {
    async fn create_review(&self, review: &Review) -> Result<(), AppError> {
        let mut t = self.enter()?;
        if t.reviews
            .values()
            .any(|r| r.product_id == review.product_id && r.user_id == review.user_id)
        {
            return Err(DatabaseError::duplicate_of("reviews_product_id_user_id_key").into());
        }
        t.reviews.insert(review.id, review.clone());
        t.refresh_rating(review.product_id);
        Ok(())
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, AppError> {
        Ok(self.enter()?.reviews.get(&id).cloned())
    }

    async fn update_review(&self, review: &Review) -> Result<(), AppError> {
        let mut t = self.enter()?;
        t.reviews.insert(review.id, review.clone());
        t.refresh_rating(review.product_id);
        Ok(())
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool, AppError> {
        let mut t = self.enter()?;
        match t.reviews.remove(&id) {
            Some(review) => {
                t.refresh_rating(review.product_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_reviews(
        &self,
        product_id: Uuid,
        page: &PaginationParams,
    ) -> Result<(Vec<Review>, u64), AppError> {
        let t = self.enter()?;
        let mut reviews: Vec<Review> = t
            .reviews
            .values()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(reviews, page))
    }
}

#[async_trait]
impl WishlistRepository for MockStore {
    async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>, AppError> {
        let t = self.enter()?;
        let mut entries: Vec<WishlistEntry> = t
            .wishlist
            .iter()
            .filter(|((user, _), _)| *user == user_id)
            .filter_map(|((_, product_id), added_at)| {
                t.products
                    .get(product_id)
                    .filter(|p| p.is_active)
                    .map(|p| WishlistEntry {
                        product: p.clone(),
                        added_at: *added_at,
                    })
            })
            .collect();
        entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(entries)
    }

    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, AppError> {
        let mut t = self.enter()?;
        if t.wishlist.contains_key(&(user_id, product_id)) {
            return Ok(false);
        }
        t.wishlist.insert((user_id, product_id), Utc::now());
        Ok(true)
    }

    async fn remove_from_wishlist(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, AppError> {
        Ok(self
            .enter()?
            .wishlist
            .remove(&(user_id, product_id))
            .is_some())
    }
}

#[async_trait]
impl AnalyticsRepository for MockStore {
    async fn summary(&self) -> Result<AnalyticsSummary, AppError> {
        let t = self.enter()?;
        let orders_by_status = OrderStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                status,
                count: t.orders.values().filter(|o| o.status == status).count() as i64,
            })
            .filter(|c| c.count > 0)
            .collect();
        Ok(AnalyticsSummary {
            total_users: t.users.len() as i64,
            active_products: t.products.values().filter(|p| p.is_active).count() as i64,
            total_orders: t.orders.len() as i64,
            orders_by_status,
            revenue_cents: t
                .orders
                .values()
                .filter(|o| o.status.is_paid_or_later())
                .map(|o| o.total_cents)
                .sum(),
        })
    }

    async fn top_products(&self, limit: i64) -> Result<Vec<TopProduct>, AppError> {
        let t = self.enter()?;
        let mut totals: HashMap<Uuid, TopProduct> = HashMap::new();
        for order in t.orders.values().filter(|o| o.status.is_paid_or_later()) {
            for item in &order.items {
                let entry = totals.entry(item.product_id).or_insert_with(|| TopProduct {
                    product_id: item.product_id,
                    name: item.product_name.clone(),
                    quantity_sold: 0,
                    revenue_cents: 0,
                });
                entry.quantity_sold += i64::from(item.quantity);
                entry.revenue_cents += item.line_total_cents;
            }
        }
        let mut top: Vec<TopProduct> = totals.into_values().collect();
        top.sort_by(|a, b| {
            b.quantity_sold
                .cmp(&a.quantity_sold)
                .then(b.revenue_cents.cmp(&a.revenue_cents))
        });
        top.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(top)
    }

    async fn sales_by_day(&self, since: DateTime<Utc>) -> Result<Vec<DailySales>, AppError> {
        let t = self.enter()?;
        let mut days: HashMap<chrono::NaiveDate, DailySales> = HashMap::new();
        for order in t
            .orders
            .values()
            .filter(|o| o.status.is_paid_or_later() && o.created_at >= since)
        {
            let day = order.created_at.date_naive();
            let entry = days.entry(day).or_insert_with(|| DailySales {
                day,
                order_count: 0,
                revenue_cents: 0,
            });
            entry.order_count += 1;
            entry.revenue_cents += order.total_cents;
        }
        let mut sales: Vec<DailySales> = days.into_values().collect();
        sales.sort_by_key(|d| d.day);
        Ok(sales)
    }
}

/// Payment gateway double. Intents get sequential ids and a repeated
/// idempotency key returns the intent created for it; webhooks are
/// "signed" by passing [`MockPaymentGateway::VALID_SIGNATURE`].
pub struct MockPaymentGateway {
    config: MockConfig,
    intents: Mutex<Vec<CreatePaymentIntent>>,
    by_key: Mutex<HashMap<String, PaymentIntent>>,
    events: Mutex<HashMap<String, PaymentEvent>>,
    is_healthy: AtomicBool,
}

impl MockPaymentGateway {
    pub const VALID_SIGNATURE: &'static str = "t=0,v1=mock";

    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            intents: Mutex::new(Vec::new()),
            by_key: Mutex::new(HashMap::new()),
            events: Mutex::new(HashMap::new()),
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Registers the event a webhook payload decodes to.
    pub fn register_event(&self, payload: &str, event: PaymentEvent) {
        self.events
            .lock()
            .unwrap()
            .insert(payload.to_string(), event);
    }

    /// Requests that created a new intent; replayed keys are not listed.
    pub fn created_intents(&self) -> Vec<CreatePaymentIntent> {
        self.intents.lock().unwrap().clone()
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if self.is_healthy.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(ExternalServiceError::Unavailable("Mock gateway unhealthy".to_string()).into())
        }
    }

    async fn create_intent(&self, request: &CreatePaymentIntent) -> Result<PaymentIntent, AppError> {
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock gateway error".to_string());
            return Err(ExternalServiceError::Unavailable(msg).into());
        }
        let mut by_key = self.by_key.lock().unwrap();
        if let Some(intent) = by_key.get(&request.idempotency_key) {
            return Ok(intent.clone());
        }
        let mut intents = self.intents.lock().unwrap();
        intents.push(request.clone());
        let n = intents.len();
        let intent = PaymentIntent {
            id: format!("pi_mock_{n}"),
            client_secret: format!("pi_mock_{n}_secret"),
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
        };
        by_key.insert(request.idempotency_key.clone(), intent.clone());
        Ok(intent)
    }

    fn parse_webhook(&self, payload: &[u8], signature: &str) -> Result<PaymentEvent, AppError> {
        if signature != Self::VALID_SIGNATURE {
            return Err(AppError::Authentication(
                "Invalid webhook signature".to_string(),
            ));
        }
        let payload = String::from_utf8_lossy(payload);
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(payload.as_ref())
            .cloned()
            .unwrap_or(PaymentEvent::Ignored {
                event_type: "unknown".to_string(),
            }))
    }
}

/// Identity provider double resolving registered ID tokens.
#[derive(Default)]
pub struct MockExternalAuthProvider {
    identities: Mutex<HashMap<String, ExternalIdentity>>,
}

impl MockExternalAuthProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id_token: &str, identity: ExternalIdentity) {
        self.identities
            .lock()
            .unwrap()
            .insert(id_token.to_string(), identity);
    }

    /// Convenience identity for the `google` provider.
    pub fn google_identity(subject: &str, email: &str) -> ExternalIdentity {
        ExternalIdentity {
            provider: "google".to_string(),
            subject: subject.to_string(),
            email: email.to_string(),
            email_verified: true,
            name: Some("Google User".to_string()),
            picture: Some("https://lh3.example/photo.png".to_string()),
        }
    }
}

#[async_trait]
impl ExternalAuthProvider for MockExternalAuthProvider {
    async fn validate(&self, provider: &str, id_token: &str) -> Result<ExternalIdentity, AppError> {
        if provider != "google" {
            return Err(AppError::invalid(
                "provider",
                format!("unsupported identity provider '{provider}'"),
            ));
        }
        self.identities
            .lock()
            .unwrap()
            .get(id_token)
            .cloned()
            .ok_or_else(|| AppError::Authentication("Invalid Google token".to_string()))
    }
}

/// File storage double keeping uploads in memory.
#[derive(Default)]
pub struct MockFileStorage {
    files: Mutex<HashMap<String, (Vec<u8>, String)>>,
    deleted: Mutex<Vec<String>>,
}

impl MockFileStorage {
    pub const BASE_URL: &'static str = "/uploads";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn content_type_of(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(Self::BASE_URL)?.strip_prefix('/')?;
        self.files.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileStorage for MockFileStorage {
    async fn save(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, AppError> {
        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(format!("{}/{key}", Self::BASE_URL))
    }

    async fn delete(&self, url: &str) -> Result<(), AppError> {
        if let Some(key) = url
            .strip_prefix(Self::BASE_URL)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            self.files.lock().unwrap().remove(key);
        }
        self.deleted.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Email double that records every message.
#[derive(Default)]
pub struct MockEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    should_fail: AtomicBool,
}

impl MockEmailSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing() -> Self {
        let sender = Self::default();
        sender.should_fail.store(true, Ordering::Relaxed);
        sender
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<EmailMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.to == to)
            .collect()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(ExternalServiceError::Unavailable("Mock SMTP down".to_string()).into());
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Shared handles used by tests that need to inspect the doubles after
/// handing them to the application.
#[derive(Clone)]
pub struct MockBackends {
    pub store: Arc<MockStore>,
    pub payments: Arc<MockPaymentGateway>,
    pub identity: Arc<MockExternalAuthProvider>,
    pub storage: Arc<MockFileStorage>,
    pub email: Arc<MockEmailSender>,
}

impl MockBackends {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(MockStore::new()),
            payments: Arc::new(MockPaymentGateway::new()),
            identity: Arc::new(MockExternalAuthProvider::new()),
            storage: Arc::new(MockFileStorage::new()),
            email: Arc::new(MockEmailSender::new()),
        }
    }
}

impl Default for MockBackends {
    fn default() -> Self {
        Self::new()
    }
}
