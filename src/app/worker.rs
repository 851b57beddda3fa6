//! Background housekeeping: refresh token purging and expiry of unpaid orders.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::{AppError, OrderRepository, OrderStatus, UserRepository};

/// Configuration for the background worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Whether the worker is enabled
    pub enabled: bool,
    /// Interval between maintenance passes
    pub poll_interval: Duration,
    /// Unpaid orders older than this are cancelled
    pub pending_order_ttl: Duration,
    /// Revoked or expired refresh tokens are kept this long before purging
    pub token_retention: Duration,
    /// Maximum number of orders expired per pass
    pub batch_size: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            pending_order_ttl: Duration::from_secs(24 * 3600),
            token_retention: Duration::from_secs(7 * 24 * 3600),
            batch_size: 100,
        }
    }
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub tokens_purged: u64,
    pub orders_expired: u64,
}

pub struct MaintenanceWorker {
    users: Arc<dyn UserRepository>,
    orders: Arc<dyn OrderRepository>,
    config: WorkerConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl MaintenanceWorker {
    pub fn new(
        users: Arc<dyn UserRepository>,
        orders: Arc<dyn OrderRepository>,
        config: WorkerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            users,
            orders,
            config,
            shutdown_rx,
        }
    }

    /// Run the worker loop
    pub async fn run(mut self) {
        if !self.config.enabled {
            info!("Maintenance worker is disabled");
            return;
        }

        info!(
            poll_interval = ?self.config.poll_interval,
            pending_order_ttl = ?self.config.pending_order_ttl,
            "Starting maintenance worker"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match self.run_once().await {
                        Ok(report) if report == MaintenanceReport::default() => {}
                        Ok(report) => info!(
                            tokens_purged = report.tokens_purged,
                            orders_expired = report.orders_expired,
                            "Maintenance pass completed"
                        ),
                        Err(e) => error!(error = ?e, "Maintenance pass failed"),
                    }
                }
                result = self.shutdown_rx.changed() => {
                    if result.is_err() || *self.shutdown_rx.borrow() {
                        info!("Maintenance worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass. Token purging and order expiry are independent; a failure
    /// in the first does not skip the second.
    pub async fn run_once(&self) -> Result<MaintenanceReport, AppError> {
        let now = Utc::now();
        let mut report = MaintenanceReport::default();

        let token_cutoff = now - to_chrono(self.config.token_retention)?;
        let purge = self.users.purge_refresh_tokens(token_cutoff).await;

        let order_cutoff = now - to_chrono(self.config.pending_order_ttl)?;
        let stale = self
            .orders
            .stale_pending_orders(order_cutoff, self.config.batch_size)
            .await?;
        for id in stale {
            match self
                .orders
                .transition_order(id, &[OrderStatus::Pending], OrderStatus::Cancelled, None, true)
                .await
            {
                Ok(Some(_)) => {
                    info!(order_id = %id, "Expired unpaid order");
                    report.orders_expired += 1;
                }
                // Paid or cancelled in the meantime
                Ok(None) => {}
                Err(e) => warn!(order_id = %id, error = ?e, "Failed to expire order"),
            }
        }

        report.tokens_purged = purge?;
        Ok(report)
    }
}

fn to_chrono(duration: Duration) -> Result<chrono::Duration, AppError> {
    chrono::Duration::from_std(duration)
        .map_err(|e| AppError::Internal(format!("duration out of range: {e}")))
}

/// Spawn the background worker as a tokio task
pub fn spawn_worker(
    users: Arc<dyn UserRepository>,
    orders: Arc<dyn OrderRepository>,
    config: WorkerConfig,
) -> (tokio::task::JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = MaintenanceWorker::new(users, orders, config, shutdown_rx);
    let handle = tokio::spawn(worker.run());
    (handle, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Address, AddressRequest, CartRepository, Order, Product, RefreshToken, User,
    };
    use crate::test_utils::MockStore;
    use uuid::Uuid;

    fn worker(store: &Arc<MockStore>, config: WorkerConfig) -> MaintenanceWorker {
        let (_, shutdown_rx) = watch::channel(false);
        MaintenanceWorker::new(store.clone(), store.clone(), config, shutdown_rx)
    }

    async fn pending_order(store: &MockStore, user: Uuid, product: &Product) -> Order {
        store.set_cart_quantity(user, product.id, 2).await.unwrap();
        let lines = store.cart_lines(user).await.unwrap();
        let address = Address::from_request(
            user,
            &AddressRequest::new("W", "9 Oak St", "Capital City", "99999", "US"),
        );
        let order = Order::from_cart(user, &lines, &address, None);
        store.place_order(&order).await.unwrap();
        order
    }

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.token_retention, Duration::from_secs(7 * 86400));
        assert_eq!(config.batch_size, 100);
        assert!(config.enabled);
    }

    #[tokio::test]
    async fn test_expires_stale_pending_orders_and_restores_stock() {
        let store = Arc::new(MockStore::new());
        let user = store.seed_user(User::new("w@example.com", "W", None)).id;
        let product = store.seed_product(Product::new("W", "Widget", "misc", 100, 10));

        let stale = pending_order(&store, user, &product).await;
        store.backdate_order(stale.id, chrono::Duration::hours(25));
        let fresh = pending_order(&store, user, &product).await;
        assert_eq!(store.product(product.id).unwrap().stock, 6);

        let report = worker(&store, WorkerConfig::default()).run_once().await.unwrap();

        assert_eq!(report.orders_expired, 1);
        assert_eq!(store.order(stale.id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(store.order(fresh.id).unwrap().status, OrderStatus::Pending);
        assert_eq!(store.product(product.id).unwrap().stock, 8);
    }

    #[tokio::test]
    async fn test_purges_old_revoked_and_expired_tokens() {
        let store = Arc::new(MockStore::new());
        let user = Uuid::new_v4();
        let now = Utc::now();

        let live = RefreshToken::new(user, "live".to_string(), now + chrono::Duration::days(1));
        let long_expired =
            RefreshToken::new(user, "expired".to_string(), now - chrono::Duration::days(30));
        let old_revoked =
            RefreshToken::new(user, "revoked".to_string(), now + chrono::Duration::days(1));
        let recently_revoked =
            RefreshToken::new(user, "recent".to_string(), now + chrono::Duration::days(1));
        for token in [&live, &long_expired, &old_revoked, &recently_revoked] {
            store.insert_refresh_token(token).await.unwrap();
        }
        store.revoke_token_at(old_revoked.id, now - chrono::Duration::days(8));
        store.revoke_token_at(recently_revoked.id, now - chrono::Duration::days(1));

        let report = worker(&store, WorkerConfig::default()).run_once().await.unwrap();

        assert_eq!(report.tokens_purged, 2);
        let remaining: Vec<String> = store
            .refresh_tokens_for(user)
            .into_iter()
            .map(|t| t.token_hash)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&"live".to_string()));
        assert!(remaining.contains(&"recent".to_string()));
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let store = Arc::new(MockStore::failing("db down"));
        assert!(worker(&store, WorkerConfig::default()).run_once().await.is_err());
    }

    #[tokio::test]
    async fn test_worker_disabled_returns_immediately() {
        let store = Arc::new(MockStore::new());
        let config = WorkerConfig {
            enabled: false,
            ..Default::default()
        };

        let start = std::time::Instant::now();
        worker(&store, config).run().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_worker_shutdown_via_channel() {
        let store = Arc::new(MockStore::new());
        let (handle, shutdown_tx) = spawn_worker(store.clone(), store, WorkerConfig::default());

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.is_ok(), "Worker should shutdown within 2 seconds");
    }
}
