//! Storefront API
//!
//! An e-commerce and account-management REST backend: registration and
//! token authentication (with external OAuth login), profiles and avatars,
//! a product catalog with reviews, carts, wishlists, shipping addresses,
//! checkout, card payments and back-office analytics.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   API Layer                  │
//! │ handlers, extractors, routing, rate limiting │
//! ├─────────────────────────────────────────────┤
//! │               Application Layer              │
//! │  one service per feature, state, worker      │
//! ├─────────────────────────────────────────────┤
//! │                 Domain Layer                 │
//! │      entities, DTOs, errors, port traits     │
//! ├─────────────────────────────────────────────┤
//! │             Infrastructure Layer             │
//! │ Postgres, JWT, bcrypt, Stripe, Google, files │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Every external system sits behind a trait in [`domain::traits`] and is
//! injected as `Arc<dyn Trait>`, so services run unchanged against the
//! in-memory doubles in `test_utils`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use storefront_api::api::create_router;
//! use storefront_api::app::{AppState, Repositories};
//! use storefront_api::infra::{PostgresClient, PostgresConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(PostgresClient::new(&database_url, PostgresConfig::default()).await?);
//!     db.run_migrations().await?;
//!
//!     let state = AppState::new(Repositories::from_shared(db), integrations, auth_settings);
//!     let router = create_router(Arc::new(state));
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod infra;

// Test utilities are available in tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
