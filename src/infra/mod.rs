//! Infrastructure layer implementations.

pub mod auth;
pub mod database;
pub mod email;
pub mod oauth;
pub mod observability;
pub mod payments;
pub mod storage;

pub use auth::{AccessClaims, JwtService, JwtSettings, PasswordHasher};
pub use database::{PostgresClient, PostgresConfig};
pub use email::LogEmailSender;
pub use oauth::{GoogleAuthProvider, GoogleConfig};
pub use payments::{StripeConfig, StripeGateway, UnconfiguredPaymentGateway};
pub use storage::{LocalFileStorage, sniff_image};
