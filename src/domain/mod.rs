//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AppError, ConfigError, DatabaseError, ExternalServiceError, StorageError, ValidationError,
};
pub use traits::{
    AddressRepository, AnalyticsRepository, CartRepository, EmailMessage, EmailSender,
    ExternalAuthProvider, FileStorage, HealthCheck, OrderRepository, PaymentGateway,
    PaymentRepository, ProductRepository, ReviewRepository, UserRepository, WishlistRepository,
};
pub use types::*;
