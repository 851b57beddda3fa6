//! The API layer, containing web handlers and routing.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use extract::{AdminUser, AuthUser, MaybeUser};
pub use router::{RateLimitConfig, RouterConfig, create_router, create_router_with_config};
