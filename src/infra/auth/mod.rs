//! Credential primitives: access tokens, password hashes, refresh tokens.

pub mod jwt;
pub mod password;
pub mod refresh;

pub use jwt::{AccessClaims, JwtService, JwtSettings};
pub use password::PasswordHasher;
pub use refresh::{generate_refresh_token, hash_refresh_token};
