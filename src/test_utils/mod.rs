//! Test utilities and mock implementations.
//!
//! In-memory doubles for every domain trait plus fixtures for building a
//! fully wired [`AppState`] in unit tests, integration tests and benches.

pub mod mocks;

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use crate::app::{AppState, AuthSettings, Integrations, Repositories};
use crate::domain::User;
use crate::infra::auth::{JwtService, JwtSettings, PasswordHasher};

pub use mocks::{
    MockBackends, MockConfig, MockEmailSender, MockExternalAuthProvider, MockFileStorage,
    MockPaymentGateway, MockStore,
};

pub const TEST_JWT_SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";

pub fn test_jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: SecretString::from(TEST_JWT_SECRET),
        issuer: "storefront-api".to_string(),
        audience: "storefront-client".to_string(),
        access_ttl: Duration::from_secs(900),
    }
}

pub fn test_jwt() -> Arc<JwtService> {
    Arc::new(JwtService::new(&test_jwt_settings()).expect("test JWT settings are valid"))
}

/// Minimum bcrypt cost so tests stay fast.
pub fn test_hasher() -> PasswordHasher {
    PasswordHasher::new(4)
}

/// Wires every service to the given mocks.
pub fn test_state(backends: &MockBackends) -> AppState {
    AppState::new(
        Repositories::from_shared(Arc::clone(&backends.store)),
        Integrations {
            payments: backends.payments.clone(),
            identity: backends.identity.clone(),
            storage: backends.storage.clone(),
            email: backends.email.clone(),
        },
        AuthSettings {
            jwt: test_jwt(),
            hasher: test_hasher(),
            refresh_ttl: Duration::from_secs(14 * 86400),
            cookie_secure: false,
        },
    )
}

/// `Authorization` header value for the given user.
pub fn bearer_for(state: &AppState, user: &User) -> String {
    let token = state.jwt.issue(user).expect("token issuance succeeds");
    format!("Bearer {token}")
}
