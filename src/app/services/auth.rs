//! Registration, credential login, external login and the refresh token
//! lifecycle.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{send_best_effort, validate_request};
use crate::domain::{
    AppError, AuthResponse, DatabaseError, EmailMessage, EmailSender, ExternalAuthProvider,
    ExternalLoginRequest, LoginRequest, RefreshToken, RegisterRequest, User, UserDto,
    UserRepository, normalize_email,
};
use crate::infra::auth::{JwtService, PasswordHasher, generate_refresh_token, hash_refresh_token};
use crate::infra::observability::record_login;

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_REFRESH: &str = "Invalid or expired refresh token";

/// A freshly issued token pair. The raw refresh token leaves the process
/// only through the HttpOnly cookie (or body fallback) and is never stored.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub response: AuthResponse,
    pub refresh_token: String,
    pub refresh_ttl: Duration,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    identity: Arc<dyn ExternalAuthProvider>,
    email: Arc<dyn EmailSender>,
    jwt: Arc<JwtService>,
    hasher: PasswordHasher,
    refresh_ttl: Duration,
}

impl AuthService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        identity: Arc<dyn ExternalAuthProvider>,
        email: Arc<dyn EmailSender>,
        jwt: Arc<JwtService>,
        hasher: PasswordHasher,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            users,
            identity,
            email,
            jwt,
            hasher,
            refresh_ttl,
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Creates a customer account and signs it in.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed input and `Database(Duplicate)` when the
    /// email is already registered.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthSession, AppError> {
        validate_request(request)?;

        let email = normalize_email(&request.email);
        if self.users.find_user_by_email(&email).await?.is_some() {
            warn!("Registration rejected: email already in use");
            return Err(DatabaseError::duplicate_of("users_email_key").into());
        }

        let password_hash = self.hasher.hash(&request.password).await?;
        let mut user = User::new(&email, &request.display_name, Some(password_hash));
        user.last_login_at = Some(Utc::now());
        self.users.create_user(&user).await?;
        info!(user_id = %user.id, "User registered");

        send_best_effort(
            self.email.as_ref(),
            EmailMessage::new(
                &user.email,
                "Welcome to the store",
                format!("Hi {}, your account is ready.", user.display_name),
            ),
        )
        .await;

        record_login("register");
        self.start_session(&user).await
    }

    #[instrument(skip(self, request))]
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthSession, AppError> {
        validate_request(request)?;

        let email = normalize_email(&request.email);
        let Some(mut user) = self.users.find_user_by_email(&email).await? else {
            warn!("Login failed: unknown email");
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        };
        let Some(hash) = user.password_hash.as_deref() else {
            warn!(user_id = %user.id, "Login failed: account has no password");
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        };
        if !self.hasher.verify(&request.password, hash).await? {
            warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }
        if !user.is_active {
            warn!(user_id = %user.id, "Login rejected: account disabled");
            return Err(AppError::Authorization("Account is disabled".to_string()));
        }

        let now = Utc::now();
        user.last_login_at = Some(now);
        user.updated_at = now;
        self.users.update_user(&user).await?;

        info!(user_id = %user.id, "User logged in");
        record_login("password");
        self.start_session(&user).await
    }

    /// Exchanges a refresh token for a new pair, revoking the presented one.
    ///
    /// Presenting a token that was already rotated or revoked is treated as
    /// theft: every active token of the account is revoked.
    #[instrument(skip(self, raw_token))]
    pub async fn refresh(&self, raw_token: &str) -> Result<AuthSession, AppError> {
        let raw_token = raw_token.trim();
        if raw_token.is_empty() {
            return Err(AppError::Authentication("Missing refresh token".to_string()));
        }

        let Some(current) = self
            .users
            .find_refresh_token(&hash_refresh_token(raw_token))
            .await?
        else {
            return Err(AppError::Authentication(INVALID_REFRESH.to_string()));
        };

        if current.is_revoked() {
            let revoked = self.users.revoke_user_refresh_tokens(current.user_id).await?;
            warn!(
                user_id = %current.user_id,
                revoked,
                "Refresh token reuse detected, revoked all sessions"
            );
            return Err(AppError::Authentication(INVALID_REFRESH.to_string()));
        }
        if current.is_expired(Utc::now()) {
            return Err(AppError::Authentication(INVALID_REFRESH.to_string()));
        }

        let user = self
            .users
            .get_user(current.user_id)
            .await?
            .ok_or_else(|| AppError::Authentication(INVALID_REFRESH.to_string()))?;
        if !user.is_active {
            return Err(AppError::Authorization("Account is disabled".to_string()));
        }

        let raw = generate_refresh_token();
        let replacement = RefreshToken::new(user.id, hash_refresh_token(&raw), self.refresh_expiry()?);
        if !self.users.rotate_refresh_token(current.id, &replacement).await? {
            // Lost a race with a concurrent rotation of the same token
            let revoked = self.users.revoke_user_refresh_tokens(user.id).await?;
            warn!(user_id = %user.id, revoked, "Concurrent refresh token rotation");
            return Err(AppError::Authentication(INVALID_REFRESH.to_string()));
        }

        record_login("refresh");
        self.session_for(&user, raw)
    }

    /// Revokes the presented token if it is still active. Unknown tokens
    /// are not an error.
    #[instrument(skip(self, raw_token))]
    pub async fn logout(&self, raw_token: Option<&str>) -> Result<(), AppError> {
        let Some(raw_token) = raw_token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(());
        };
        if let Some(token) = self
            .users
            .find_refresh_token(&hash_refresh_token(raw_token))
            .await?
        {
            if self.users.revoke_refresh_token(token.id).await? {
                info!(user_id = %token.user_id, "User logged out");
            }
        }
        Ok(())
    }

    /// Signs in with a provider ID token, creating or linking the local
    /// account in a single transaction.
    #[instrument(skip(self, request), fields(provider = %request.provider))]
    pub async fn external_login(
        &self,
        request: &ExternalLoginRequest,
    ) -> Result<AuthSession, AppError> {
        validate_request(request)?;

        let identity = self
            .identity
            .validate(request.provider.trim(), &request.id_token)
            .await?;

        let display_name = identity
            .name
            .clone()
            .unwrap_or_else(|| local_part(&identity.email).to_string());
        let mut candidate = User::new(&identity.email, &display_name, None);
        candidate.avatar_url = identity.picture.clone();

        let raw = generate_refresh_token();
        let outcome = self
            .users
            .upsert_external_login(
                &identity,
                &candidate,
                &hash_refresh_token(&raw),
                self.refresh_expiry()?,
            )
            .await?;

        if outcome.refresh_token.is_none() || !outcome.user.is_active {
            warn!(user_id = %outcome.user.id, "External login rejected: account disabled");
            return Err(AppError::Authorization("Account is disabled".to_string()));
        }

        if outcome.created_user {
            send_best_effort(
                self.email.as_ref(),
                EmailMessage::new(
                    &outcome.user.email,
                    "Welcome to the store",
                    format!("Hi {}, your account is ready.", outcome.user.display_name),
                ),
            )
            .await;
        }

        info!(
            user_id = %outcome.user.id,
            created_user = outcome.created_user,
            linked_login = outcome.linked_login,
            "External login succeeded"
        );
        record_login("external");
        self.session_for(&outcome.user, raw)
    }

    #[instrument(skip(self))]
    pub async fn me(&self, user_id: uuid::Uuid) -> Result<UserDto, AppError> {
        self.users
            .get_user(user_id)
            .await?
            .map(|user| UserDto::from(&user))
            .ok_or_else(|| AppError::not_found("user"))
    }

    async fn start_session(&self, user: &User) -> Result<AuthSession, AppError> {
        let raw = generate_refresh_token();
        let token = RefreshToken::new(user.id, hash_refresh_token(&raw), self.refresh_expiry()?);
        self.users.insert_refresh_token(&token).await?;
        self.session_for(user, raw)
    }

    fn session_for(&self, user: &User, refresh_token: String) -> Result<AuthSession, AppError> {
        Ok(AuthSession {
            response: AuthResponse {
                access_token: self.jwt.issue(user)?,
                token_type: "Bearer".to_string(),
                expires_in: self.jwt.ttl_secs(),
                user: UserDto::from(user),
            },
            refresh_token,
            refresh_ttl: self.refresh_ttl,
        })
    }

    fn refresh_expiry(&self) -> Result<DateTime<Utc>, AppError> {
        let ttl = chrono::Duration::from_std(self.refresh_ttl)
            .map_err(|e| AppError::Internal(format!("invalid refresh token ttl: {e}")))?;
        Ok(Utc::now() + ttl)
    }
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::test_utils::{
        MockEmailSender, MockExternalAuthProvider, MockStore, test_hasher, test_jwt,
    };

    struct Fixture {
        store: Arc<MockStore>,
        identity: Arc<MockExternalAuthProvider>,
        email: Arc<MockEmailSender>,
        service: AuthService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MockStore::new());
        let identity = Arc::new(MockExternalAuthProvider::new());
        let email = Arc::new(MockEmailSender::new());
        let service = AuthService::new(
            store.clone(),
            identity.clone(),
            email.clone(),
            test_jwt(),
            test_hasher(),
            Duration::from_secs(14 * 86400),
        );
        Fixture {
            store,
            identity,
            email,
            service,
        }
    }

    async fn registered(f: &Fixture) -> AuthSession {
        f.service
            .register(&RegisterRequest::new("Ann@Example.com", "hunter22", "Ann"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_normalizes_email_and_sends_welcome() {
        let f = fixture();
        let session = registered(&f).await;

        assert_eq!(session.response.user.email, "ann@example.com");
        assert_eq!(session.response.token_type, "Bearer");
        assert_eq!(session.response.user.role, Role::Customer);
        assert_eq!(session.refresh_token.len(), 43);
        assert_eq!(f.email.sent_to("ann@example.com").len(), 1);

        let tokens = f.store.refresh_tokens_for(session.response.user.id);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token_hash, hash_refresh_token(&session.refresh_token));
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let f = fixture();
        registered(&f).await;
        let err = f
            .service
            .register(&RegisterRequest::new("ann@example.com", "other123", "Ann"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_register_survives_email_failure() {
        let store = Arc::new(MockStore::new());
        let service = AuthService::new(
            store,
            Arc::new(MockExternalAuthProvider::new()),
            Arc::new(MockEmailSender::failing()),
            test_jwt(),
            test_hasher(),
            Duration::from_secs(3600),
        );
        let result = service
            .register(&RegisterRequest::new("a@b.io", "hunter22", "A"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_login_errors_share_message() {
        let f = fixture();
        registered(&f).await;

        let unknown = f
            .service
            .login(&LoginRequest::new("nobody@example.com", "hunter22"))
            .await
            .unwrap_err();
        let wrong = f
            .service
            .login(&LoginRequest::new("ann@example.com", "wrong-pass1"))
            .await
            .unwrap_err();

        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(wrong, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_login_success_records_last_login() {
        let f = fixture();
        let id = registered(&f).await.response.user.id;

        let session = f
            .service
            .login(&LoginRequest::new(" ANN@example.com ", "hunter22"))
            .await
            .unwrap();
        assert_eq!(session.response.user.id, id);
        assert!(f.store.user(id).unwrap().last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_login_without_password_is_rejected() {
        let f = fixture();
        f.store.seed_user(User::new("ext@example.com", "Ext", None));
        let err = f
            .service
            .login(&LoginRequest::new("ext@example.com", "anything1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(m) if m == INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_login_inactive_account_forbidden() {
        let f = fixture();
        let id = registered(&f).await.response.user.id;
        let mut user = f.store.user(id).unwrap();
        user.is_active = false;
        f.store.seed_user(user);

        let err = f
            .service
            .login(&LoginRequest::new("ann@example.com", "hunter22"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let f = fixture();
        let first = registered(&f).await;

        let second = f.service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        let tokens = f.store.refresh_tokens_for(first.response.user.id);
        let old = tokens
            .iter()
            .find(|t| t.token_hash == hash_refresh_token(&first.refresh_token))
            .unwrap();
        let new = tokens
            .iter()
            .find(|t| t.token_hash == hash_refresh_token(&second.refresh_token))
            .unwrap();
        assert!(old.is_revoked());
        assert_eq!(old.replaced_by, Some(new.id));
        assert!(!new.is_revoked());
    }

    #[tokio::test]
    async fn test_refresh_reuse_revokes_all_sessions() {
        let f = fixture();
        let first = registered(&f).await;
        let second = f.service.refresh(&first.refresh_token).await.unwrap();

        let err = f.service.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));

        // The legitimately rotated token is now dead too
        assert!(f.service.refresh(&second.refresh_token).await.is_err());
        assert!(
            f.store
                .refresh_tokens_for(first.response.user.id)
                .iter()
                .all(RefreshToken::is_revoked)
        );
    }

    #[tokio::test]
    async fn test_refresh_rejects_unknown_and_expired() {
        let f = fixture();
        assert!(f.service.refresh("").await.is_err());
        assert!(f.service.refresh("not-a-token").await.is_err());

        let user = f.store.seed_user(User::new("old@example.com", "Old", None));
        let raw = generate_refresh_token();
        let expired = RefreshToken::new(
            user.id,
            hash_refresh_token(&raw),
            Utc::now() - chrono::Duration::minutes(1),
        );
        f.store.insert_refresh_token(&expired).await.unwrap();
        let err = f.service.refresh(&raw).await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let f = fixture();
        let session = registered(&f).await;

        f.service.logout(Some(&session.refresh_token)).await.unwrap();
        f.service.logout(Some(&session.refresh_token)).await.unwrap();
        f.service.logout(None).await.unwrap();
        f.service.logout(Some("garbage")).await.unwrap();

        assert!(f.service.refresh(&session.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_external_login_creates_then_reuses_account() {
        let f = fixture();
        f.identity.register(
            "id-token",
            MockExternalAuthProvider::google_identity("sub-1", "new@example.com"),
        );
        let request = ExternalLoginRequest {
            provider: "google".to_string(),
            id_token: "id-token".to_string(),
        };

        let first = f.service.external_login(&request).await.unwrap();
        assert!(!first.response.user.has_password);
        assert_eq!(
            first.response.user.avatar_url.as_deref(),
            Some("https://lh3.example/photo.png")
        );
        assert_eq!(f.email.sent_to("new@example.com").len(), 1);

        let second = f.service.external_login(&request).await.unwrap();
        assert_eq!(second.response.user.id, first.response.user.id);
        assert_eq!(f.store.external_login_count(), 1);
        assert_eq!(f.email.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_external_login_links_existing_email() {
        let f = fixture();
        let existing = registered(&f).await.response.user;
        f.identity.register(
            "tok",
            MockExternalAuthProvider::google_identity("sub-9", "ann@example.com"),
        );

        let session = f
            .service
            .external_login(&ExternalLoginRequest {
                provider: "google".to_string(),
                id_token: "tok".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(session.response.user.id, existing.id);
        assert!(session.response.user.has_password);
    }

    #[tokio::test]
    async fn test_external_login_inactive_user_forbidden() {
        let f = fixture();
        let mut user = User::new("gone@example.com", "Gone", None);
        user.is_active = false;
        let user = f.store.seed_user(user);
        f.identity.register(
            "tok",
            MockExternalAuthProvider::google_identity("sub-2", "gone@example.com"),
        );

        let err = f
            .service
            .external_login(&ExternalLoginRequest {
                provider: "google".to_string(),
                id_token: "tok".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
        assert_eq!(f.store.external_login_count(), 0);
        assert!(f.store.refresh_tokens_for(user.id).is_empty());
        assert_eq!(f.store.user(user.id).unwrap().last_login_at, None);
    }

    #[tokio::test]
    async fn test_external_login_invalid_token() {
        let f = fixture();
        let err = f
            .service
            .external_login(&ExternalLoginRequest {
                provider: "google".to_string(),
                id_token: "forged".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_me() {
        let f = fixture();
        let id = registered(&f).await.response.user.id;
        assert_eq!(f.service.me(id).await.unwrap().id, id);
        assert!(matches!(
            f.service.me(uuid::Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
