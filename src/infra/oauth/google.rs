//! Google ID token validation through the tokeninfo endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::domain::{
    AppError, ExternalAuthProvider, ExternalIdentity, ExternalServiceError, normalize_email,
};

pub const PROVIDER: &str = "google";
pub const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

const ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth client id the ID token must be issued for. External login is
    /// disabled when unset.
    pub client_id: Option<String>,
    pub tokeninfo_url: String,
    pub timeout: Duration,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            tokeninfo_url: DEFAULT_TOKENINFO_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// tokeninfo returns booleans as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn is_true(&self) -> bool {
        match self {
            Flag::Bool(value) => *value,
            Flag::Text(value) => value.eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    iss: Option<String>,
    aud: String,
    sub: String,
    email: Option<String>,
    email_verified: Option<Flag>,
    name: Option<String>,
    picture: Option<String>,
}

fn identity_from_claims(claims: TokenInfo, client_id: &str) -> Result<ExternalIdentity, AppError> {
    let invalid = |reason: &str| AppError::Authentication(format!("Invalid Google token: {reason}"));

    if claims.aud != client_id {
        return Err(invalid("audience mismatch"));
    }
    if let Some(iss) = claims.iss.as_deref() {
        if !ISSUERS.contains(&iss) {
            return Err(invalid("unexpected issuer"));
        }
    }
    let email = claims.email.ok_or_else(|| invalid("missing email"))?;
    if !claims.email_verified.is_some_and(|flag| flag.is_true()) {
        return Err(invalid("email not verified"));
    }

    Ok(ExternalIdentity {
        provider: PROVIDER.to_string(),
        subject: claims.sub,
        email: normalize_email(&email),
        email_verified: true,
        name: claims.name.filter(|n| !n.trim().is_empty()),
        picture: claims.picture,
    })
}

pub struct GoogleAuthProvider {
    http_client: Client,
    config: GoogleConfig,
}

impl GoogleAuthProvider {
    pub fn new(config: GoogleConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ExternalService(ExternalServiceError::HttpError(e.to_string())))?;
        info!(
            enabled = config.client_id.is_some(),
            "Created Google identity provider"
        );
        Ok(Self {
            http_client,
            config,
        })
    }
}

#[async_trait]
impl ExternalAuthProvider for GoogleAuthProvider {
    #[instrument(skip(self, id_token))]
    async fn validate(&self, provider: &str, id_token: &str) -> Result<ExternalIdentity, AppError> {
        if !provider.eq_ignore_ascii_case(PROVIDER) {
            return Err(AppError::invalid(
                "provider",
                format!("unsupported identity provider '{provider}'"),
            ));
        }
        let Some(client_id) = self.config.client_id.as_deref() else {
            return Err(AppError::NotSupported(
                "Google sign-in is not configured".to_string(),
            ));
        };

        let response = self
            .http_client
            .get(&self.config.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::ExternalService(ExternalServiceError::Timeout(e.to_string()))
                } else {
                    AppError::ExternalService(ExternalServiceError::Unavailable(e.to_string()))
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AppError::ExternalService(ExternalServiceError::Unavailable(
                format!("tokeninfo returned {status}"),
            )));
        }
        if !status.is_success() {
            warn!(status = %status, "Google rejected ID token");
            return Err(AppError::Authentication(
                "Invalid Google token".to_string(),
            ));
        }

        let claims: TokenInfo = response.json().await.map_err(|e| {
            AppError::ExternalService(ExternalServiceError::HttpError(e.to_string()))
        })?;
        identity_from_claims(claims, client_id)
    }
}
