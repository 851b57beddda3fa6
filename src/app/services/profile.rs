//! Self-service account management.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{send_best_effort, validate_request};
use crate::domain::{
    AppError, ChangePasswordRequest, EmailMessage, EmailSender, FileStorage, StorageError,
    UpdateProfileRequest, User, UserDto, UserRepository,
};
use crate::infra::auth::PasswordHasher;
use crate::infra::storage::sniff_image;

/// Largest accepted avatar upload.
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

pub struct ProfileService {
    users: Arc<dyn UserRepository>,
    storage: Arc<dyn FileStorage>,
    email: Arc<dyn EmailSender>,
    hasher: PasswordHasher,
}

impl ProfileService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        storage: Arc<dyn FileStorage>,
        email: Arc<dyn EmailSender>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            users,
            storage,
            email,
            hasher,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserDto, AppError> {
        Ok(UserDto::from(&self.load(user_id).await?))
    }

    #[instrument(skip(self, request))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: &UpdateProfileRequest,
    ) -> Result<UserDto, AppError> {
        validate_request(request)?;

        let mut user = self.load(user_id).await?;
        if let Some(name) = &request.display_name {
            user.display_name = name.trim().to_string();
        }
        if let Some(phone) = &request.phone {
            let phone = phone.trim();
            user.phone = (!phone.is_empty()).then(|| phone.to_string());
        }
        user.touch();
        self.users.update_user(&user).await?;

        info!(user_id = %user.id, "Profile updated");
        Ok(UserDto::from(&user))
    }

    /// Sets a new password and signs the account out everywhere.
    ///
    /// Accounts created through an external provider have no password yet
    /// and may set one without supplying `current_password`.
    #[instrument(skip(self, request))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: &ChangePasswordRequest,
    ) -> Result<(), AppError> {
        validate_request(request)?;

        let mut user = self.load(user_id).await?;
        if let Some(existing) = user.password_hash.as_deref() {
            let current = request.current_password.as_deref().unwrap_or_default();
            if !self.hasher.verify(current, existing).await? {
                warn!(user_id = %user.id, "Password change rejected: wrong current password");
                return Err(AppError::Authentication(
                    "Current password is incorrect".to_string(),
                ));
            }
        }

        user.password_hash = Some(self.hasher.hash(&request.new_password).await?);
        user.touch();
        self.users.update_user(&user).await?;
        let revoked = self.users.revoke_user_refresh_tokens(user.id).await?;
        info!(user_id = %user.id, revoked, "Password changed");

        send_best_effort(
            self.email.as_ref(),
            EmailMessage::new(
                &user.email,
                "Your password was changed",
                "If this wasn't you, contact support immediately.",
            ),
        )
        .await;
        Ok(())
    }

    /// Stores a new avatar. The image type comes from the file signature;
    /// the declared content type is only logged.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_avatar(
        &self,
        user_id: Uuid,
        bytes: &[u8],
        declared_content_type: Option<&str>,
    ) -> Result<UserDto, AppError> {
        if bytes.len() > MAX_AVATAR_BYTES {
            return Err(StorageError::TooLarge {
                size: bytes.len(),
                limit: MAX_AVATAR_BYTES,
            }
            .into());
        }
        if bytes.is_empty() {
            return Err(AppError::invalid("file", "upload is empty"));
        }
        let Some(kind) = sniff_image(bytes) else {
            warn!(declared = ?declared_content_type, "Rejected avatar with unknown signature");
            return Err(StorageError::UnsupportedType(
                declared_content_type.unwrap_or("unknown").to_string(),
            )
            .into());
        };
        if declared_content_type.is_some_and(|declared| declared != kind.content_type()) {
            debug!(
                declared = ?declared_content_type,
                detected = kind.content_type(),
                "Declared avatar type differs from file signature"
            );
        }

        let mut user = self.load(user_id).await?;
        let key = format!("avatars/{}.{}", Uuid::new_v4(), kind.extension());
        let url = self.storage.save(&key, bytes, kind.content_type()).await?;

        let previous = user.avatar_url.replace(url);
        user.touch();
        self.users.update_user(&user).await?;

        if let Some(previous) = previous {
            if let Err(e) = self.storage.delete(&previous).await {
                warn!(error = ?e, url = %previous, "Failed to delete previous avatar");
            }
        }

        info!(user_id = %user.id, "Avatar updated");
        Ok(UserDto::from(&user))
    }

    /// Deactivates the account. Data is kept for order history.
    #[instrument(skip(self))]
    pub async fn delete_account(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut user = self.load(user_id).await?;
        user.is_active = false;
        user.updated_at = Utc::now();
        self.users.update_user(&user).await?;
        let revoked = self.users.revoke_user_refresh_tokens(user.id).await?;
        info!(user_id = %user.id, revoked, "Account deactivated");
        Ok(())
    }

    async fn load(&self, user_id: Uuid) -> Result<User, AppError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user"))
    }
}
