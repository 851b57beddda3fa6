//! User administration.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::Caller;
use crate::domain::{
    AppError, PaginatedResponse, Role, User, UserDto, UserListQuery, UserRepository,
};

pub struct AdminService {
    users: Arc<dyn UserRepository>,
}

impl AdminService {
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    #[instrument(skip(self, query))]
    pub async fn list_users(
        &self,
        query: &UserListQuery,
    ) -> Result<PaginatedResponse<UserDto>, AppError> {
        let page = query.pagination();
        let (users, total) = self.users.list_users(query.search_term(), &page).await?;
        Ok(PaginatedResponse::new(users, total, &page).map(|u| UserDto::from(&u)))
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: Uuid) -> Result<UserDto, AppError> {
        Ok(UserDto::from(&self.load(id).await?))
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn set_role(&self, actor: Caller, id: Uuid, role: Role) -> Result<UserDto, AppError> {
        if actor.id == id {
            warn!("Admin attempted to change own role");
            return Err(AppError::invalid("role", "you cannot change your own role"));
        }

        let mut user = self.load(id).await?;
        if user.role != role {
            user.role = role;
            user.touch();
            self.users.update_user(&user).await?;
            info!(user_id = %user.id, role = %role, "User role changed");
        }
        Ok(UserDto::from(&user))
    }

    /// Deactivating an account also revokes all of its refresh tokens.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn set_active(
        &self,
        actor: Caller,
        id: Uuid,
        is_active: bool,
    ) -> Result<UserDto, AppError> {
        if actor.id == id && !is_active {
            warn!("Admin attempted to deactivate own account");
            return Err(AppError::invalid(
                "is_active",
                "you cannot deactivate your own account",
            ));
        }

        let mut user = self.load(id).await?;
        if user.is_active != is_active {
            user.is_active = is_active;
            user.touch();
            self.users.update_user(&user).await?;
            if !is_active {
                let revoked = self.users.revoke_user_refresh_tokens(user.id).await?;
                info!(user_id = %user.id, revoked, "User deactivated");
            } else {
                info!(user_id = %user.id, "User reactivated");
            }
        }
        Ok(UserDto::from(&user))
    }

    async fn load(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {id}")))
    }
}
