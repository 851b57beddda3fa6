//! Use cases, one service per feature.
//!
//! Services hold trait objects only, validate their input, and leave
//! authorization of the route itself (user vs admin) to the API layer.

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod health;
pub mod orders;
pub mod payments;
pub mod profile;
pub mod reviews;
pub mod shipping;
pub mod wishlist;

pub use admin::AdminService;
pub use analytics::AnalyticsService;
pub use auth::{AuthService, AuthSession};
pub use cart::CartService;
pub use catalog::CatalogService;
pub use health::HealthService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use profile::{MAX_AVATAR_BYTES, ProfileService};
pub use reviews::ReviewService;
pub use shipping::ShippingService;
pub use wishlist::WishlistService;

use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::domain::{AppError, EmailMessage, EmailSender, Role};

/// The authenticated principal a request acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners and admins may see a resource; everyone else gets a 404.
    pub fn can_access(&self, owner: Uuid) -> bool {
        self.id == owner || self.is_admin()
    }
}

pub(crate) fn validate_request<T: Validate>(request: &T) -> Result<(), AppError> {
    request.validate().map_err(|e| {
        warn!(error = %e, "Request validation failed");
        AppError::from(e)
    })
}

/// Email is never allowed to fail the operation that triggered it.
pub(crate) async fn send_best_effort(sender: &dyn EmailSender, message: EmailMessage) {
    if let Err(e) = sender.send(&message).await {
        warn!(error = ?e, to = %message.to, subject = %message.subject, "Failed to send email");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockEmailSender;

    #[test]
    fn test_caller_access() {
        let owner = Uuid::new_v4();
        assert!(Caller::new(owner, Role::Customer).can_access(owner));
        assert!(!Caller::new(Uuid::new_v4(), Role::Customer).can_access(owner));
        assert!(Caller::new(Uuid::new_v4(), Role::Admin).can_access(owner));
    }

    #[tokio::test]
    async fn test_send_best_effort_swallows_failures() {
        let sender = MockEmailSender::failing();
        send_best_effort(&sender, EmailMessage::new("a@b.io", "Hi", "body")).await;
        assert!(sender.sent().is_empty());
    }
}
