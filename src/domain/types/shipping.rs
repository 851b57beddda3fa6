//! Shipping addresses and rate quotes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const FLAT_SHIPPING_CENTS: i64 = 599;
pub const FREE_SHIPPING_THRESHOLD_CENTS: i64 = 5000;
pub const MAX_ADDRESSES_PER_USER: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Address {
    pub fn from_request(user_id: Uuid, req: &AddressRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            recipient: req.recipient.trim().to_string(),
            line1: req.line1.trim().to_string(),
            line2: req.line2.clone(),
            city: req.city.trim().to_string(),
            state: req.state.clone(),
            postal_code: req.postal_code.trim().to_string(),
            country: req.country.to_uppercase(),
            phone: req.phone.clone(),
            is_default: req.is_default,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the editable fields, keeping identity and timestamps.
    pub fn apply(&mut self, req: &AddressRequest) {
        let updated = Self::from_request(self.user_id, req);
        self.recipient = updated.recipient;
        self.line1 = updated.line1;
        self.line2 = updated.line2;
        self.city = updated.city;
        self.state = updated.state;
        self.postal_code = updated.postal_code;
        self.country = updated.country;
        self.phone = updated.phone;
        self.is_default = self.is_default || req.is_default;
        self.updated_at = Utc::now();
    }
}

fn validate_country(country: &str) -> Result<(), validator::ValidationError> {
    if country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("iso_3166_alpha2"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 120))]
    pub recipient: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    #[validate(length(max = 200))]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    /// ISO-3166 alpha-2 country code
    #[validate(custom(function = "validate_country"))]
    pub country: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl AddressRequest {
    pub fn new(recipient: &str, line1: &str, city: &str, postal_code: &str, country: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            line1: line1.to_string(),
            line2: None,
            city: city.to_string(),
            state: None,
            postal_code: postal_code.to_string(),
            country: country.to_string(),
            phone: None,
            is_default: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShippingQuoteQuery {
    pub subtotal_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ShippingQuote {
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub free_shipping_threshold_cents: i64,
}

impl ShippingQuote {
    /// Flat rate, waived once the subtotal reaches the free-shipping threshold.
    pub fn for_subtotal(subtotal_cents: i64) -> Self {
        let shipping_cents = if subtotal_cents >= FREE_SHIPPING_THRESHOLD_CENTS {
            0
        } else {
            FLAT_SHIPPING_CENTS
        };
        Self {
            subtotal_cents,
            shipping_cents,
            total_cents: subtotal_cents + shipping_cents,
            free_shipping_threshold_cents: FREE_SHIPPING_THRESHOLD_CENTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_below_threshold_charges_flat_rate() {
        let quote = ShippingQuote::for_subtotal(4999);
        assert_eq!(quote.shipping_cents, FLAT_SHIPPING_CENTS);
        assert_eq!(quote.total_cents, 4999 + FLAT_SHIPPING_CENTS);
    }

    #[test]
    fn test_quote_at_threshold_is_free() {
        let quote = ShippingQuote::for_subtotal(FREE_SHIPPING_THRESHOLD_CENTS);
        assert_eq!(quote.shipping_cents, 0);
    }

    #[test]
    fn test_address_request_country_validation() {
        let ok = AddressRequest::new("Ann", "1 Main St", "Springfield", "12345", "us");
        assert!(ok.validate().is_ok());
        assert_eq!(Address::from_request(Uuid::new_v4(), &ok).country, "US");

        let bad = AddressRequest::new("Ann", "1 Main St", "Springfield", "12345", "USA");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_apply_keeps_default_flag() {
        let req = AddressRequest::new("Ann", "1 Main St", "Springfield", "12345", "US");
        let mut address = Address::from_request(Uuid::new_v4(), &req);
        address.is_default = true;
        let id = address.id;

        let mut update = AddressRequest::new("Ann B", "2 Side St", "Shelbyville", "54321", "US");
        update.is_default = false;
        address.apply(&update);

        assert_eq!(address.id, id);
        assert_eq!(address.recipient, "Ann B");
        assert!(address.is_default);
    }
}
