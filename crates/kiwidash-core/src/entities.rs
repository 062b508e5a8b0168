use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{OrderStatus, PaymentMethod, ProductStatus};
use crate::ValidationError;

/// ISO 4217 code assumed when a payload carries no currency.
pub const DEFAULT_CURRENCY: &str = "BRL";

/// Display name stored for customers whose payload carries no name.
pub const UNKNOWN_CUSTOMER_NAME: &str = "Cliente sem nome";

/// Email stored for customers whose payload carries no email. Downstream
/// readers rely on `customers.email` never being null.
pub const UNKNOWN_CUSTOMER_EMAIL: &str = "sem-email@kiwify.invalid";

/// A Kiwify product, normalized for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    /// Upstream product id; the upsert conflict key.
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Price in minor units (centavos for BRL).
    pub price_cents: i64,
    pub currency: String,
    pub status: ProductStatus,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    /// The upstream payload exactly as received.
    pub raw: serde_json::Value,
}

impl CanonicalProduct {
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the external id or currency is blank
    /// or the price is negative.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.external_id.trim().is_empty() {
            return Err(ValidationError::EmptyExternalId { entity: "product" });
        }
        if self.price_cents < 0 {
            return Err(ValidationError::NegativeAmount {
                entity: "product",
                external_id: self.external_id.clone(),
                field: "price_cents",
                value: self.price_cents,
            });
        }
        if self.currency.trim().is_empty() {
            return Err(ValidationError::EmptyCurrency {
                entity: "product",
                external_id: self.external_id.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCustomer {
    pub external_id: String,
    /// Falls back to [`UNKNOWN_CUSTOMER_NAME`].
    pub name: String,
    /// Falls back to [`UNKNOWN_CUSTOMER_EMAIL`]; never empty.
    pub email: String,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

impl CanonicalCustomer {
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the external id or email is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.external_id.trim().is_empty() {
            return Err(ValidationError::EmptyExternalId { entity: "customer" });
        }
        if self.email.trim().is_empty() {
            return Err(ValidationError::EmptyEmail {
                external_id: self.external_id.clone(),
            });
        }
        Ok(())
    }

    /// `true` when the email is the placeholder rather than a real address.
    #[must_use]
    pub fn has_placeholder_email(&self) -> bool {
        self.email == UNKNOWN_CUSTOMER_EMAIL
    }
}

/// A Kiwify sale. Product and customer are referenced by external id; the
/// sink resolves them to surrogate keys at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    pub external_id: String,
    pub product_external_id: String,
    pub customer_external_id: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub gross_cents: i64,
    pub fee_cents: i64,
    pub net_cents: i64,
    pub commission_cents: i64,
    pub currency: String,
    pub approved_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

impl CanonicalOrder {
    /// # Errors
    ///
    /// Returns [`ValidationError`] when an identifier is blank or any
    /// monetary field is negative.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.external_id.trim().is_empty() {
            return Err(ValidationError::EmptyExternalId { entity: "order" });
        }
        if self.product_external_id.trim().is_empty() {
            return Err(ValidationError::MissingReference {
                external_id: self.external_id.clone(),
                field: "product_external_id",
            });
        }
        if self.customer_external_id.trim().is_empty() {
            return Err(ValidationError::MissingReference {
                external_id: self.external_id.clone(),
                field: "customer_external_id",
            });
        }
        for (field, value) in [
            ("gross_cents", self.gross_cents),
            ("fee_cents", self.fee_cents),
            ("net_cents", self.net_cents),
            ("commission_cents", self.commission_cents),
        ] {
            if value < 0 {
                return Err(ValidationError::NegativeAmount {
                    entity: "order",
                    external_id: self.external_id.clone(),
                    field,
                    value,
                });
            }
        }
        if self.currency.trim().is_empty() {
            return Err(ValidationError::EmptyCurrency {
                entity: "order",
                external_id: self.external_id.clone(),
            });
        }
        Ok(())
    }
}
