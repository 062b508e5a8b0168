pub mod app_config;
pub mod config;
pub mod entities;
pub mod status;
pub mod webhook;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use entities::{
    CanonicalCustomer, CanonicalOrder, CanonicalProduct, DEFAULT_CURRENCY,
    UNKNOWN_CUSTOMER_EMAIL, UNKNOWN_CUSTOMER_NAME,
};
pub use status::{OrderStatus, PaymentMethod, ProductStatus};
pub use webhook::IncomingWebhookEvent;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Invariant violations detected when a normalized entity crosses into
/// persistence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{entity} has an empty external id")]
    EmptyExternalId { entity: &'static str },

    #[error("{entity} {external_id}: {field} must not be negative (got {value})")]
    NegativeAmount {
        entity: &'static str,
        external_id: String,
        field: &'static str,
        value: i64,
    },

    #[error("customer {external_id} has an empty email")]
    EmptyEmail { external_id: String },

    #[error("order {external_id} is missing {field}")]
    MissingReference {
        external_id: String,
        field: &'static str,
    },

    #[error("{entity} {external_id} has an empty currency code")]
    EmptyCurrency {
        entity: &'static str,
        external_id: String,
    },
}
