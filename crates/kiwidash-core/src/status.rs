//! Closed vocabularies for order status, payment method, and product
//! lifecycle status.
//!
//! Each enum round-trips through its snake_case string form so rows written
//! by one release are readable by the next.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical order status. Every upstream status, payment status, refund
/// flag, or chargeback flag is mapped onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Approved,
    Pending,
    Refunded,
    Rejected,
    Canceled,
    Expired,
    Chargeback,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Approved,
        OrderStatus::Pending,
        OrderStatus::Refunded,
        OrderStatus::Rejected,
        OrderStatus::Canceled,
        OrderStatus::Expired,
        OrderStatus::Chargeback,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Approved => "approved",
            OrderStatus::Pending => "pending",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Expired => "expired",
            OrderStatus::Chargeback => "chargeback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Pix,
    Boleto,
    Other,
}

impl PaymentMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Pix => "pix",
            PaymentMethod::Boleto => "boleto",
            PaymentMethod::Other => "other",
        }
    }

    /// Maps a free-form upstream payment method label onto the closed set.
    ///
    /// Matching is by substring on the lower-cased label: `"credit_card"`,
    /// `"cartao"`, and `"card"` are all credit card; `"billet"` and
    /// `"bank_slip"` are boleto.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_lowercase();
        if lower.contains("pix") {
            PaymentMethod::Pix
        } else if lower.contains("boleto") || lower.contains("billet") || lower.contains("slip")
        {
            PaymentMethod::Boleto
        } else if lower.contains("card") || lower.contains("cart") || lower.contains("credit") {
            PaymentMethod::CreditCard
        } else {
            PaymentMethod::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Inactive,
}

impl ProductStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }

    /// Maps an upstream product status label. Anything not recognisably
    /// disabled counts as active, matching how the storefront lists products.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_lowercase();
        let disabled = ["inactive", "inativo", "disabled", "draft", "archived", "deleted", "blocked"];
        if disabled.iter().any(|k| lower.contains(k)) {
            ProductStatus::Inactive
        } else {
            ProductStatus::Active
        }
    }
}

macro_rules! impl_str_conversions {
    ($ty:ty, $($variant:path),+ $(,)?) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == $variant.as_str() {
                        return Ok($variant);
                    }
                )+
                Err(format!("unknown {} value: {s}", stringify!($ty)))
            }
        }
    };
}

impl_str_conversions!(
    OrderStatus,
    OrderStatus::Approved,
    OrderStatus::Pending,
    OrderStatus::Refunded,
    OrderStatus::Rejected,
    OrderStatus::Canceled,
    OrderStatus::Expired,
    OrderStatus::Chargeback,
);
impl_str_conversions!(
    PaymentMethod,
    PaymentMethod::CreditCard,
    PaymentMethod::Pix,
    PaymentMethod::Boleto,
    PaymentMethod::Other,
);
impl_str_conversions!(ProductStatus, ProductStatus::Active, ProductStatus::Inactive);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn payment_method_from_label() {
        assert_eq!(PaymentMethod::from_label("credit_card"), PaymentMethod::CreditCard);
        assert_eq!(PaymentMethod::from_label("Cartão"), PaymentMethod::CreditCard);
        assert_eq!(PaymentMethod::from_label("PIX"), PaymentMethod::Pix);
        assert_eq!(PaymentMethod::from_label("boleto"), PaymentMethod::Boleto);
        assert_eq!(PaymentMethod::from_label("billet"), PaymentMethod::Boleto);
        assert_eq!(PaymentMethod::from_label("paypal"), PaymentMethod::Other);
    }

    #[test]
    fn product_status_from_label() {
        assert_eq!(ProductStatus::from_label("active"), ProductStatus::Active);
        assert_eq!(ProductStatus::from_label("Ativo"), ProductStatus::Active);
        assert_eq!(ProductStatus::from_label("INATIVO"), ProductStatus::Inactive);
        assert_eq!(ProductStatus::from_label("archived"), ProductStatus::Inactive);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::CreditCard).unwrap();
        assert_eq!(json, "\"credit_card\"");
        let status: OrderStatus = serde_json::from_str("\"chargeback\"").unwrap();
        assert_eq!(status, OrderStatus::Chargeback);
    }
}
