//! Keyword classification of Kiwify status and event strings.
//!
//! Upstream status vocabulary is large and bilingual (`"paid"`, `"aprovado"`,
//! `"waiting_payment"`, `"boleto_gerado"`, `"order_refunded"`, …). Every
//! status-bearing and event-bearing string in a payload is lower-cased,
//! underscore-normalized, and tested for substring containment against the
//! keyword tables below. Webhook trigger detection, order status mapping,
//! and the stored-sales summary all classify through this one module.

use std::collections::BTreeSet;

use kiwidash_core::OrderStatus;
use serde::Serialize;
use serde_json::Value;

use crate::path::{collect_strings, pick_bool};

const APPROVED_KEYWORDS: &[&str] = &["approved", "aprov", "paid", "pago", "completed", "succeeded"];
const PENDING_KEYWORDS: &[&str] = &[
    "pending",
    "waiting",
    "aguardando",
    "pendente",
    "processing",
    "billet_printed",
    "boleto_gerado",
    "pix_gerado",
    "pix_created",
    "billet_created",
    "unpaid",
];
const REFUNDED_KEYWORDS: &[&str] = &["refund", "reembols", "estorn"];
const REFUSED_KEYWORDS: &[&str] = &["refused", "recus", "rejected", "declin", "failed"];
const CHARGEBACK_KEYWORDS: &[&str] = &["chargeback", "charged_back"];
const ABANDONED_KEYWORDS: &[&str] = &["abandon"];
const SUBSCRIPTION_KEYWORDS: &[&str] = &["subscription", "assinatura"];
const CANCELED_KEYWORDS: &[&str] = &["cancel"];
const EXPIRED_KEYWORDS: &[&str] = &["expir"];

/// Paths that carry order, payment, refund, chargeback or subscription status.
pub const STATUS_PATHS: &[&str] = &[
    "status",
    "order_status",
    "payment_status",
    "sale_status",
    "refund_status",
    "chargeback_status",
    "subscription_status",
    "order.status",
    "order.order_status",
    "order.payment_status",
    "payment.status",
    "Payment.status",
    "data.status",
    "data.order_status",
    "refund.status",
    "subscription.status",
    "Subscription.status",
];

/// Paths that carry a webhook event type.
pub const EVENT_PATHS: &[&str] = &[
    "webhook_event_type",
    "event",
    "event_type",
    "type",
    "trigger",
    "order.webhook_event_type",
    "data.event",
    "data.type",
];

const REFUND_FLAG_PATHS: &[&str] = &["refunded", "is_refunded", "order.refunded"];
const CHARGEBACK_FLAG_PATHS: &[&str] = &["chargeback", "has_chargeback", "chargedback", "order.chargeback"];

/// Canonical classification, in descending precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Subscription,
    Abandoned,
    Chargeback,
    Refunded,
    Refused,
    Pending,
    Approved,
}

impl Bucket {
    pub const ALL: [Bucket; 7] = [
        Bucket::Subscription,
        Bucket::Abandoned,
        Bucket::Chargeback,
        Bucket::Refunded,
        Bucket::Refused,
        Bucket::Pending,
        Bucket::Approved,
    ];

    /// The canonical trigger string stored on webhook events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Subscription => "subscription",
            Bucket::Abandoned => "abandoned",
            Bucket::Chargeback => "chargeback",
            Bucket::Refunded => "refunded",
            Bucket::Refused => "refused",
            Bucket::Pending => "pending",
            Bucket::Approved => "approved",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Classification {
    pub approved: bool,
    pub pending: bool,
    pub refunded: bool,
    pub refused: bool,
    pub chargeback: bool,
    pub abandoned: bool,
    pub subscription: bool,
    pub canceled: bool,
    pub expired: bool,
    /// Every normalized status/event string that was examined.
    pub matched: BTreeSet<String>,
}

impl Classification {
    /// Highest-precedence bucket that matched:
    /// subscription > abandoned > chargeback > refunded > refused > pending > approved.
    #[must_use]
    pub fn bucket(&self) -> Option<Bucket> {
        Bucket::ALL.into_iter().find(|b| self.has(*b))
    }

    #[must_use]
    pub fn has(&self, bucket: Bucket) -> bool {
        match bucket {
            Bucket::Subscription => self.subscription,
            Bucket::Abandoned => self.abandoned,
            Bucket::Chargeback => self.chargeback,
            Bucket::Refunded => self.refunded,
            Bucket::Refused => self.refused,
            Bucket::Pending => self.pending,
            Bucket::Approved => self.approved,
        }
    }

    /// Maps onto the closed order status set. Unclassifiable orders are
    /// pending: nothing has been confirmed paid.
    #[must_use]
    pub fn order_status(&self) -> OrderStatus {
        if self.chargeback {
            OrderStatus::Chargeback
        } else if self.refunded {
            OrderStatus::Refunded
        } else if self.refused {
            OrderStatus::Rejected
        } else if self.canceled {
            OrderStatus::Canceled
        } else if self.expired {
            OrderStatus::Expired
        } else if self.pending {
            OrderStatus::Pending
        } else if self.approved {
            OrderStatus::Approved
        } else {
            OrderStatus::Pending
        }
    }

    fn absorb(&mut self, token: String) {
        let hit = |keywords: &[&str]| keywords.iter().any(|k| token.contains(k));
        self.approved |= hit(APPROVED_KEYWORDS);
        self.pending |= hit(PENDING_KEYWORDS);
        self.refunded |= hit(REFUNDED_KEYWORDS);
        self.refused |= hit(REFUSED_KEYWORDS);
        self.chargeback |= hit(CHARGEBACK_KEYWORDS);
        self.abandoned |= hit(ABANDONED_KEYWORDS);
        self.subscription |= hit(SUBSCRIPTION_KEYWORDS);
        self.canceled |= hit(CANCELED_KEYWORDS);
        self.expired |= hit(EXPIRED_KEYWORDS);
        self.matched.insert(token);
    }
}

/// Lower-cases and folds spaces, dashes and dots into underscores.
#[must_use]
pub fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '-' || c == '.' { '_' } else { c })
        .collect()
}

/// Classifies arbitrary status/event strings.
#[must_use]
pub fn classify_strings<I, S>(values: I) -> Classification
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Classification::default();
    for value in values {
        let token = normalize_token(value.as_ref());
        if !token.is_empty() {
            out.absorb(token);
        }
    }
    out
}

/// Classifies a payload from its status paths, event paths, and refund or
/// chargeback boolean flags.
#[must_use]
pub fn classify_payload(payload: &Value) -> Classification {
    classify_payload_with(payload, std::iter::empty::<&str>())
}

/// As [`classify_payload`], also folding in externally supplied event names
/// (e.g. from delivery headers).
#[must_use]
pub fn classify_payload_with<I, S>(payload: &Value, extra: I) -> Classification
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut strings: Vec<String> = extra.into_iter().map(|s| s.as_ref().to_string()).collect();
    strings.extend(collect_strings(payload, STATUS_PATHS));
    strings.extend(collect_strings(payload, EVENT_PATHS));
    if pick_bool(payload, REFUND_FLAG_PATHS) == Some(true) {
        strings.push("refunded".to_string());
    }
    if pick_bool(payload, CHARGEBACK_FLAG_PATHS) == Some(true) {
        strings.push("chargeback".to_string());
    }
    classify_strings(strings)
}
