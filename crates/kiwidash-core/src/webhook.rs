use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One resolved webhook delivery, ready for a single-row upsert keyed on
/// `event_id`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingWebhookEvent {
    /// Dedup key. Deliveries without one are stored but never merged.
    pub event_id: Option<String>,
    /// Classifier bucket name (e.g. `"approved"`, `"refunded"`).
    pub trigger: Option<String>,
    pub status: Option<String>,
    pub source: String,
    pub webhook_id: Option<String>,
    pub webhook_token: Option<String>,
    /// Allow-listed request headers, lower-cased names.
    pub headers: BTreeMap<String, String>,
    pub payload: serde_json::Value,
    /// When the business event happened upstream, if the payload says.
    pub occurred_at: Option<DateTime<Utc>>,
    /// When this process accepted the delivery.
    pub received_at: DateTime<Utc>,
}

impl std::fmt::Debug for IncomingWebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingWebhookEvent")
            .field("event_id", &self.event_id)
            .field("trigger", &self.trigger)
            .field("status", &self.status)
            .field("source", &self.source)
            .field("webhook_id", &self.webhook_id)
            .field(
                "webhook_token",
                &self.webhook_token.as_ref().map(|_| "[redacted]"),
            )
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("occurred_at", &self.occurred_at)
            .field("received_at", &self.received_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_token_and_header_values() {
        let mut headers = BTreeMap::new();
        headers.insert("x-kiwify-token".to_string(), "tok-secret".to_string());
        let event = IncomingWebhookEvent {
            event_id: Some("evt-1".to_string()),
            trigger: Some("approved".to_string()),
            status: Some("paid".to_string()),
            source: "kiwify".to_string(),
            webhook_id: None,
            webhook_token: Some("tok-secret".to_string()),
            headers,
            payload: serde_json::json!({}),
            occurred_at: None,
            received_at: Utc::now(),
        };
        let rendered = format!("{event:?}");
        assert!(rendered.contains("evt-1"));
        assert!(!rendered.contains("tok-secret"));
    }
}
