//! Resolution of a single Kiwify webhook delivery into an
//! [`IncomingWebhookEvent`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kiwidash_core::IncomingWebhookEvent;
use serde_json::Value;

use crate::classify::classify_payload_with;
use crate::date::normalize_date;
use crate::path::{pick_id, pick_string};

/// Default `source` when neither headers nor payload name one.
pub const DEFAULT_SOURCE: &str = "kiwify";

/// Transport headers worth keeping besides the `x-kiwify-*`/`x-webhook-*`
/// families.
const HEADER_ALLOW_LIST: &[&str] = &[
    "content-type",
    "user-agent",
    "x-request-id",
    "x-event-id",
    "x-delivery-id",
    "x-signature",
    "x-forwarded-for",
];
const HEADER_PREFIXES: &[&str] = &["x-kiwify-", "x-webhook-"];

const EVENT_ID_HEADERS: &[&str] = &[
    "x-kiwify-event-id",
    "x-kiwify-delivery-id",
    "x-webhook-event-id",
    "x-webhook-delivery-id",
    "x-event-id",
    "x-delivery-id",
];
const EVENT_ID_PATHS: &[&str] = &[
    "event_id",
    "eventId",
    "webhook_event_id",
    "delivery_id",
    "data.event_id",
    "order.event_id",
];
const EVENT_NAME_HEADERS: &[&str] = &["x-kiwify-event", "x-kiwify-trigger", "x-webhook-event"];
const ORDER_ID_PATHS: &[&str] = &["order_id", "order.order_id", "order.id", "data.order_id", "data.id"];
const EVENT_TYPE_PATHS: &[&str] = &["webhook_event_type", "event", "event_type", "trigger", "type"];
const STATUS_PATHS: &[&str] = &[
    "order_status",
    "status",
    "payment_status",
    "order.order_status",
    "order.status",
    "data.status",
];
const SOURCE_HEADERS: &[&str] = &["x-kiwify-source", "x-webhook-source"];
const SOURCE_PATHS: &[&str] = &["source", "origin"];
const WEBHOOK_ID_HEADERS: &[&str] = &["x-kiwify-webhook-id", "x-webhook-id"];
const WEBHOOK_ID_PATHS: &[&str] = &["webhook_id", "webhookId", "hook_id"];
const TOKEN_HEADERS: &[&str] = &[
    "x-kiwify-token",
    "x-kiwify-webhook-token",
    "x-webhook-token",
    "x-kiwify-secret",
    "x-webhook-secret",
];
const TOKEN_PATHS: &[&str] = &["webhook_token", "token", "secret"];
const OCCURRED_AT_PATHS: &[&str] = &[
    "occurred_at",
    "event_date",
    "approved_date",
    "updated_at",
    "created_at",
    "order.approved_date",
    "order.updated_at",
    "order.created_at",
    "data.created_at",
];

/// Resolves one delivery. Header values win over payload fields for every
/// identifying attribute. `received_at` is the ingestion instant and is
/// stored unchanged.
///
/// When no explicit event id is present, one is composed from the order id
/// and event type (`"{order_id}:{event_type}"`) so a redelivered order event
/// still deduplicates.
pub fn resolve_webhook<'a, I>(
    payload: Value,
    headers: I,
    received_at: DateTime<Utc>,
) -> IncomingWebhookEvent
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let headers = filter_headers(headers);
    let from_headers = |names: &[&str]| -> Option<String> {
        names
            .iter()
            .filter_map(|n| headers.get(*n))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(str::to_string)
    };

    let event_names: Vec<String> = EVENT_NAME_HEADERS
        .iter()
        .filter_map(|n| headers.get(*n).cloned())
        .collect();
    let classification = classify_payload_with(&payload, &event_names);

    let event_id = from_headers(EVENT_ID_HEADERS)
        .or_else(|| pick_id(&payload, EVENT_ID_PATHS))
        .or_else(|| {
            let order_id = pick_id(&payload, ORDER_ID_PATHS)?;
            let event_type = event_names
                .first()
                .cloned()
                .or_else(|| pick_string(&payload, EVENT_TYPE_PATHS))
                .or_else(|| pick_string(&payload, STATUS_PATHS))?;
            Some(format!("{order_id}:{event_type}"))
        });

    IncomingWebhookEvent {
        event_id,
        trigger: classification.bucket().map(|b| b.as_str().to_string()),
        status: pick_string(&payload, STATUS_PATHS),
        source: from_headers(SOURCE_HEADERS)
            .or_else(|| pick_string(&payload, SOURCE_PATHS))
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        webhook_id: from_headers(WEBHOOK_ID_HEADERS)
            .or_else(|| pick_id(&payload, WEBHOOK_ID_PATHS)),
        webhook_token: from_headers(TOKEN_HEADERS).or_else(|| pick_string(&payload, TOKEN_PATHS)),
        occurred_at: normalize_date(&payload, OCCURRED_AT_PATHS),
        received_at,
        headers,
        payload,
    }
}

/// Keeps allow-listed headers and the Kiwify/webhook families, lower-casing
/// names. Repeated headers keep the first value.
#[must_use]
pub fn filter_headers<'a, I>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = BTreeMap::new();
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        let keep = HEADER_ALLOW_LIST.contains(&name.as_str())
            || HEADER_PREFIXES.iter().any(|p| name.starts_with(p));
        if keep {
            out.entry(name).or_insert_with(|| value.to_string());
        }
    }
    out
}

/// The sale object inside a delivery: `order` or `data` when either is an
/// object carrying an id, otherwise the payload root.
#[must_use]
pub fn sale_payload(payload: &Value) -> &Value {
    ["order", "data"]
        .iter()
        .filter_map(|k| payload.get(*k))
        .find(|v| {
            v.is_object()
                && pick_id(v, &["id", "order_id", "sale_id"]).is_some()
        })
        .unwrap_or(payload)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 18, 21, 0, 0).unwrap()
    }

    #[test]
    fn headers_win_over_payload() {
        let payload = json!({
            "event_id": "payload-evt",
            "webhook_event_type": "order_approved",
            "order_status": "paid",
            "webhook_token": "payload-token"
        });
        let event = resolve_webhook(
            payload,
            [
                ("X-Kiwify-Event-Id", "header-evt"),
                ("x-kiwify-token", "header-token"),
                ("Authorization", "Bearer nope"),
                ("Cookie", "a=b"),
            ],
            received(),
        );
        assert_eq!(event.event_id.as_deref(), Some("header-evt"));
        assert_eq!(event.webhook_token.as_deref(), Some("header-token"));
        assert_eq!(event.trigger.as_deref(), Some("approved"));
        assert_eq!(event.status.as_deref(), Some("paid"));
        assert_eq!(event.source, DEFAULT_SOURCE);
        assert!(event.headers.contains_key("x-kiwify-event-id"));
        assert!(!event.headers.contains_key("authorization"));
        assert!(!event.headers.contains_key("cookie"));
    }

    #[test]
    fn occurred_at_is_independent_of_received_at() {
        let payload = json!({
            "order_id": "o-1",
            "webhook_event_type": "order_refunded",
            "updated_at": "2024-10-18 17:40:00"
        });
        let event = resolve_webhook(payload, std::iter::empty(), received());
        assert_eq!(event.received_at, received());
        assert_eq!(
            event.occurred_at.map(|d| d.to_rfc3339()),
            Some("2024-10-18T20:40:00+00:00".to_string())
        );
        assert_eq!(event.trigger.as_deref(), Some("refunded"));
    }

    #[test]
    fn event_id_is_composed_from_order_and_event_type() {
        let payload = json!({"order_id": "o-7", "webhook_event_type": "order_approved"});
        let event = resolve_webhook(payload, std::iter::empty(), received());
        assert_eq!(event.event_id.as_deref(), Some("o-7:order_approved"));
    }

    #[test]
    fn no_identity_leaves_event_id_empty() {
        let event = resolve_webhook(json!({"hello": "world"}), std::iter::empty(), received());
        assert!(event.event_id.is_none());
        assert!(event.trigger.is_none());
        assert!(event.occurred_at.is_none());
    }

    #[test]
    fn header_event_name_feeds_trigger() {
        let event = resolve_webhook(
            json!({}),
            [("x-kiwify-event", "chargeback")],
            received(),
        );
        assert_eq!(event.trigger.as_deref(), Some("chargeback"));
    }

    #[test]
    fn sale_payload_prefers_nested_order() {
        let root = json!({"order": {"order_id": "o-1"}, "webhook_event_type": "x"});
        assert_eq!(sale_payload(&root), &json!({"order_id": "o-1"}));
        let flat = json!({"order_id": "o-2"});
        assert_eq!(sale_payload(&flat), &flat);
    }
}
