//! Dotted-path reads over loosely typed JSON payloads.
//!
//! Kiwify has renamed and re-nested fields across API versions and webhook
//! formats, so every normalizer keeps an ordered alias table per logical
//! field and asks this module for the first usable hit.

use serde_json::Value;

/// Returns the value at `path` (segments separated by `.`, numeric segments
/// index into arrays), or `None` when any segment is missing.
#[must_use]
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Returns the first path whose value is present and not JSON `null`.
#[must_use]
pub fn pick_value<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|p| get_path(value, p))
        .find(|v| !v.is_null())
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Returns the first path whose value is a non-blank string, trimmed.
#[must_use]
pub fn pick_string(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| match get_path(value, p)? {
        Value::String(s) => non_blank(s),
        _ => None,
    })
}

/// Like [`pick_string`], but integers also count and are rendered in
/// decimal. Older Kiwify endpoints send identifiers as numbers.
#[must_use]
pub fn pick_id(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| match get_path(value, p)? {
        Value::String(s) => non_blank(s),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    })
}

/// Returns the first path whose value is a finite number, or a string that
/// parses as one once everything but digits, `,`, `.` and a leading `-` is
/// stripped and `,` is read as the decimal point.
#[must_use]
pub fn pick_number(value: &Value, paths: &[&str]) -> Option<f64> {
    paths.iter().find_map(|p| match get_path(value, p)? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_loose_number(s),
        _ => None,
    })
}

/// Returns the first path holding a JSON object.
#[must_use]
pub fn pick_object<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|p| get_path(value, p))
        .find(|v| v.is_object())
}

/// Returns the first path holding a boolean, also accepting `"true"`/`"false"`
/// strings and `0`/`1` numbers.
#[must_use]
pub fn pick_bool(value: &Value, paths: &[&str]) -> Option<bool> {
    paths.iter().find_map(|p| match get_path(value, p)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    })
}

/// Collects every non-blank string found at any of `paths`, in order.
#[must_use]
pub fn collect_strings(value: &Value, paths: &[&str]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| match get_path(value, p)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect()
}

pub(crate) fn parse_loose_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let mut cleaned = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' | '.' => cleaned.push(c),
            ',' => cleaned.push('.'),
            '-' if i == 0 => cleaned.push(c),
            _ => {}
        }
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn get_path_walks_objects_and_arrays() {
        let v = json!({"order": {"items": [{"sku": "A"}, {"sku": "B"}]}});
        assert_eq!(get_path(&v, "order.items.1.sku"), Some(&json!("B")));
        assert_eq!(get_path(&v, "order.items.2.sku"), None);
        assert_eq!(get_path(&v, "order.items.x"), None);
        assert_eq!(get_path(&v, "order.missing.deep"), None);
    }

    #[test]
    fn get_path_stops_at_scalars() {
        let v = json!({"a": "text"});
        assert_eq!(get_path(&v, "a.b"), None);
    }

    #[test]
    fn pick_string_skips_blank_and_respects_order() {
        let v = json!({"id": "  ", "order_id": " ord-9 ", "sale_id": "ignored"});
        assert_eq!(
            pick_string(&v, &["id", "order_id", "sale_id"]),
            Some("ord-9".to_string())
        );
    }

    #[test]
    fn pick_string_ignores_numbers() {
        let v = json!({"name": 12345, "title": "Curso"});
        assert_eq!(pick_string(&v, &["name", "title"]), Some("Curso".to_string()));
        assert_eq!(pick_string(&v, &["name"]), None);
    }

    #[test]
    fn pick_id_renders_integer_ids_in_order() {
        let v = json!({"id": 12345, "order_id": "ord-1", "ratio": 1.5});
        assert_eq!(pick_id(&v, &["id", "order_id"]), Some("12345".to_string()));
        assert_eq!(pick_id(&v, &["missing", "order_id"]), Some("ord-1".to_string()));
        assert_eq!(pick_id(&v, &["ratio"]), None);
    }

    #[test]
    fn pick_number_parses_localized_strings() {
        let v = json!({"a": "R$ 197,90", "b": 10});
        assert_eq!(pick_number(&v, &["a"]), Some(197.9));
        assert_eq!(pick_number(&v, &["missing", "b"]), Some(10.0));
        assert_eq!(pick_number(&json!({"a": "n/a"}), &["a"]), None);
    }

    #[test]
    fn pick_number_keeps_leading_minus_only() {
        assert_eq!(pick_number(&json!({"a": "-12.5"}), &["a"]), Some(-12.5));
        assert_eq!(pick_number(&json!({"a": "12-5"}), &["a"]), Some(125.0));
    }

    #[test]
    fn pick_bool_accepts_string_forms() {
        let v = json!({"a": "TRUE", "b": 0});
        assert_eq!(pick_bool(&v, &["a"]), Some(true));
        assert_eq!(pick_bool(&v, &["b"]), Some(false));
    }
}
