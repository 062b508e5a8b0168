//! Monetary amount normalization to integer minor units.
//!
//! Kiwify sends amounts both as integer cents (`19790`) and as decimal reais
//! (`197.9`, `"197,90"`), depending on endpoint and API vintage. A whole number
//! is taken as already being cents; a number with a fractional part is taken
//! as major units and multiplied by 100. A value like `100` is therefore one
//! real, never a hundred.

use serde_json::Value;

use crate::path::{get_path, parse_loose_number};

/// Converts a JSON amount candidate into cents. Strings are read with `,` as
/// the decimal point; anything unparseable yields `None`.
#[must_use]
pub fn to_amount_cents(candidate: &Value) -> Option<i64> {
    match candidate {
        Value::Number(n) => n.as_f64().and_then(float_to_cents),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok().and_then(float_to_cents),
        _ => None,
    }
}

/// Like [`to_amount_cents`] but strips currency symbols and other noise from
/// strings first (`"R$ 1.234"` style values in webhook payloads).
#[must_use]
pub fn to_amount_cents_lenient(candidate: &Value) -> Option<i64> {
    match candidate {
        Value::String(s) => parse_loose_number(s).and_then(float_to_cents),
        other => to_amount_cents(other),
    }
}

/// Returns the first path that normalizes to an amount.
#[must_use]
pub fn pick_amount_cents(payload: &Value, paths: &[&str]) -> Option<i64> {
    paths
        .iter()
        .filter_map(|p| get_path(payload, p))
        .find_map(to_amount_cents_lenient)
}

/// Rounds to whole cents and clamps at zero, for derived amounts such as a
/// fee computed as `gross - net`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn positive_cents(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    value.round().max(0.0) as i64
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_cents(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 {
        Some(value as i64)
    } else {
        Some((value * 100.0).round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn whole_numbers_are_already_cents() {
        for n in [0_i64, 1, 100, 19_790, 1_000_000] {
            assert_eq!(to_amount_cents(&json!(n)), Some(n), "integer {n}");
        }
        assert_eq!(to_amount_cents(&json!(100.0)), Some(100));
    }

    #[test]
    fn fractional_numbers_are_major_units() {
        assert_eq!(to_amount_cents(&json!(197.9)), Some(19_790));
        assert_eq!(to_amount_cents(&json!(0.1)), Some(10));
        assert_eq!(to_amount_cents(&json!(19.99)), Some(1_999));
        assert_eq!(to_amount_cents(&json!(1.005)), Some(100));
    }

    #[test]
    fn strings_accept_comma_decimal_separator() {
        assert_eq!(to_amount_cents(&json!("197,90")), Some(19_790));
        assert_eq!(to_amount_cents(&json!("19790")), Some(19_790));
        assert_eq!(to_amount_cents(&json!(" 12.5 ")), Some(1_250));
    }

    #[test]
    fn unparseable_and_null_yield_none() {
        assert_eq!(to_amount_cents(&Value::Null), None);
        assert_eq!(to_amount_cents(&json!("abc")), None);
        assert_eq!(to_amount_cents(&json!("R$ 10,50")), None);
        assert_eq!(to_amount_cents(&json!({"value": 1})), None);
    }

    #[test]
    fn lenient_variant_strips_currency_noise() {
        assert_eq!(to_amount_cents_lenient(&json!("R$ 10,50")), Some(1_050));
        assert_eq!(to_amount_cents_lenient(&json!(42)), Some(42));
    }

    #[test]
    fn pick_amount_uses_first_parseable_path() {
        let v = json!({"amount": null, "pricing": {"total": "abc", "gross_amount": 99.9}});
        assert_eq!(
            pick_amount_cents(&v, &["amount", "pricing.total", "pricing.gross_amount"]),
            Some(9_990)
        );
    }

    #[test]
    fn positive_cents_clamps_and_rounds() {
        assert_eq!(positive_cents(-15.0), 0);
        assert_eq!(positive_cents(12.6), 13);
        assert_eq!(positive_cents(f64::NAN), 0);
    }
}
