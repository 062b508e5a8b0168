use kiwidash_core::{CanonicalCustomer, UNKNOWN_CUSTOMER_EMAIL, UNKNOWN_CUSTOMER_NAME};
use serde_json::Value;

use crate::date::normalize_date;
use crate::path::{pick_id, pick_string};

const ID_PATHS: &[&str] = &["id", "customer_id", "uuid", "buyer_id"];
const NAME_PATHS: &[&str] = &["full_name", "name", "fullname", "customer_name", "first_name"];
const EMAIL_PATHS: &[&str] = &["email", "Email", "customer_email"];
const PHONE_PATHS: &[&str] = &["mobile", "phone", "cellphone", "phone_number", "mobile_phone"];
const COUNTRY_PATHS: &[&str] = &["country", "country_code", "address.country", "Address.country"];
const CREATED_PATHS: &[&str] = &["created_at", "createdAt", "created"];
const UPDATED_PATHS: &[&str] = &["updated_at", "updatedAt", "updated"];

/// Normalizes a Kiwify customer payload.
///
/// The external id falls back to the real email when the payload has no id.
/// Returns `None` when neither is present: a placeholder email is never an
/// identity.
#[must_use]
pub fn normalize_customer(raw: &Value) -> Option<CanonicalCustomer> {
    let email = pick_string(raw, EMAIL_PATHS).map(|e| e.to_lowercase());
    let external_id = pick_id(raw, ID_PATHS).or_else(|| email.clone())?;

    Some(CanonicalCustomer {
        external_id,
        name: pick_string(raw, NAME_PATHS).unwrap_or_else(|| UNKNOWN_CUSTOMER_NAME.to_string()),
        email: email.unwrap_or_else(|| UNKNOWN_CUSTOMER_EMAIL.to_string()),
        phone: pick_string(raw, PHONE_PATHS),
        country: pick_string(raw, COUNTRY_PATHS),
        source_created_at: normalize_date(raw, CREATED_PATHS),
        source_updated_at: normalize_date(raw, UPDATED_PATHS),
        raw: raw.clone(),
    })
}
