use kiwidash_core::{CanonicalCustomer, CanonicalOrder, CanonicalProduct, PaymentMethod};
use serde_json::{Map, Value};

use crate::amount::{pick_amount_cents, positive_cents};
use crate::classify::classify_payload;
use crate::date::normalize_date;
use crate::path::{pick_id, pick_object, pick_string};

use super::customer::normalize_customer;
use super::product::{normalize_product, pick_currency};

const ID_PATHS: &[&str] = &[
    "id",
    "order_id",
    "sale_id",
    "order.id",
    "data.id",
    "reference",
    "order_ref",
];
const PRODUCT_ID_PATHS: &[&str] = &[
    "product.id",
    "product_id",
    "Product.product_id",
    "Product.id",
    "order.product.id",
    "items.0.product_id",
];
const PRODUCT_OBJECT_PATHS: &[&str] = &["product", "Product", "order.product"];
const PRODUCT_NAME_PATHS: &[&str] = &["product_name", "Product.product_name", "items.0.name"];
const CUSTOMER_OBJECT_PATHS: &[&str] = &["customer", "Customer", "buyer", "order.customer"];
const FLAT_CUSTOMER_ID_PATHS: &[&str] = &["customer_id", "buyer_id"];
const FLAT_CUSTOMER_NAME_PATHS: &[&str] = &["customer_name", "buyer_name"];
const FLAT_CUSTOMER_EMAIL_PATHS: &[&str] = &["customer_email", "buyer_email"];
const FLAT_CUSTOMER_PHONE_PATHS: &[&str] = &["customer_phone", "customer_mobile"];
const PAYMENT_METHOD_PATHS: &[&str] = &[
    "payment_method",
    "payment.method",
    "Payment.method",
    "payment_type",
    "order.payment_method",
];
const GROSS_PATHS: &[&str] = &[
    "amount",
    "total_amount",
    "payment.charge_amount",
    "Commissions.charge_amount",
    "charge_amount",
    "pricing.total",
    "pricing.gross_amount",
    "gross_amount",
    "Commissions.product_base_price",
    "price",
];
const FEE_PATHS: &[&str] = &[
    "fee",
    "fee_amount",
    "kiwify_fee",
    "Commissions.kiwify_fee",
    "payment.fee",
    "pricing.fee",
];
const NET_PATHS: &[&str] = &[
    "net_amount",
    "amount_net",
    "pricing.net_amount",
    "payment.net_amount",
    "Commissions.settlement_amount",
];
const COMMISSION_PATHS: &[&str] = &[
    "commission",
    "my_commission",
    "Commissions.my_commission",
    "commission_amount",
    "pricing.commission",
];
const CURRENCY_PATHS: &[&str] = &[
    "currency",
    "Commissions.currency",
    "payment.currency",
    "pricing.currency",
];
const APPROVED_AT_PATHS: &[&str] = &["approved_date", "approved_at", "paid_at", "order.approved_date"];
const REFUNDED_AT_PATHS: &[&str] = &["refunded_at", "refund_date", "order.refunded_at"];
const CANCELED_AT_PATHS: &[&str] = &["canceled_at", "cancelled_at", "order.canceled_at"];
const CREATED_AT_PATHS: &[&str] = &["created_at", "order_date", "date", "order.created_at"];
const UPDATED_AT_PATHS: &[&str] = &["updated_at", "order.updated_at"];

/// A sale plus the product and customer records embedded in it.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSale {
    pub order: CanonicalOrder,
    pub product: Option<CanonicalProduct>,
    pub customer: CanonicalCustomer,
}

/// Why a sale payload could not be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleDropReason {
    MissingOrderId,
    MissingProductId,
    MissingCustomer,
    AmountOverflow,
}

impl SaleDropReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SaleDropReason::MissingOrderId => "missing order id",
            SaleDropReason::MissingProductId => "missing product id",
            SaleDropReason::MissingCustomer => "missing customer id and email",
            SaleDropReason::AmountOverflow => "amounts out of range",
        }
    }
}

/// Normalizes a sale, or `None` when order, product, or customer identity
/// cannot be resolved.
#[must_use]
pub fn normalize_sale(raw: &Value) -> Option<NormalizedSale> {
    try_normalize_sale(raw).ok()
}

/// # Errors
///
/// Returns the [`SaleDropReason`] naming the first identity that could not
/// be resolved.
pub fn try_normalize_sale(raw: &Value) -> Result<NormalizedSale, SaleDropReason> {
    let external_id = pick_id(raw, ID_PATHS).ok_or(SaleDropReason::MissingOrderId)?;

    let product = sale_product(raw);
    let product_external_id = pick_id(raw, PRODUCT_ID_PATHS)
        .or_else(|| product.as_ref().map(|p| p.external_id.clone()))
        .ok_or(SaleDropReason::MissingProductId)?;

    let customer = sale_customer(raw).ok_or(SaleDropReason::MissingCustomer)?;

    let amounts = SaleAmounts::from_payload(raw).ok_or(SaleDropReason::AmountOverflow)?;
    let classification = classify_payload(raw);

    let order = CanonicalOrder {
        product_external_id,
        customer_external_id: customer.external_id.clone(),
        status: classification.order_status(),
        payment_method: pick_string(raw, PAYMENT_METHOD_PATHS)
            .map_or(PaymentMethod::Other, |m| PaymentMethod::from_label(&m)),
        gross_cents: amounts.gross,
        fee_cents: amounts.fee,
        net_cents: amounts.net,
        commission_cents: amounts.commission,
        currency: pick_currency(raw, CURRENCY_PATHS),
        approved_at: normalize_date(raw, APPROVED_AT_PATHS),
        refunded_at: normalize_date(raw, REFUNDED_AT_PATHS),
        canceled_at: normalize_date(raw, CANCELED_AT_PATHS),
        source_created_at: normalize_date(raw, CREATED_AT_PATHS),
        source_updated_at: normalize_date(raw, UPDATED_AT_PATHS),
        raw: raw.clone(),
        external_id,
    };

    Ok(NormalizedSale {
        order,
        product,
        customer,
    })
}

/// Embedded product object, or a minimal one synthesized from a flat
/// `product_name`. An embedded object without its own id borrows the
/// sale's product id.
fn sale_product(raw: &Value) -> Option<CanonicalProduct> {
    let sale_product_id = pick_id(raw, PRODUCT_ID_PATHS);

    if let Some(obj) = pick_object(raw, PRODUCT_OBJECT_PATHS) {
        if let Some(product) = normalize_product(obj) {
            return Some(product);
        }
        let mut patched = obj.clone();
        if let (Some(id), Some(map)) = (sale_product_id.as_ref(), patched.as_object_mut()) {
            map.insert("id".to_string(), Value::String(id.clone()));
            return normalize_product(&patched);
        }
        return None;
    }

    let name = pick_string(raw, PRODUCT_NAME_PATHS)?;
    let id = sale_product_id?;
    let mut synth = Map::new();
    synth.insert("id".to_string(), Value::String(id));
    synth.insert("name".to_string(), Value::String(name));
    normalize_product(&Value::Object(synth))
}

/// Embedded customer object, falling back to flat `customer_*` fields.
fn sale_customer(raw: &Value) -> Option<CanonicalCustomer> {
    if let Some(customer) = pick_object(raw, CUSTOMER_OBJECT_PATHS).and_then(normalize_customer) {
        return Some(customer);
    }

    let mut synth = Map::new();
    if let Some(id) = pick_id(raw, FLAT_CUSTOMER_ID_PATHS) {
        synth.insert("id".to_string(), Value::String(id));
    }
    for (key, paths) in [
        ("name", FLAT_CUSTOMER_NAME_PATHS),
        ("email", FLAT_CUSTOMER_EMAIL_PATHS),
        ("phone", FLAT_CUSTOMER_PHONE_PATHS),
    ] {
        if let Some(v) = pick_string(raw, paths) {
            synth.insert(key.to_string(), Value::String(v));
        }
    }
    normalize_customer(&Value::Object(synth))
}

struct SaleAmounts {
    gross: i64,
    fee: i64,
    net: i64,
    commission: i64,
}

impl SaleAmounts {
    /// Missing amounts are derived from the ones present: net from
    /// gross − fee, fee from gross − net, gross from net + fee, commission
    /// from net. `None` when a derivation leaves the `i64` range.
    #[allow(clippy::cast_precision_loss)]
    fn from_payload(raw: &Value) -> Option<Self> {
        let gross = pick_amount_cents(raw, GROSS_PATHS);
        let fee = pick_amount_cents(raw, FEE_PATHS);
        let net = pick_amount_cents(raw, NET_PATHS);
        let commission = pick_amount_cents(raw, COMMISSION_PATHS);

        let fee = match (fee, gross, net) {
            (Some(f), _, _) => f,
            (None, Some(g), Some(n)) => positive_cents(g.checked_sub(n)? as f64),
            _ => 0,
        };
        let net = match (net, gross) {
            (Some(n), _) => n,
            (None, Some(g)) => positive_cents(g.checked_sub(fee)? as f64),
            (None, None) => 0,
        };
        let gross = match gross {
            Some(g) => g,
            None => net.checked_add(fee)?,
        };

        Some(Self {
            gross,
            fee,
            net,
            commission: commission.unwrap_or(net),
        })
    }
}
