//! Lenient repair of model output that failed schema validation.
//!
//! Only the fields in [`FIELD_RULES`] survive. Each is coerced by its typed
//! rule; optional fields that cannot be coerced are dropped, required ones
//! are left as they were so that re-validation reports them.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Number, Value};

use crate::category;

/// Synonym keys models tend to emit, applied in order without overwriting.
const RENAMES: &[(&str, &str)] = &[
    ("shipping_fee", "other_fees"),
    ("shipping_fees", "other_fees"),
    ("shipping", "other_fees"),
    ("fees", "other_fees"),
    ("merchant", "merchant_name"),
    ("date", "tx_date"),
    ("currency", "currency_code"),
    ("gratuity", "tip"),
    ("tax_amount", "tax"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Text,
    Money,
    Date,
    Currency,
    Category,
    PaymentMethod,
    Last4,
    Confidence,
}

/// `(field, rule, required)`
const FIELD_RULES: &[(&str, Rule, bool)] = &[
    ("merchant_name", Rule::Text, true),
    ("tx_date", Rule::Date, true),
    ("subtotal", Rule::Money, false),
    ("discount", Rule::Money, false),
    ("other_fees", Rule::Money, false),
    ("tip", Rule::Money, false),
    ("tax", Rule::Money, false),
    ("total", Rule::Money, true),
    ("currency_code", Rule::Currency, true),
    ("category", Rule::Category, true),
    ("payment_method", Rule::PaymentMethod, false),
    ("payment_last4", Rule::Last4, false),
    ("description", Rule::Text, false),
    ("confidence", Rule::Confidence, false),
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Repairs `doc` in place of a stricter retry. Returns the cleaned document
/// and a note per renamed, rewritten or dropped key.
pub fn sanitize(doc: Value, allowed_categories: &[String]) -> (Value, Vec<String>) {
    let mut map = match doc {
        Value::Object(map) => map,
        other => return (other, Vec::new()),
    };
    let mut notes = Vec::new();

    map.retain(|key, value| {
        let keep = !value.is_null();
        if !keep {
            notes.push(format!("{}(null)", key));
        }
        keep
    });

    for (from, to) in RENAMES {
        if let Some(value) = map.remove(*from) {
            if !map.contains_key(*to) {
                map.insert((*to).to_string(), value);
            }
            notes.push(format!("{}->{}", from, to));
        }
    }

    let mut out = Map::new();
    for (key, value) in map {
        let Some(&(_, rule, required)) = FIELD_RULES.iter().find(|(name, _, _)| *name == key) else {
            notes.push(format!("{}(unknown)", key));
            continue;
        };

        match coerce(rule, &value, allowed_categories) {
            Some(coerced) if is_empty(&coerced) && !required => {
                notes.push(format!("{}(empty)", key));
            }
            Some(coerced) => {
                if coerced != value {
                    notes.push(format!("{}(coerced)", key));
                }
                out.insert(key, coerced);
            }
            None if required => {
                out.insert(key, value);
            }
            None => notes.push(format!("{}(invalid)", key)),
        }
    }

    (Value::Object(out), notes)
}

fn coerce(rule: Rule, value: &Value, allowed_categories: &[String]) -> Option<Value> {
    match rule {
        Rule::Text => value.as_str().map(|s| Value::String(s.trim().to_string())),
        Rule::Money => money(value).map(Value::String),
        Rule::Date => value.as_str().and_then(iso_date).map(Value::String),
        Rule::Currency => value
            .as_str()
            .map(|s| Value::String(s.trim().to_uppercase())),
        Rule::Category => value
            .as_str()
            .map(|s| Value::String(category_label(s.trim(), allowed_categories))),
        Rule::PaymentMethod => value
            .as_str()
            .map(|s| Value::String(s.trim().to_uppercase().replace(' ', "_"))),
        Rule::Last4 => last4(value).map(Value::String),
        Rule::Confidence => confidence(value).and_then(Number::from_f64).map(Value::Number),
    }
}

fn is_empty(value: &Value) -> bool {
    value.as_str().is_some_and(str::is_empty)
}

/// Formats a money value as a two-decimal string.
///
/// Currency symbols and thousands separators are stripped. A single comma
/// followed by exactly two digits is read as a decimal comma.
pub fn money(value: &Value) -> Option<String> {
    let decimal = match value {
        Value::Number(n) => parse_decimal(&n.to_string())?,
        Value::String(s) => parse_decimal(&clean_amount(s)?)?,
        _ => return None,
    };
    let rounded = decimal.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Some(format!("{:.2}", rounded))
}

fn clean_amount(raw: &str) -> Option<String> {
    let kept: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let decimal_comma = !kept.contains('.')
        && kept.matches(',').count() == 1
        && kept.rsplit(',').next().is_some_and(|tail| tail.len() == 2);
    Some(if decimal_comma {
        kept.replace(',', ".")
    } else {
        kept.replace(',', "")
    })
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Re-emits a date in one of the accepted layouts as `YYYY-MM-DD`.
pub fn iso_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let candidates = [raw, raw.get(..10).unwrap_or(raw)];
    candidates.iter().find_map(|candidate| {
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
            .map(|d| d.format("%Y-%m-%d").to_string())
    })
}

fn category_label(raw: &str, allowed: &[String]) -> String {
    if let Some(exact) = allowed.iter().find(|a| a.eq_ignore_ascii_case(raw)) {
        return exact.clone();
    }
    let resolved = category::resolve(raw);
    if resolved.matched && allowed.iter().any(|a| a == resolved.category.as_str()) {
        return resolved.category.as_str().to_string();
    }
    raw.to_string()
}

fn last4(value: &Value) -> Option<String> {
    let digits: String = match value {
        Value::String(s) => s.chars().filter(char::is_ascii_digit).collect(),
        Value::Number(n) if n.is_u64() => n.to_string(),
        _ => return None,
    };
    if digits.len() < 4 {
        return None;
    }
    Some(digits[digits.len() - 4..].to_string())
}

fn confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };
    if (0.0..=1.0).contains(&raw) {
        Some(raw)
    } else if raw > 1.0 && raw <= 100.0 {
        Some(raw / 100.0)
    } else {
        None
    }
}
