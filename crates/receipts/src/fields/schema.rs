//! JSON Schema the model output must satisfy.

use serde_json::{json, Map, Value};

use crate::error::FieldError;

pub const DECIMAL_PATTERN: &str = r"^-?\d+(\.\d{1,2})?$";
pub const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";
pub const LAST4_PATTERN: &str = r"^\d{4}$";

pub const MONEY_FIELDS: [&str; 6] = ["subtotal", "discount", "other_fees", "tip", "tax", "total"];
pub const REQUIRED_FIELDS: [&str; 5] =
    ["merchant_name", "tx_date", "total", "currency_code", "category"];

/// Builds the receipt schema, constraining `category` when `allowed` is non-empty.
pub fn build_schema(allowed: &[String]) -> Value {
    let mut properties = Map::new();
    properties.insert("merchant_name".into(), json!({ "type": "string" }));
    properties.insert(
        "tx_date".into(),
        json!({ "type": "string", "pattern": DATE_PATTERN }),
    );
    for field in MONEY_FIELDS {
        properties.insert(
            field.into(),
            json!({ "type": "string", "pattern": DECIMAL_PATTERN }),
        );
    }
    properties.insert(
        "currency_code".into(),
        json!({ "type": "string", "minLength": 3, "maxLength": 3 }),
    );
    let category = if allowed.is_empty() {
        json!({ "type": "string" })
    } else {
        json!({ "type": "string", "enum": allowed })
    };
    properties.insert("category".into(), category);
    properties.insert("payment_method".into(), json!({ "type": "string" }));
    properties.insert(
        "payment_last4".into(),
        json!({ "type": "string", "pattern": LAST4_PATTERN }),
    );
    properties.insert("description".into(), json!({ "type": "string" }));
    properties.insert(
        "confidence".into(),
        json!({ "type": "number", "minimum": 0.0, "maximum": 1.0 }),
    );

    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": properties,
        "required": REQUIRED_FIELDS,
    })
}

/// A compiled receipt schema.
pub struct ReceiptSchema {
    schema: Value,
    validator: jsonschema::Validator,
}

impl ReceiptSchema {
    pub fn new(allowed: &[String]) -> Result<Self, FieldError> {
        let schema = build_schema(allowed);
        let validator =
            jsonschema::validator_for(&schema).map_err(|e| FieldError::Schema(e.to_string()))?;
        Ok(Self { schema, validator })
    }

    pub fn as_value(&self) -> &Value {
        &self.schema
    }

    /// Returns every violation, joined, or `Ok` for a valid document.
    pub fn validate(&self, doc: &Value) -> Result<(), String> {
        let errors: Vec<String> = self.validator.iter_errors(doc).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

impl std::fmt::Debug for ReceiptSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptSchema").field("schema", &self.schema).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Value {
        json!({
            "merchant_name": "Costco",
            "tx_date": "2024-07-21",
            "total": "12.50",
            "currency_code": "USD",
            "category": "Meals"
        })
    }

    #[test]
    fn test_minimal_document_is_valid() {
        let schema = ReceiptSchema::new(&[]).unwrap();
        assert!(schema.validate(&minimal()).is_ok());
    }

    #[test]
    fn test_required_fields_enforced() {
        let schema = ReceiptSchema::new(&[]).unwrap();
        for field in REQUIRED_FIELDS {
            let mut doc = minimal();
            doc.as_object_mut().unwrap().remove(field);
            assert!(schema.validate(&doc).is_err(), "{} should be required", field);
        }
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let schema = ReceiptSchema::new(&[]).unwrap();
        let mut doc = minimal();
        doc["shipping_fee"] = json!("5.00");
        assert!(schema.validate(&doc).is_err());
    }

    #[test]
    fn test_money_and_date_patterns() {
        let schema = ReceiptSchema::new(&[]).unwrap();
        let mut doc = minimal();
        doc["discount"] = json!("-3.5");
        assert!(schema.validate(&doc).is_ok());

        doc["tax"] = json!(1.25);
        assert!(schema.validate(&doc).is_err());

        let mut doc = minimal();
        doc["tx_date"] = json!("07/21/2024");
        assert!(schema.validate(&doc).is_err());

        let mut doc = minimal();
        doc["total"] = json!("12.505");
        assert!(schema.validate(&doc).is_err());
    }

    #[test]
    fn test_category_enum_when_constrained() {
        let allowed = vec!["Meals".to_string(), "Other".to_string()];
        let schema = ReceiptSchema::new(&allowed).unwrap();
        assert!(schema.validate(&minimal()).is_ok());

        let mut doc = minimal();
        doc["category"] = json!("Groceries");
        assert!(schema.validate(&doc).is_err());
    }

    #[test]
    fn test_confidence_range_and_last4() {
        let schema = ReceiptSchema::new(&[]).unwrap();
        let mut doc = minimal();
        doc["confidence"] = json!(0.9);
        doc["payment_last4"] = json!("4242");
        assert!(schema.validate(&doc).is_ok());

        doc["confidence"] = json!(90);
        assert!(schema.validate(&doc).is_err());

        let mut doc = minimal();
        doc["payment_last4"] = json!("42");
        assert!(schema.validate(&doc).is_err());
    }

    #[test]
    fn test_empty_merchant_passes_schema() {
        let schema = ReceiptSchema::new(&[]).unwrap();
        let mut doc = minimal();
        doc["merchant_name"] = json!("");
        assert!(schema.validate(&doc).is_ok());
    }
}
