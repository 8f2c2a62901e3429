//! Capability value normalization.
//!
//! Devices report heterogeneous capability payloads (booleans, numbers,
//! strings, enums, ...). Only numeric observations are stored: booleans map
//! to 1/0, numbers pass through, everything else is not storable.

use bigdecimal::BigDecimal;
use serde_json::Value;
use std::str::FromStr;

/// Map a raw capability value to a storable numeric value.
///
/// Numbers are converted through their decimal string form, so a JSON `21.5`
/// is stored as exactly `21.5` rather than a binary-fraction expansion.
/// Returns `None` for anything that is not a boolean or a number.
pub fn normalize(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Bool(true) => Some(BigDecimal::from(1)),
        Value::Bool(false) => Some(BigDecimal::from(0)),
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn booleans_map_to_one_and_zero() {
        assert_eq!(normalize(&json!(true)), Some(BigDecimal::from(1)));
        assert_eq!(normalize(&json!(false)), Some(BigDecimal::from(0)));
    }

    #[test]
    fn integers_pass_through() {
        assert_eq!(normalize(&json!(0)), Some(BigDecimal::from(0)));
        assert_eq!(normalize(&json!(42)), Some(BigDecimal::from(42)));
        assert_eq!(normalize(&json!(-7)), Some(BigDecimal::from(-7)));
    }

    #[test]
    fn fractions_keep_their_decimal_form() {
        assert_eq!(
            normalize(&json!(21.5)),
            Some(BigDecimal::from_str("21.5").unwrap())
        );
        assert_eq!(
            normalize(&json!(-0.25)),
            Some(BigDecimal::from_str("-0.25").unwrap())
        );
    }

    #[test]
    fn non_numeric_values_are_not_storable() {
        assert_eq!(normalize(&json!("on")), None);
        assert_eq!(normalize(&json!("21.5")), None);
        assert_eq!(normalize(&Value::Null), None);
        assert_eq!(normalize(&json!([1, 2])), None);
        assert_eq!(normalize(&json!({ "celsius": 21.5 })), None);
    }
}
