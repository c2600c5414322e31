//! Decoding of `u256` values returned by read-only contract calls.
//!
//! Nodes, wallets and mocks all hand back balances in slightly different
//! shapes. Every accepted shape is a variant of [`ContractValue`]; anything
//! else is rejected with [`NormalizeError::Unrecognized`], never read as zero.

use std::fmt;

use ethers_core::types::U256;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::blockchain::models::{TokenError, U256Parts};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("unrecognized contract response shape: {0}")]
    Unrecognized(String),
    #[error("invalid numeric value {value:?}: {reason}")]
    InvalidNumber { value: String, reason: String },
    #[error("value does not fit in 256 bits")]
    Overflow,
}

impl From<NormalizeError> for TokenError {
    fn from(err: NormalizeError) -> Self {
        TokenError::UnrecognizedResponse(err.to_string())
    }
}

// 2^53; every integer up to it is exact in an f64
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Every wire format a `u256` read is known to arrive in, in match order.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractValue {
    /// Plain JSON number. Floats are accepted only when integral and no
    /// larger than 2^53; beyond that the JSON value has already lost
    /// precision, so such balances must arrive as strings.
    Number(u64),
    /// Decimal or `0x`-prefixed hex string
    NumericString(String),
    /// `{ "low": .., "high": .. }`
    LowHigh { low: Box<ContractValue>, high: Box<ContractValue> },
    /// `[low, high]`
    Pair(Box<ContractValue>, Box<ContractValue>),
    /// `[value]`; the high half defaults to zero
    Single(Box<ContractValue>),
    /// `{ "value": .. }` wrapping a number, string or low/high object
    Nested(Box<ContractValue>),
    /// Output of a `Display` implementation (the `toString()` case)
    Displayed(String),
    /// Native big integer
    BigInt(U256),
}

impl ContractValue {
    /// Classifies a JSON value. Shapes are tried in order and the first match
    /// wins; the scalar halves of composite shapes must themselves be
    /// numbers or numeric strings.
    pub fn decode(value: &Value) -> Result<Self, NormalizeError> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && (0.0..=MAX_EXACT_FLOAT).contains(f))
                        .map(|f| f as u64)
                })
                .map(ContractValue::Number)
                .ok_or_else(|| NormalizeError::InvalidNumber {
                    value: n.to_string(),
                    reason: "not a non-negative integer up to 2^53".to_string(),
                }),
            Value::String(s) => {
                if is_numeric_str(s) {
                    Ok(ContractValue::NumericString(s.trim().to_string()))
                } else {
                    Err(NormalizeError::Unrecognized(format!("non-numeric string {:?}", s)))
                }
            }
            Value::Object(map) if map.contains_key("low") && map.contains_key("high") => Ok(ContractValue::LowHigh {
                low: Box::new(Self::decode_scalar(&map["low"])?),
                high: Box::new(Self::decode_scalar(&map["high"])?),
            }),
            Value::Array(items) if items.len() == 2 => Ok(ContractValue::Pair(
                Box::new(Self::decode_scalar(&items[0])?),
                Box::new(Self::decode_scalar(&items[1])?),
            )),
            Value::Array(items) if items.len() == 1 => {
                Ok(ContractValue::Single(Box::new(Self::decode_scalar(&items[0])?)))
            }
            Value::Object(map) if map.contains_key("value") => {
                let inner = &map["value"];
                let decoded = match inner {
                    Value::Object(_) => Self::decode(inner)?,
                    _ => Self::decode_scalar(inner)?,
                };
                match decoded {
                    ContractValue::Number(_) | ContractValue::NumericString(_) | ContractValue::LowHigh { .. } => {
                        Ok(ContractValue::Nested(Box::new(decoded)))
                    }
                    other => Err(NormalizeError::Unrecognized(format!("unsupported nested value {:?}", other))),
                }
            }
            other => Err(NormalizeError::Unrecognized(describe(other))),
        }
    }

    /// Accepts anything printable whose text is a number.
    pub fn from_display<T: fmt::Display + ?Sized>(value: &T) -> Result<Self, NormalizeError> {
        let text = value.to_string();
        if is_numeric_str(&text) {
            Ok(ContractValue::Displayed(text.trim().to_string()))
        } else {
            Err(NormalizeError::Unrecognized(format!("display output {:?} is not numeric", text)))
        }
    }

    fn decode_scalar(value: &Value) -> Result<Self, NormalizeError> {
        match value {
            Value::Number(_) | Value::String(_) => Self::decode(value),
            other => Err(NormalizeError::Unrecognized(format!("expected scalar half, got {}", describe(other)))),
        }
    }

    /// Collapses the value into a single 256-bit integer.
    pub fn to_u256(&self) -> Result<U256, NormalizeError> {
        match self {
            ContractValue::Number(n) => Ok(U256::from(*n)),
            ContractValue::NumericString(s) | ContractValue::Displayed(s) => parse_numeric(s),
            ContractValue::LowHigh { low, high } | ContractValue::Pair(low, high) => {
                combine(low.to_u256()?, high.to_u256()?)
            }
            ContractValue::Single(inner) | ContractValue::Nested(inner) => inner.to_u256(),
            ContractValue::BigInt(v) => Ok(*v),
        }
    }

    /// Canonical `{low, high}` pair; equal magnitudes give equal pairs.
    pub fn to_parts(&self) -> Result<U256Parts, NormalizeError> {
        self.to_u256().map(U256Parts::from_u256)
    }
}

impl From<U256> for ContractValue {
    fn from(value: U256) -> Self {
        ContractValue::BigInt(value)
    }
}

/// Decodes a raw contract response into a canonical pair, logging the
/// offending payload when it cannot be interpreted.
pub fn normalize_u256(value: &Value) -> Result<U256Parts, NormalizeError> {
    let result = ContractValue::decode(value).and_then(|decoded| decoded.to_parts());
    if let Err(e) = &result {
        error!("Failed to normalize contract response {}: {}", value, e);
    }
    result
}

/// Decodes a boolean contract response (`0x0`/`0x1` felts or JSON bools).
pub fn normalize_bool(value: &Value) -> Result<bool, NormalizeError> {
    if let Value::Bool(b) = value {
        return Ok(*b);
    }
    let first = match value {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    };
    let decoded = ContractValue::decode(first)?.to_u256()?;
    if decoded.is_zero() {
        Ok(false)
    } else if decoded == U256::one() {
        Ok(true)
    } else {
        Err(NormalizeError::Unrecognized(format!("expected boolean felt, got {}", decoded)))
    }
}

fn combine(low: U256, high: U256) -> Result<U256, NormalizeError> {
    if high > U256::from(u128::MAX) {
        return Err(NormalizeError::Overflow);
    }
    (high << 128).checked_add(low).ok_or(NormalizeError::Overflow)
}

fn is_numeric_str(s: &str) -> bool {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())
    } else {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
    }
}

fn parse_numeric(s: &str) -> Result<U256, NormalizeError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => {
            let hex = hex.trim_start_matches('0');
            if hex.len() > 64 {
                return Err(NormalizeError::Overflow);
            }
            if hex.is_empty() {
                return Ok(U256::zero());
            }
            U256::from_str_radix(hex, 16).map_err(|e| e.to_string())
        }
        None => U256::from_dec_str(s).map_err(|e| format!("{:?}", e)),
    };
    parsed.map_err(|reason| NormalizeError::InvalidNumber {
        value: s.to_string(),
        reason,
    })
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Object(map) if map.is_empty() => "empty object".to_string(),
        Value::Object(map) => format!("object with keys {:?}", map.keys().collect::<Vec<_>>()),
        Value::Array(items) => format!("array of length {}", items.len()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn magnitude() -> U256 {
        U256::from_dec_str("1250500000000000000000").unwrap()
    }

    #[test]
    fn all_shapes_agree_on_canonical_pair() {
        let expected = U256Parts::from_u256(magnitude());
        let shapes = vec![
            json!("1250500000000000000000"),
            json!("0x43ca2c749129fa0000"),
            json!({"low": "1250500000000000000000", "high": "0"}),
            json!(["1250500000000000000000", "0"]),
            json!(["1250500000000000000000"]),
            json!({"value": "1250500000000000000000"}),
            json!({"value": {"low": "1250500000000000000000", "high": 0}}),
        ];
        for shape in shapes {
            assert_eq!(normalize_u256(&shape).unwrap(), expected, "shape {}", shape);
        }
        assert_eq!(ContractValue::from(magnitude()).to_parts().unwrap(), expected);
        assert_eq!(
            ContractValue::from_display(&magnitude()).unwrap().to_parts().unwrap(),
            expected
        );
    }

    #[test]
    fn plain_number_is_low_half() {
        assert_eq!(
            normalize_u256(&json!(500)).unwrap(),
            U256Parts {
                low: "500".to_string(),
                high: "0".to_string()
            }
        );
    }

    #[test]
    fn integral_floats_are_plain_numbers() {
        assert_eq!(normalize_u256(&json!(1e15)).unwrap().low, "1000000000000000");
        assert_eq!(normalize_u256(&json!([2.0e3, 0])).unwrap().low, "2000");
        assert!(matches!(
            normalize_u256(&json!(1e21)),
            Err(NormalizeError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn oversized_low_is_recanonicalized() {
        let two_pow_128 = U256::one() << 128;
        let parts = normalize_u256(&json!([two_pow_128.to_string()])).unwrap();
        assert_eq!(parts.low, "0");
        assert_eq!(parts.high, "1");

        let same = normalize_u256(&json!({"low": "0", "high": "1"})).unwrap();
        assert_eq!(parts, same);
    }

    #[test]
    fn first_matching_shape_wins() {
        // low/high takes precedence over a sibling value field
        let v = json!({"low": "1", "high": "0", "value": "999"});
        assert_eq!(normalize_u256(&v).unwrap().low, "1");
    }

    #[test]
    fn rejects_unrecognized_shapes() {
        for bad in [
            json!({}),
            json!(null),
            json!("abc"),
            json!(""),
            json!(true),
            json!([]),
            json!(["1", "2", "3"]),
            json!(-5),
            json!(1.5),
            json!({"low": "1"}),
            json!({"value": ["1"]}),
            json!([{"low": "1", "high": "0"}]),
        ] {
            assert!(normalize_u256(&bad).is_err(), "accepted {}", bad);
        }
        assert!(ContractValue::from_display("twelve").is_err());
    }

    #[test]
    fn rejects_values_beyond_256_bits() {
        let too_big = format!("0x1{}", "0".repeat(64));
        assert_eq!(normalize_u256(&json!(too_big)), Err(NormalizeError::Overflow));
        let high_overflow = json!({"low": "0", "high": (U256::one() << 128).to_string()});
        assert_eq!(normalize_u256(&high_overflow), Err(NormalizeError::Overflow));
    }

    #[test]
    fn decodes_boolean_felts() {
        assert!(normalize_bool(&json!(["0x1"])).unwrap());
        assert!(!normalize_bool(&json!(["0x0"])).unwrap());
        assert!(normalize_bool(&json!(true)).unwrap());
        assert!(normalize_bool(&json!(["0x2"])).is_err());
    }
}
