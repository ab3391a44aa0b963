// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Conversion between wire variants and typed command values.
//!
//! ```text
//!   OpcUaValue ──decode(ValueType)──▶ CommandValue   (reads, notifications)
//!   CommandValue ──encode(ValueType)──▶ OpcUaValue   (writes)
//! ```
//!
//! Decoding is lenient about the wire shape and strict about the range:
//! any numeric variant, a boolean or a numeric string is accepted for a
//! numeric type, but the value must fit the declared type.
//!
//! | Type | Accepted range |
//! | --- | --- |
//! | `Int8` / `Int16` / `Int32` / `Int64` | the type's signed bounds |
//! | `Uint8` / `Uint16` / `Uint32` / `Uint64` | `0` up to the type's maximum |
//! | `Float32` | not NaN, magnitude at most `f32::MAX` |
//! | `Float64` | finite |
//! | `Bool` / `String` | anything convertible |
//!
//! Fractional values decoded as integers are truncated toward zero before
//! the range check.

use crate::client::OpcUaValue;
use crate::command::CommandValue;
use crate::error::{ConversionError, OpcUaError, OpcUaResult};
use crate::types::ValueType;

// =============================================================================
// Decode
// =============================================================================

/// Decodes a wire value into the declared type.
pub fn decode(value_type: ValueType, raw: &OpcUaValue) -> Result<CommandValue, ConversionError> {
    Ok(match value_type {
        ValueType::Bool => CommandValue::Bool(to_bool(raw)?),
        ValueType::String => CommandValue::String(to_text(raw)?),
        ValueType::Uint8 => CommandValue::Uint8(integer(raw, value_type, 0, u8::MAX.into())? as u8),
        ValueType::Uint16 => {
            CommandValue::Uint16(integer(raw, value_type, 0, u16::MAX.into())? as u16)
        }
        ValueType::Uint32 => {
            CommandValue::Uint32(integer(raw, value_type, 0, u32::MAX.into())? as u32)
        }
        ValueType::Uint64 => {
            CommandValue::Uint64(integer(raw, value_type, 0, u64::MAX.into())? as u64)
        }
        ValueType::Int8 => {
            CommandValue::Int8(integer(raw, value_type, i8::MIN.into(), i8::MAX.into())? as i8)
        }
        ValueType::Int16 => {
            CommandValue::Int16(integer(raw, value_type, i16::MIN.into(), i16::MAX.into())? as i16)
        }
        ValueType::Int32 => {
            CommandValue::Int32(integer(raw, value_type, i32::MIN.into(), i32::MAX.into())? as i32)
        }
        ValueType::Int64 => {
            CommandValue::Int64(integer(raw, value_type, i64::MIN.into(), i64::MAX.into())? as i64)
        }
        ValueType::Float32 => {
            let v = float(raw, value_type)?;
            if v.is_nan() {
                return Err(ConversionError::not_finite(v, value_type.name()));
            }
            if v.abs() > f32::MAX as f64 {
                return Err(ConversionError::value_out_of_range(v, -(f32::MAX as f64), f32::MAX as f64));
            }
            CommandValue::Float32(v as f32)
        }
        ValueType::Float64 => {
            let v = float(raw, value_type)?;
            if !v.is_finite() {
                return Err(ConversionError::not_finite(v, value_type.name()));
            }
            CommandValue::Float64(v)
        }
    })
}

/// Decodes a reading of a resource, attaching the resource to any failure.
pub fn decode_reading(
    resource: &str,
    value_type: ValueType,
    raw: &OpcUaValue,
) -> OpcUaResult<CommandValue> {
    decode(value_type, raw)
        .map_err(|e| OpcUaError::conversion(e.for_resource(resource, value_type)))
}

enum Number {
    Int(i128),
    Float(f64),
}

fn number(raw: &OpcUaValue, target: ValueType) -> Result<Number, ConversionError> {
    Ok(match raw {
        OpcUaValue::Boolean(v) => Number::Int(i128::from(*v)),
        OpcUaValue::SByte(v) => Number::Int((*v).into()),
        OpcUaValue::Byte(v) => Number::Int((*v).into()),
        OpcUaValue::Int16(v) => Number::Int((*v).into()),
        OpcUaValue::UInt16(v) => Number::Int((*v).into()),
        OpcUaValue::Int32(v) => Number::Int((*v).into()),
        OpcUaValue::UInt32(v) => Number::Int((*v).into()),
        OpcUaValue::Int64(v) => Number::Int((*v).into()),
        OpcUaValue::UInt64(v) => Number::Int((*v).into()),
        OpcUaValue::Float(v) => Number::Float((*v).into()),
        OpcUaValue::Double(v) => Number::Float(*v),
        OpcUaValue::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i128>() {
                Number::Int(i)
            } else if let Ok(f) = s.parse::<f64>() {
                Number::Float(f)
            } else {
                return Err(ConversionError::invalid_value(
                    target.name(),
                    format!("'{}' is not a number", s),
                ));
            }
        }
        other => {
            return Err(ConversionError::type_mismatch(target.name(), other.type_name()));
        }
    })
}

fn integer(raw: &OpcUaValue, target: ValueType, min: i128, max: i128) -> Result<i128, ConversionError> {
    let value = match number(raw, target)? {
        Number::Int(i) => i,
        Number::Float(f) => {
            if !f.is_finite() {
                return Err(ConversionError::not_finite(f, target.name()));
            }
            let truncated = f.trunc();
            if truncated < min as f64 || truncated > max as f64 {
                return Err(ConversionError::value_out_of_range(
                    f.to_string(),
                    min.to_string(),
                    max.to_string(),
                ));
            }
            truncated as i128
        }
    };

    if value < min || value > max {
        return Err(ConversionError::value_out_of_range(value, min, max));
    }
    Ok(value)
}

fn float(raw: &OpcUaValue, target: ValueType) -> Result<f64, ConversionError> {
    Ok(match number(raw, target)? {
        Number::Int(i) => i as f64,
        Number::Float(f) => f,
    })
}

fn to_bool(raw: &OpcUaValue) -> Result<bool, ConversionError> {
    if let OpcUaValue::String(s) = raw {
        return match s.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            other => Err(ConversionError::invalid_value(
                ValueType::Bool.name(),
                format!("'{}' is not a boolean", other),
            )),
        };
    }
    Ok(match number(raw, ValueType::Bool)? {
        Number::Int(i) => i != 0,
        Number::Float(f) => f != 0.0,
    })
}

fn to_text(raw: &OpcUaValue) -> Result<String, ConversionError> {
    match raw {
        OpcUaValue::String(s) => Ok(s.clone()),
        OpcUaValue::ByteString(bytes) => String::from_utf8(bytes.clone()).map_err(|e| {
            ConversionError::invalid_value(ValueType::String.name(), e.to_string())
        }),
        OpcUaValue::Null | OpcUaValue::Array(_) => Err(ConversionError::type_mismatch(
            ValueType::String.name(),
            raw.type_name(),
        )),
        other => Ok(other.to_string()),
    }
}

// =============================================================================
// Encode
// =============================================================================

/// Encodes a command value for a write to a node of the declared type.
///
/// The value must already be of the declared type.
pub fn encode(value_type: ValueType, value: &CommandValue) -> Result<OpcUaValue, ConversionError> {
    Ok(match (value_type, value) {
        (ValueType::Bool, CommandValue::Bool(v)) => OpcUaValue::Boolean(*v),
        (ValueType::String, CommandValue::String(v)) => OpcUaValue::String(v.clone()),
        (ValueType::Uint8, CommandValue::Uint8(v)) => OpcUaValue::Byte(*v),
        (ValueType::Uint16, CommandValue::Uint16(v)) => OpcUaValue::UInt16(*v),
        (ValueType::Uint32, CommandValue::Uint32(v)) => OpcUaValue::UInt32(*v),
        (ValueType::Uint64, CommandValue::Uint64(v)) => OpcUaValue::UInt64(*v),
        (ValueType::Int8, CommandValue::Int8(v)) => OpcUaValue::SByte(*v),
        (ValueType::Int16, CommandValue::Int16(v)) => OpcUaValue::Int16(*v),
        (ValueType::Int32, CommandValue::Int32(v)) => OpcUaValue::Int32(*v),
        (ValueType::Int64, CommandValue::Int64(v)) => OpcUaValue::Int64(*v),
        (ValueType::Float32, CommandValue::Float32(v)) => OpcUaValue::Float(*v),
        (ValueType::Float64, CommandValue::Float64(v)) => OpcUaValue::Double(*v),
        (expected, actual) => {
            return Err(ConversionError::type_mismatch(
                expected.name(),
                actual.value_type().name(),
            ))
        }
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_bounds() {
        assert_eq!(
            decode(ValueType::Int8, &OpcUaValue::Int32(127)).unwrap(),
            CommandValue::Int8(127)
        );
        assert_eq!(
            decode(ValueType::Int8, &OpcUaValue::Int32(-128)).unwrap(),
            CommandValue::Int8(-128)
        );
        assert!(decode(ValueType::Int8, &OpcUaValue::Int32(128)).is_err());
        assert!(decode(ValueType::Int16, &OpcUaValue::Int32(40_000)).is_err());
        assert!(decode(ValueType::Int32, &OpcUaValue::Int64(i64::from(i32::MAX) + 1)).is_err());
        assert_eq!(
            decode(ValueType::Int64, &OpcUaValue::Int64(i64::MIN)).unwrap(),
            CommandValue::Int64(i64::MIN)
        );
    }

    #[test]
    fn test_unsigned_bounds() {
        assert!(decode(ValueType::Uint8, &OpcUaValue::Int16(256)).is_err());
        assert!(decode(ValueType::Uint8, &OpcUaValue::Int16(-1)).is_err());
        assert_eq!(
            decode(ValueType::Uint16, &OpcUaValue::Int32(65_535)).unwrap(),
            CommandValue::Uint16(65_535)
        );
        assert_eq!(
            decode(ValueType::Uint64, &OpcUaValue::UInt64(u64::MAX)).unwrap(),
            CommandValue::Uint64(u64::MAX)
        );
        assert!(decode(ValueType::Uint32, &OpcUaValue::Int64(-5)).is_err());
    }

    #[test]
    fn test_float_rules() {
        assert!(matches!(
            decode(ValueType::Float32, &OpcUaValue::Double(f64::NAN)),
            Err(ConversionError::NotFinite { .. })
        ));
        assert!(matches!(
            decode(ValueType::Float32, &OpcUaValue::Double(1e40)),
            Err(ConversionError::ValueOutOfRange { .. })
        ));
        assert!(decode(ValueType::Float32, &OpcUaValue::Double(f64::INFINITY)).is_err());
        assert_eq!(
            decode(ValueType::Float32, &OpcUaValue::Double(1.5)).unwrap(),
            CommandValue::Float32(1.5)
        );
        assert!(decode(ValueType::Float64, &OpcUaValue::Double(f64::NEG_INFINITY)).is_err());
        assert_eq!(
            decode(ValueType::Float64, &OpcUaValue::Int32(3)).unwrap(),
            CommandValue::Float64(3.0)
        );
    }

    #[test]
    fn test_lenient_shapes() {
        assert_eq!(
            decode(ValueType::Int32, &OpcUaValue::String(" 42 ".into())).unwrap(),
            CommandValue::Int32(42)
        );
        assert_eq!(
            decode(ValueType::Int16, &OpcUaValue::Double(12.9)).unwrap(),
            CommandValue::Int16(12)
        );
        assert_eq!(
            decode(ValueType::Bool, &OpcUaValue::Int32(2)).unwrap(),
            CommandValue::Bool(true)
        );
        assert_eq!(
            decode(ValueType::Bool, &OpcUaValue::String("false".into())).unwrap(),
            CommandValue::Bool(false)
        );
        assert_eq!(
            decode(ValueType::String, &OpcUaValue::Double(2.5)).unwrap(),
            CommandValue::String("2.5".into())
        );
        assert!(decode(ValueType::Int32, &OpcUaValue::String("abc".into())).is_err());
        assert!(decode(ValueType::Int32, &OpcUaValue::Null).is_err());
        assert!(decode(ValueType::String, &OpcUaValue::Null).is_err());
    }

    #[test]
    fn test_decode_reading_names_resource() {
        let err = decode_reading("Level", ValueType::Uint8, &OpcUaValue::Int32(900)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Level"), "{}", message);
        assert!(message.contains("Uint8"), "{}", message);
    }

    #[test]
    fn test_encode_inverts_decode() {
        let samples = [
            OpcUaValue::Boolean(true),
            OpcUaValue::String("on".into()),
            OpcUaValue::Byte(200),
            OpcUaValue::UInt16(60_000),
            OpcUaValue::UInt32(4_000_000_000),
            OpcUaValue::UInt64(u64::MAX),
            OpcUaValue::SByte(-100),
            OpcUaValue::Int16(-30_000),
            OpcUaValue::Int32(-2_000_000_000),
            OpcUaValue::Int64(i64::MIN),
            OpcUaValue::Float(-3.25),
            OpcUaValue::Double(1e300),
        ];
        for (value_type, raw) in ValueType::ALL.iter().zip(samples.iter()) {
            let decoded = decode(*value_type, raw).unwrap();
            assert_eq!(&encode(*value_type, &decoded).unwrap(), raw, "{}", value_type);
        }
    }

    #[test]
    fn test_encode_type_mismatch() {
        assert!(matches!(
            encode(ValueType::Int16, &CommandValue::Int64(5)),
            Err(ConversionError::TypeMismatch { .. })
        ));
    }
}
