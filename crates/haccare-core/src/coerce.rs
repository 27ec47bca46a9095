//! Coercion of loosely-typed document values into the registry's field
//! types.
//!
//! Snapshot rows come from hand-edited templates and older exports, so
//! numbers may arrive as strings, booleans as `"yes"`, dates in US
//! format. Every function here returns `Ok(None)` for an absent value
//! (`null`, missing, or a blank string) and `Err` when a present value
//! cannot be represented.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::registry::{FieldSpec, FieldType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}': {message}")]
pub struct CoercionError {
    pub field: String,
    pub message: String,
}

/// Why a row's fields could not be shaped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("required field '{0}' is missing")]
    Missing(String),
    #[error(transparent)]
    Coercion(#[from] CoercionError),
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

pub fn coerce(value: &Value, ty: FieldType) -> Result<Option<Value>, String> {
    if is_blank(value) {
        return Ok(None);
    }
    let out = match ty {
        FieldType::Text => Value::String(match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => return Err(format!("expected text, got {}", type_name(other))),
        }),
        FieldType::Integer => Value::Number(Number::from(coerce_integer(value)?)),
        FieldType::Decimal => {
            let f = coerce_decimal(value)?;
            Value::Number(Number::from_f64(f).ok_or_else(|| format!("{f} is not finite"))?)
        }
        FieldType::Boolean => Value::Bool(coerce_bool(value)?),
        FieldType::Date => Value::String(coerce_date(value)?.format("%Y-%m-%d").to_string()),
        FieldType::DateTime => {
            Value::String(coerce_datetime(value)?.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        FieldType::TextList => Value::Array(coerce_text_list(value)?),
    };
    Ok(Some(out))
}

/// Shape a document row according to `specs`. Undeclared keys are
/// dropped; absent optional fields are omitted from the output.
pub fn shape_fields(
    row: &Map<String, Value>,
    specs: &[FieldSpec],
) -> Result<Map<String, Value>, FieldError> {
    let mut out = Map::new();
    for spec in specs {
        let coerced = match row.get(spec.name) {
            Some(value) => coerce(value, spec.ty).map_err(|message| {
                FieldError::Coercion(CoercionError {
                    field: spec.name.into(),
                    message,
                })
            })?,
            None => None,
        };
        match coerced {
            Some(value) => {
                out.insert(spec.name.into(), value);
            }
            None if spec.required => return Err(FieldError::Missing(spec.name.into())),
            None => {}
        }
    }
    Ok(out)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
                _ => Err(format!("{n} is not a whole number")),
            }
        }
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().or_else(|_| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map(|f| f as i64)
                    .ok_or_else(|| format!("'{s}' is not a whole number"))
            })
        }
        other => Err(format!("expected integer, got {}", type_name(other))),
    }
}

fn coerce_decimal(value: &Value) -> Result<f64, String> {
    let f = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a number"))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a number", s.trim()))?,
        other => return Err(format!("expected number, got {}", type_name(other))),
    };
    if f.is_finite() {
        Ok(f)
    } else {
        Err(format!("{f} is not finite"))
    }
}

fn coerce_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("{n} is not a boolean")),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Ok(true),
            "false" | "f" | "no" | "n" | "0" => Ok(false),
            other => Err(format!("'{other}' is not a boolean")),
        },
        other => Err(format!("expected boolean, got {}", type_name(other))),
    }
}

fn coerce_date(value: &Value) -> Result<NaiveDate, String> {
    let Value::String(s) = value else {
        return Err(format!("expected date, got {}", type_name(value)));
    };
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return Ok(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    if let Some(prefix) = s.get(..10)
        && let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
    {
        return Ok(d);
    }
    Err(format!("'{s}' is not a date"))
}

fn coerce_datetime(value: &Value) -> Result<DateTime<Utc>, String> {
    let Value::String(s) = value else {
        return Err(format!("expected timestamp, got {}", type_name(value)));
    };
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    Err(format!("'{s}' is not a timestamp"))
}

fn coerce_text_list(value: &Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|v| !is_blank(v))
            .map(|v| match v {
                Value::String(s) => Ok(Value::String(s.trim().to_string())),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                other => Err(format!("list item {} is not text", type_name(other))),
            })
            .collect(),
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| Value::String(p.to_string()))
            .collect()),
        other => Err(format!("expected list, got {}", type_name(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldSpec;
    use serde_json::json;

    #[test]
    fn numbers_from_strings() {
        assert_eq!(coerce(&json!("72"), FieldType::Integer), Ok(Some(json!(72))));
        assert_eq!(coerce(&json!(98.0), FieldType::Integer), Ok(Some(json!(98))));
        assert_eq!(
            coerce(&json!(" 37.2 "), FieldType::Decimal),
            Ok(Some(json!(37.2)))
        );
        assert!(coerce(&json!("seventy"), FieldType::Integer).is_err());
        assert!(coerce(&json!(7.5), FieldType::Integer).is_err());
    }

    #[test]
    fn blank_values_are_absent() {
        for ty in [FieldType::Integer, FieldType::Date, FieldType::Text] {
            assert_eq!(coerce(&json!(""), ty), Ok(None));
            assert_eq!(coerce(&Value::Null, ty), Ok(None));
        }
    }

    #[test]
    fn booleans() {
        assert_eq!(coerce(&json!("Yes"), FieldType::Boolean), Ok(Some(json!(true))));
        assert_eq!(coerce(&json!(0), FieldType::Boolean), Ok(Some(json!(false))));
        assert!(coerce(&json!("maybe"), FieldType::Boolean).is_err());
    }

    #[test]
    fn dates_and_timestamps() {
        assert_eq!(
            coerce(&json!("03/14/1961"), FieldType::Date),
            Ok(Some(json!("1961-03-14")))
        );
        assert_eq!(
            coerce(&json!("1961-03-14T10:00:00+02:00"), FieldType::Date),
            Ok(Some(json!("1961-03-14")))
        );
        assert_eq!(
            coerce(&json!("2025-05-20 08:30:00"), FieldType::DateTime),
            Ok(Some(json!("2025-05-20T08:30:00Z")))
        );
        assert_eq!(
            coerce(&json!("2025-05-20T10:30:00+02:00"), FieldType::DateTime),
            Ok(Some(json!("2025-05-20T08:30:00Z")))
        );
        assert!(coerce(&json!("yesterday"), FieldType::DateTime).is_err());
        assert!(coerce(&json!(20250520), FieldType::Date).is_err());
    }

    #[test]
    fn text_lists() {
        assert_eq!(
            coerce(&json!("penicillin, latex ,"), FieldType::TextList),
            Ok(Some(json!(["penicillin", "latex"])))
        );
        assert_eq!(
            coerce(&json!(["sulfa", ""]), FieldType::TextList),
            Ok(Some(json!(["sulfa"])))
        );
    }

    #[test]
    fn shape_reports_missing_and_bad_fields() {
        const SPECS: &[FieldSpec] = &[
            FieldSpec {
                name: "name",
                ty: FieldType::Text,
                required: true,
            },
            FieldSpec {
                name: "prn",
                ty: FieldType::Boolean,
                required: false,
            },
        ];
        let row = json!({"name": "Morphine", "prn": "y", "legacy_col": 1});
        let shaped = shape_fields(row.as_object().unwrap(), SPECS).unwrap();
        assert_eq!(Value::Object(shaped), json!({"name": "Morphine", "prn": true}));

        let row = json!({"prn": true});
        assert_eq!(
            shape_fields(row.as_object().unwrap(), SPECS),
            Err(FieldError::Missing("name".into()))
        );

        let row = json!({"name": "Morphine", "prn": "sometimes"});
        assert!(matches!(
            shape_fields(row.as_object().unwrap(), SPECS),
            Err(FieldError::Coercion(CoercionError { ref field, .. })) if field == "prn"
        ));
    }

    #[test]
    fn field_errors_render_the_field_name() {
        let err = CoercionError {
            field: "dose".into(),
            message: "expected a number".into(),
        };
        assert_eq!(err.to_string(), "field 'dose': expected a number");

        let wrapped: FieldError = err.into();
        assert_eq!(wrapped.to_string(), "field 'dose': expected a number");
        assert!(std::error::Error::source(&wrapped).is_none());
        assert_eq!(
            FieldError::Missing("name".into()).to_string(),
            "required field 'name' is missing"
        );
    }
}
