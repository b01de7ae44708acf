//! Typed field values and their Firestore wire encoding.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::StoreError;

pub type Fields = BTreeMap<String, FieldValue>;

/// A single document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Map(Fields),
}

impl FieldValue {
    pub fn now() -> Self {
        FieldValue::Timestamp(Utc::now())
    }

    /// Convert plain JSON. Strings stay strings; timestamps must be built explicitly.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Double(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => FieldValue::String(s),
            Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from_json).collect())
            }
            Value::Object(map) => FieldValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Plain JSON view. Timestamps are rendered as ISO-8601 with milliseconds.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(i) => json!(i),
            FieldValue::Double(d) => json!(d),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Array(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            FieldValue::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Ordering used when sorting query results. Values of different kinds
    /// order by kind (null < bool < number < timestamp < string < array < map).
    pub(crate) fn compare(&self, other: &FieldValue) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Integer(a), Double(b)) => (*a as f64).total_cmp(b),
            (Double(a), Integer(b)) => a.total_cmp(&(*b as f64)),
            (Double(a), Double(b)) => a.total_cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Array(a), Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.compare(y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Integer(_) | FieldValue::Double(_) => 2,
            FieldValue::Timestamp(_) => 3,
            FieldValue::String(_) => 4,
            FieldValue::Array(_) => 5,
            FieldValue::Map(_) => 6,
        }
    }

    /// Encode as a Firestore REST `Value`.
    pub(crate) fn to_firestore(&self) -> Value {
        match self {
            FieldValue::Null => json!({ "nullValue": null }),
            FieldValue::Bool(b) => json!({ "booleanValue": b }),
            // int64 travels as a decimal string
            FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
            FieldValue::Double(d) => json!({ "doubleValue": d }),
            FieldValue::String(s) => json!({ "stringValue": s }),
            FieldValue::Timestamp(ts) => {
                json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Micros, true) })
            }
            FieldValue::Array(items) => json!({
                "arrayValue": { "values": items.iter().map(|v| v.to_firestore()).collect::<Vec<_>>() }
            }),
            FieldValue::Map(fields) => json!({ "mapValue": { "fields": fields_to_firestore(fields) } }),
        }
    }

    /// Decode a Firestore REST `Value`.
    pub(crate) fn from_firestore(value: &Value) -> Result<FieldValue, StoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| StoreError::Decode(format!("expected value object, got {}", value)))?;
        let (kind, inner) = obj
            .iter()
            .next()
            .ok_or_else(|| StoreError::Decode("empty value object".to_string()))?;

        let decoded = match kind.as_str() {
            "nullValue" => FieldValue::Null,
            "booleanValue" => FieldValue::Bool(inner.as_bool().unwrap_or_default()),
            "integerValue" => {
                let parsed = match inner {
                    Value::String(s) => s.parse::<i64>().ok(),
                    other => other.as_i64(),
                };
                FieldValue::Integer(parsed.ok_or_else(|| {
                    StoreError::Decode(format!("bad integerValue: {}", inner))
                })?)
            }
            "doubleValue" => FieldValue::Double(inner.as_f64().unwrap_or_default()),
            "stringValue" => FieldValue::String(inner.as_str().unwrap_or_default().to_string()),
            // references and blobs are not used by the workforce schema; keep them as text
            "referenceValue" | "bytesValue" => {
                FieldValue::String(inner.as_str().unwrap_or_default().to_string())
            }
            "timestampValue" => {
                let raw = inner.as_str().unwrap_or_default();
                let ts = DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| StoreError::Decode(format!("bad timestampValue {}: {}", raw, e)))?;
                FieldValue::Timestamp(ts.with_timezone(&Utc))
            }
            "geoPointValue" => FieldValue::from_json(inner.clone()),
            "arrayValue" => {
                let values = inner
                    .get("values")
                    .and_then(Value::as_array)
                    .map(|vs| {
                        vs.iter()
                            .map(FieldValue::from_firestore)
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .transpose()?
                    .unwrap_or_default();
                FieldValue::Array(values)
            }
            "mapValue" => FieldValue::Map(match inner.get("fields") {
                Some(fields) => fields_from_firestore(fields)?,
                None => Fields::new(),
            }),
            other => {
                return Err(StoreError::Decode(format!("unsupported value type {}", other)));
            }
        };
        Ok(decoded)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

/// Serialize a struct into document fields. `T` must serialize to a JSON object.
pub fn to_fields<T: Serialize + ?Sized>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value).map_err(|e| StoreError::Decode(e.to_string()))? {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, FieldValue::from_json(v)))
            .collect()),
        other => Err(StoreError::Decode(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

pub(crate) fn fields_to_firestore(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_firestore()))
            .collect(),
    )
}

pub(crate) fn fields_from_firestore(value: &Value) -> Result<Fields, StoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::Decode("fields is not an object".to_string()))?;
    obj.iter()
        .map(|(k, v)| -> Result<(String, FieldValue), StoreError> {
            Ok((k.clone(), FieldValue::from_firestore(v)?))
        })
        .collect()
}
