//! Column types and typed values.
//!
//! Maps the type names declared by the service to native types and parses
//! the textual cell values into [`Value`]s.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::sql::is_decimal;

/// Native type a declared column type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    String,
    Date,
    Timestamp,
    Binary,
    Array,
    Map,
    Json,
}

impl NativeType {
    /// Maps a declared type such as `integer`, `decimal(10,2)` or
    /// `array(varchar)` to its native type.
    ///
    /// The service reports 32-bit floats as either `float` or `real`;
    /// both spellings map to [`NativeType::Float32`].
    pub fn from_declared(declared: &str) -> Result<Self> {
        let lower = declared.trim().to_ascii_lowercase();
        let base = lower
            .split(['(', '<'])
            .next()
            .unwrap_or_default()
            .trim();

        let native = match base {
            "boolean" => Self::Boolean,
            "tinyint" => Self::Int8,
            "smallint" => Self::Int16,
            "integer" | "int" => Self::Int32,
            "bigint" => Self::Int64,
            "float" | "real" => Self::Float32,
            "double" => Self::Float64,
            "decimal" => Self::Decimal,
            "varchar" | "char" | "string" => Self::String,
            // Type of a bare NULL literal.
            "unknown" => Self::String,
            "date" => Self::Date,
            "timestamp" => Self::Timestamp,
            "varbinary" => Self::Binary,
            "array" => Self::Array,
            "map" => Self::Map,
            "json" => Self::Json,
            _ => return Err(QuarryError::type_mapping(declared)),
        };
        Ok(native)
    }

    /// Parses the textual form of a non-null value.
    ///
    /// Returns a message describing the problem on failure; the caller
    /// attaches the cell position.
    pub fn decode(&self, text: &str) -> std::result::Result<Value, String> {
        match self {
            Self::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("invalid boolean '{text}'")),
            },
            Self::Int8 => parse_int::<i8>(text),
            Self::Int16 => parse_int::<i16>(text),
            Self::Int32 => parse_int::<i32>(text),
            Self::Int64 => parse_int::<i64>(text),
            Self::Float32 | Self::Float64 => text
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("invalid float '{text}'")),
            Self::Decimal => {
                if is_decimal(text) {
                    Ok(Value::Decimal(text.to_string()))
                } else {
                    Err(format!("invalid decimal '{text}'"))
                }
            }
            Self::String => Ok(Value::String(text.to_string())),
            Self::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| format!("invalid date '{text}': {e}")),
            Self::Timestamp => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
                .map(Value::Timestamp)
                .map_err(|e| format!("invalid timestamp '{text}': {e}")),
            Self::Binary => {
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                hex::decode(compact)
                    .map(Value::Bytes)
                    .map_err(|e| format!("invalid binary '{text}': {e}"))
            }
            Self::Array => parse_array(text),
            Self::Map => parse_map(text),
            Self::Json => serde_json::from_str(text)
                .map(Value::Json)
                .map_err(|e| format!("invalid json '{text}': {e}")),
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Binary => "binary",
            Self::Array => "array",
            Self::Map => "map",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

fn parse_int<T>(text: &str) -> std::result::Result<Value, String>
where
    T: std::str::FromStr + Into<i64>,
{
    text.trim()
        .parse::<T>()
        .map(|v| Value::Int(v.into()))
        .map_err(|_| format!("invalid integer '{text}'"))
}

// Items are always strings: the service does not describe element types,
// and a comma inside an item cannot be told apart from a separator.
fn parse_array(text: &str) -> std::result::Result<Value, String> {
    let content = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| format!("invalid array '{text}'"))?;
    if content.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    Ok(Value::Array(
        content.split(", ").map(String::from).collect(),
    ))
}

fn parse_map(text: &str) -> std::result::Result<Value, String> {
    let content = text
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| format!("invalid map '{text}'"))?;
    if content.is_empty() {
        return Ok(Value::Map(BTreeMap::new()));
    }
    let entries = content
        .split(", ")
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            (k.to_string(), v.to_string())
        })
        .collect();
    Ok(Value::Map(entries))
}

/// A row of decoded values.
pub type Row = Vec<Value>;

/// A single decoded value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer of any declared width.
    Int(i64),

    /// Floating point number of either declared width.
    Float(f64),

    /// Decimal number in its exact text form.
    Decimal(String),

    /// Text value.
    String(String),

    /// Calendar date.
    Date(NaiveDate),

    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Array items as text.
    Array(Vec<String>),

    /// Map entries as text.
    Map(BTreeMap<String, String>),

    /// Parsed JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a float, if it is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) | Value::Decimal(v) => Some(v),
            _ => None,
        }
    }

    /// Converts the value to a display string.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(d) => d.clone(),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.to_string(),
            Value::Timestamp(t) => t.to_string(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
            Value::Array(items) => format!("[{}]", items.join(", ")),
            Value::Map(entries) => {
                let parts: Vec<String> = entries.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Json(j) => j.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
