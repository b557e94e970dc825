//! Parameter binding with SQL quoting.
//!
//! Placeholders follow the `format` paramstyle: `%s` for positional values,
//! `%(name)s` for named values and `%%` for a literal percent sign.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};

/// A scalar value that can be bound into SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Decimal number kept as its exact text form.
    Decimal(String),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl SqlParam {
    /// Creates a decimal parameter, validating its text form.
    pub fn decimal(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if !is_decimal(&value) {
            return Err(QuarryError::parameter(format!(
                "invalid decimal literal '{value}'"
            )));
        }
        Ok(Self::Decimal(value))
    }

    /// Renders the value as an SQL expression.
    pub fn to_literal(&self) -> Result<String> {
        let literal = match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => quote_float(*v),
            Self::Decimal(v) => {
                if !is_decimal(v) {
                    return Err(QuarryError::parameter(format!(
                        "invalid decimal literal '{v}'"
                    )));
                }
                format!("DECIMAL '{v}'")
            }
            Self::String(v) => quote_str(v),
            Self::Date(v) => format!("DATE '{}'", v.format("%Y-%m-%d")),
            Self::Timestamp(v) => format!("TIMESTAMP '{}'", v.format("%Y-%m-%d %H:%M:%S%.3f")),
            Self::Bytes(v) => format!("from_base64('{}')", STANDARD.encode(v)),
        };
        Ok(literal)
    }
}

fn quote_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quote_float(value: f64) -> String {
    if value.is_nan() {
        "nan()".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "infinity()".to_string()
        } else {
            "-infinity()".to_string()
        }
    } else {
        // Debug keeps the decimal point for integral values (`1.0`, not `1`).
        format!("{value:?}")
    }
}

pub(crate) fn is_decimal(value: &str) -> bool {
    static DECIMAL: OnceLock<Regex> = OnceLock::new();
    DECIMAL
        .get_or_init(|| {
            Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid regex")
        })
        .is_match(value)
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for SqlParam {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f32> for SqlParam {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NaiveDate> for SqlParam {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for SqlParam {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Vec<u8>> for SqlParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T> From<Option<T>> for SqlParam
where
    T: Into<SqlParam>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

impl TryFrom<serde_json::Value> for SqlParam {
    type Error = QuarryError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value as Json;
        match value {
            Json::Null => Ok(Self::Null),
            Json::Bool(b) => Ok(Self::Bool(b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n.as_f64().map(Self::Float).ok_or_else(|| {
                    QuarryError::parameter(format!("number {n} cannot be quoted"))
                }),
            },
            Json::String(s) => Ok(Self::String(s)),
            Json::Array(_) => Err(QuarryError::parameter("cannot quote an array value")),
            Json::Object(_) => Err(QuarryError::parameter("cannot quote an object value")),
        }
    }
}

/// Parameters supplied with a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    /// No parameters: SQL is used as-is, `%` signs included.
    #[default]
    None,
    /// Values for `%s` placeholders, in order.
    Positional(Vec<SqlParam>),
    /// Values for `%(name)s` placeholders.
    Named(BTreeMap<String, SqlParam>),
}

impl Params {
    /// Returns true when no values were supplied.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Positional(values) => values.is_empty(),
            Self::Named(values) => values.is_empty(),
        }
    }

    /// Builds named parameters from `(name, value)` pairs.
    pub fn named<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<SqlParam>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Renders every value as a literal, keyed by name for named parameters.
    ///
    /// Used to fingerprint the binding independently of the SQL template.
    pub fn literals(&self) -> Result<Vec<(Option<String>, String)>> {
        match self {
            Self::None => Ok(Vec::new()),
            Self::Positional(values) => values
                .iter()
                .map(|v| Ok((None, v.to_literal()?)))
                .collect(),
            Self::Named(values) => values
                .iter()
                .map(|(k, v)| Ok((Some(k.clone()), v.to_literal()?)))
                .collect(),
        }
    }
}

impl From<Vec<SqlParam>> for Params {
    fn from(values: Vec<SqlParam>) -> Self {
        Self::Positional(values)
    }
}

impl From<BTreeMap<String, SqlParam>> for Params {
    fn from(values: BTreeMap<String, SqlParam>) -> Self {
        Self::Named(values)
    }
}

/// Builds positional [`Params`] from values convertible to [`SqlParam`].
///
/// ```
/// let params = quarry::params![1, "foo", 3.14];
/// assert_eq!(quarry::sql::bind("SELECT %s, %s, %s", &params).unwrap(), "SELECT 1, 'foo', 3.14");
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::sql::Params::Positional(Vec::new())
    };
    ($($value:expr),+ $(,)?) => {
        $crate::sql::Params::Positional(vec![$($crate::sql::SqlParam::from($value)),+])
    };
}

/// Substitutes parameters into SQL.
///
/// With no parameters the SQL is returned untouched, so text such as
/// `LIKE 'A%'` needs no escaping. Once parameters are supplied every `%`
/// starts a directive and a literal percent sign must be written as `%%`.
pub fn bind(sql: &str, params: &Params) -> Result<String> {
    if params.is_empty() {
        return Ok(sql.to_string());
    }

    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    let mut used = 0usize;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let directive = &rest[pos + 1..];

        if let Some(tail) = directive.strip_prefix('%') {
            out.push('%');
            rest = tail;
        } else if let Some(tail) = directive.strip_prefix('s') {
            let Params::Positional(values) = params else {
                return Err(QuarryError::parameter(
                    "positional placeholder %s used with named parameters",
                ));
            };
            let value = values.get(used).ok_or_else(|| {
                QuarryError::parameter(format!(
                    "not enough parameters: {} supplied",
                    values.len()
                ))
            })?;
            out.push_str(&value.to_literal()?);
            used += 1;
            rest = tail;
        } else if let Some(tail) = directive.strip_prefix('(') {
            let (key, tail) = tail
                .split_once(')')
                .and_then(|(key, tail)| Some((key, tail.strip_prefix('s')?)))
                .ok_or_else(|| QuarryError::parameter("malformed named placeholder"))?;
            let Params::Named(values) = params else {
                return Err(QuarryError::parameter(format!(
                    "named placeholder %({key})s used with positional parameters"
                )));
            };
            let value = values
                .get(key)
                .ok_or_else(|| QuarryError::parameter(format!("missing parameter '{key}'")))?;
            out.push_str(&value.to_literal()?);
            rest = tail;
        } else {
            let found = directive.chars().next().map(String::from).unwrap_or_default();
            return Err(QuarryError::parameter(format!(
                "unsupported placeholder '%{found}'"
            )));
        }
    }
    out.push_str(rest);

    if let Params::Positional(values) = params {
        if used != values.len() {
            return Err(QuarryError::parameter(format!(
                "{used} placeholders but {} parameters supplied",
                values.len()
            )));
        }
    }

    Ok(out)
}
