//! Typed query results.
//!
//! Converts the raw textual rows returned by the service into typed values
//! and back into the CSV form stored by the local cache.

mod csv;
mod decode;
mod types;

use std::sync::Arc;

pub use csv::{read_csv, write_csv};
pub use decode::{decode_rows, repair_rows};
pub use types::{NativeType, Row, Value};

use crate::error::{QuarryError, Result};
use crate::service::{ColumnMetadata, RawResultSet, RawRow};

/// Column of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Type name as declared by the service.
    pub declared_type: String,

    /// Native type the values are decoded to.
    pub native_type: NativeType,
}

impl Column {
    /// Resolves the native type of a declared column.
    pub fn from_metadata(metadata: &ColumnMetadata) -> Result<Self> {
        Ok(Self {
            name: metadata.name.clone(),
            declared_type: metadata.data_type.clone(),
            native_type: NativeType::from_declared(&metadata.data_type)?,
        })
    }
}

/// Decoded results of a query.
///
/// Cheap to clone. The raw rows are kept next to the decoded ones so the
/// results can be cached without re-encoding values.
#[derive(Debug, Clone)]
pub struct QueryResults {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    columns: Vec<Column>,
    raw_rows: Vec<RawRow>,
    rows: Vec<Row>,
}

impl QueryResults {
    /// Decodes a result set as returned by the service, repairing its
    /// shape first.
    pub fn from_raw(raw: RawResultSet) -> Result<Self> {
        let rows = repair_rows(&raw.columns, raw.rows);
        Self::decode(&raw.columns, rows)
    }

    /// Decodes rows that are known to be well-formed.
    pub fn decode(columns: &[ColumnMetadata], raw_rows: Vec<RawRow>) -> Result<Self> {
        let columns = columns
            .iter()
            .map(Column::from_metadata)
            .collect::<Result<Vec<_>>>()?;
        let types: Vec<NativeType> = columns.iter().map(|c| c.native_type).collect();
        let rows = decode_rows(&types, &raw_rows)?;
        Ok(Self {
            inner: Arc::new(Inner {
                columns,
                raw_rows,
                rows,
            }),
        })
    }

    /// Parses results stored by [`QueryResults::to_csv`].
    ///
    /// The first record holds the column names, the second their declared
    /// types.
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut records = read_csv(text)?.into_iter();
        let (Some(names), Some(types)) = (records.next(), records.next()) else {
            return Err(QuarryError::decoding(0, 0, "missing header records"));
        };
        if names.len() != types.len() {
            return Err(QuarryError::decoding(
                1,
                0,
                "header records differ in length",
            ));
        }
        let columns = names
            .into_iter()
            .zip(types)
            .enumerate()
            .map(|(i, (name, data_type))| match (name, data_type) {
                (Some(name), Some(data_type)) => Ok(ColumnMetadata::new(name, data_type)),
                _ => Err(QuarryError::decoding(0, i, "NULL in header record")),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::decode(&columns, records.collect())
    }

    /// Serializes the results: names, declared types, then the rows.
    pub fn to_csv(&self) -> String {
        let names: RawRow = self.columns().iter().map(|c| Some(c.name.clone())).collect();
        let types: RawRow = self
            .columns()
            .iter()
            .map(|c| Some(c.declared_type.clone()))
            .collect();
        let header = [names, types];
        write_csv(header.iter().chain(self.inner.raw_rows.iter()))
    }

    /// Returns the columns.
    pub fn columns(&self) -> &[Column] {
        &self.inner.columns
    }

    /// Returns the column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.inner.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns the index of the named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.inner.columns.iter().position(|c| c.name == name)
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.inner.rows.len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.inner.rows.is_empty()
    }

    /// Returns the row at `index`.
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.inner.rows.get(index)
    }

    /// Returns the value at `row`, in the named column.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let column = self.column_index(column)?;
        self.get(row)?.get(column)
    }

    /// Returns all decoded rows.
    pub fn rows(&self) -> &[Row] {
        &self.inner.rows
    }

    /// Iterates over the decoded rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.inner.rows.iter()
    }

    /// Returns the undecoded rows.
    pub fn raw_rows(&self) -> &[RawRow] {
        &self.inner.raw_rows
    }
}

impl PartialEq for QueryResults {
    fn eq(&self, other: &Self) -> bool {
        self.inner.columns == other.inner.columns && self.inner.rows == other.inner.rows
    }
}

impl<'a> IntoIterator for &'a QueryResults {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
