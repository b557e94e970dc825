//! Row repair and cell decoding.

use tracing::debug;

use super::types::{NativeType, Row, Value};
use crate::error::{QuarryError, Result};
use crate::service::{ColumnMetadata, RawRow};

/// Fixes result shapes the service returns for some statements.
///
/// - A leading row repeating the column names is dropped. Plain queries
///   always carry one.
/// - Metadata statements (`DESCRIBE` and friends) declare several columns
///   but return a single tab-separated field per row; those rows are split
///   and padded with NULLs to the declared width.
pub fn repair_rows(columns: &[ColumnMetadata], mut rows: Vec<RawRow>) -> Vec<RawRow> {
    let header_repeated = rows.first().is_some_and(|first| {
        first.len() == columns.len()
            && first
                .iter()
                .zip(columns)
                .all(|(value, column)| value.as_deref() == Some(column.name.as_str()))
    });
    if header_repeated {
        rows.remove(0);
        return rows;
    }

    if columns.len() > 1 && !rows.is_empty() && rows.iter().all(|row| row.len() == 1) {
        debug!(rows = rows.len(), "Splitting tab-separated metadata rows");
        return rows
            .into_iter()
            .map(|row| {
                let text = row.into_iter().next().flatten().unwrap_or_default();
                let mut fields: RawRow = text
                    .splitn(columns.len(), '\t')
                    .map(|field| Some(field.to_string()))
                    .collect();
                fields.resize(columns.len(), None);
                fields
            })
            .collect();
    }

    rows
}

/// Decodes raw rows against column types.
///
/// Fails on the first cell that cannot be decoded, or on a row whose width
/// does not match the column count.
pub fn decode_rows(types: &[NativeType], rows: &[RawRow]) -> Result<Vec<Row>> {
    rows.iter()
        .enumerate()
        .map(|(row_index, row)| decode_row(types, row_index, row))
        .collect()
}

fn decode_row(types: &[NativeType], row_index: usize, row: &RawRow) -> Result<Row> {
    if row.len() != types.len() {
        return Err(QuarryError::decoding(
            row_index,
            row.len().min(types.len()),
            format!("expected {} values, found {}", types.len(), row.len()),
        ));
    }
    row.iter()
        .zip(types)
        .enumerate()
        .map(|(column_index, (cell, native))| match cell {
            None => Ok(Value::Null),
            Some(text) => native
                .decode(text)
                .map_err(|message| QuarryError::decoding(row_index, column_index, message)),
        })
        .collect()
}
