//! CSV format used for cached result sets.
//!
//! Every non-null value is double quoted, with embedded quotes doubled. An
//! empty unquoted field is NULL, which keeps NULL distinct from the empty
//! string. Every record ends with a newline.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::{QuarryError, Result};
use crate::service::RawRow;

/// Serializes rows.
pub fn write_csv<'a>(rows: impl IntoIterator<Item = &'a RawRow>) -> String {
    let mut out = String::new();
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            if let Some(value) = value {
                out.push('"');
                out.push_str(&value.replace('"', "\"\""));
                out.push('"');
            }
        }
        out.push('\n');
    }
    out
}

/// Parses rows written by [`write_csv`].
pub fn read_csv(input: &str) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();
    let mut row: RawRow = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        match chars.peek() {
            None if row.is_empty() => break,
            None => return Err(malformed(&rows, &row, "missing record terminator")),
            Some('"') => {
                chars.next();
                let value = read_quoted(&mut chars)
                    .ok_or_else(|| malformed(&rows, &row, "unterminated quoted value"))?;
                row.push(Some(value));
            }
            Some(',') | Some('\n') => row.push(None),
            Some(_) => return Err(malformed(&rows, &row, "unquoted value")),
        }

        match chars.next() {
            Some(',') => {}
            Some('\n') => rows.push(std::mem::take(&mut row)),
            None => return Err(malformed(&rows, &row, "missing record terminator")),
            Some(c) => {
                return Err(malformed(
                    &rows,
                    &row,
                    format!("unexpected '{c}' after value"),
                ))
            }
        }
    }

    Ok(rows)
}

/// Reads up to and including the closing quote.
fn read_quoted(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut value = String::new();
    loop {
        match chars.next()? {
            '"' if chars.peek() == Some(&'"') => {
                chars.next();
                value.push('"');
            }
            '"' => return Some(value),
            c => value.push(c),
        }
    }
}

fn malformed(rows: &[RawRow], row: &RawRow, msg: impl Into<String>) -> QuarryError {
    QuarryError::decoding(rows.len(), row.len(), format!("malformed CSV: {}", msg.into()))
}
