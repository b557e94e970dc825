//! SQL text handling for Quarry.
//!
//! Normalization, parameter binding and statement classification: the
//! steps that turn caller input into the final SQL and its cache key.

mod classify;
mod normalize;
mod params;

pub use classify::{classify_statement, is_select, StatementKind};
pub use normalize::normalize_sql;
pub use params::{bind, Params, SqlParam};
pub(crate) use params::is_decimal;

/// Default length of SQL excerpts in log lines.
pub const LOG_EXCERPT_LEN: usize = 80;

/// Shortens SQL for log output, keeping its head and tail.
pub fn truncate_sql(sql: &str, max_len: usize) -> String {
    let chars: Vec<char> = sql.chars().collect();
    if chars.len() <= max_len {
        return sql.to_string();
    }
    let head = max_len * 2 / 3;
    let tail = max_len.saturating_sub(head + 3);
    let mut out: String = chars[..head].iter().collect();
    out.push_str("...");
    out.extend(&chars[chars.len() - tail..]);
    out
}
