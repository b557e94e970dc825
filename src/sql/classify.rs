//! Statement classification for caching decisions.
//!
//! Only read-only queries are cached: re-running DDL or DML from a cache
//! would silently skip its side effects.

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// The kind of statement, as far as caching is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `SELECT`, `WITH ... SELECT`, `VALUES` and other pure queries.
    Query,
    /// Anything else (DDL, DML, `SHOW`, `EXPLAIN`, ...).
    Other,
}

/// Classifies SQL text.
///
/// The generic dialect does not understand every service-specific
/// extension, so unparsable text falls back to a keyword check that skips
/// leading comments.
pub fn classify_statement(sql: &str) -> StatementKind {
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) if statements.len() == 1 => match &statements[0] {
            Statement::Query(_) => StatementKind::Query,
            _ => StatementKind::Other,
        },
        // Empty input or several statements in one submission.
        Ok(_) => StatementKind::Other,
        Err(_) => classify_by_keyword(sql),
    }
}

/// Returns true for read-only queries that may be served from a cache.
pub fn is_select(sql: &str) -> bool {
    classify_statement(sql) == StatementKind::Query
}

fn classify_by_keyword(sql: &str) -> StatementKind {
    let keyword: String = skip_comments(sql)
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    match keyword.to_ascii_uppercase().as_str() {
        "SELECT" | "WITH" => StatementKind::Query,
        _ => StatementKind::Other,
    }
}

/// Strips leading whitespace, `--` line comments and `/* */` block comments.
fn skip_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(tail) = rest.strip_prefix("--") {
            rest = match tail.find('\n') {
                Some(end) => tail[end + 1..].trim_start(),
                None => "",
            };
        } else if let Some(tail) = rest.strip_prefix("/*") {
            rest = match tail.find("*/") {
                Some(end) => tail[end + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}
