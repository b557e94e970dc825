//! Whitespace normalization of SQL text.
//!
//! Normalized text is used both for submission and as the cache key, so
//! queries that differ only in indentation share cached executions.

/// Normalizes SQL whitespace.
///
/// - Line endings are normalized to LF.
/// - Trailing whitespace is removed from every line.
/// - Indentation common to all non-blank lines is removed.
/// - Leading and trailing blank lines are dropped; interior blank lines are kept.
pub fn normalize_sql(sql: &str) -> String {
    let unified = sql.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.split('\n').map(str::trim_end).collect();

    let indent = common_indent(&lines);

    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());
    let (Some(first), Some(last)) = (first, last) else {
        return String::new();
    };

    lines[first..=last]
        .iter()
        .map(|line| line.get(indent..).unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Byte length of the leading whitespace shared by all non-blank lines.
fn common_indent(lines: &[&str]) -> usize {
    let mut common: Option<&str> = None;
    for line in lines.iter().filter(|l| !l.is_empty()) {
        let trimmed = line.trim_start();
        let leading = &line[..line.len() - trimmed.len()];
        common = Some(match common {
            None => leading,
            Some(prefix) => {
                let shared = prefix
                    .char_indices()
                    .zip(leading.chars())
                    .find(|((_, a), b)| a != b)
                    .map(|((i, _), _)| i)
                    .unwrap_or_else(|| prefix.len().min(leading.len()));
                &prefix[..shared]
            }
        });
    }
    common.map(str::len).unwrap_or(0)
}
