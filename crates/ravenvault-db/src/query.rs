//! SQL text generation for entity rows.
//!
//! The builder is pure: it turns rows and an operation into literal SQL.
//! Values are rendered inline rather than bound as parameters so one batch
//! of mixed kinds becomes a single statement text the flush pipeline can
//! send in one round trip.
//!
//! Rendering rules:
//!
//! - `NULL` for absent values and for non-finite floats
//! - text, characters, timestamps and UUIDs single-quoted with embedded
//!   quotes doubled; timestamps as RFC 3339 UTC with microseconds
//! - enumerations as their underlying integer
//! - numbers in invariant form (`.` decimal separator, ASCII minus)
//! - booleans as `1`/`0`; an absent optional boolean as `0`
//! - identifiers double-quoted

use std::fmt::Write as _;

use chrono::SecondsFormat;
use ravenvault_types::{KEY_COLUMN, Operation, Row, SqlValue};
use serde::Serialize;

use crate::error::DbError;

/// Rows written to one table by a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    /// Table name.
    pub table: &'static str,
    /// Rows written.
    pub rows: usize,
}

/// One SQL text plus what it writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    /// SQL text; several statements are joined with `;`.
    pub sql: String,
    /// The write every part of the text performs.
    pub operation: Operation,
    /// Per-table row counts, in statement order.
    pub targets: Vec<Target>,
}

impl Statement {
    /// Total rows written by the statement.
    pub fn row_count(&self) -> usize {
        self.targets.iter().map(|t| t.rows).sum()
    }

    /// Whether the statement writes nothing.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a literal, doubling embedded quotes.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Rewrite a formatted number into invariant form: `,` becomes `.` and the
/// Unicode minus sign becomes `-`.
pub fn normalize_number(text: &str) -> String {
    text.replace(',', ".").replace('\u{2212}', "-")
}

/// Render one value as a SQL literal.
pub fn format_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_owned(),
        SqlValue::Text(text) => quote_literal(text),
        SqlValue::Char(c) => quote_literal(&c.to_string()),
        SqlValue::Timestamp(at) => quote_literal(&at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        SqlValue::Uuid(id) => quote_literal(&id.to_string()),
        SqlValue::Enum(n) | SqlValue::Integer(n) => n.to_string(),
        SqlValue::Float(f) => {
            if f.is_finite() {
                normalize_number(&f.to_string())
            } else {
                "NULL".to_owned()
            }
        }
        SqlValue::Decimal(d) => normalize_number(&d.to_string()),
        SqlValue::Bool(b) => bool_literal(*b).to_owned(),
        SqlValue::OptionalBool(b) => bool_literal(b.unwrap_or(false)).to_owned(),
        SqlValue::Binary(bytes) => {
            tracing::warn!(len = bytes.len(), "unsupported binary value written as NULL");
            "NULL".to_owned()
        }
    }
}

const fn bool_literal(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn value_tuple(values: &[SqlValue]) -> String {
    let rendered: Vec<String> = values.iter().map(format_value).collect();
    format!("({})", rendered.join(", "))
}

fn key_literal(row: &Row) -> String {
    format_value(&SqlValue::Uuid(row.key))
}

/// `INSERT INTO "<table>" (<columns>) VALUES (<values>)`.
pub fn insert(row: &Row) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_identifier(row.table),
        column_list(row.columns),
        value_tuple(&row.values)
    )
}

/// One multi-row insert sharing the first row's column list.
///
/// Returns `Ok(None)` for an empty slice.
///
/// # Errors
///
/// Returns [`DbError::InvalidBatch`] if the rows belong to different tables.
pub fn insert_many(rows: &[&Row]) -> Result<Option<String>, DbError> {
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    if let Some(other) = rows.iter().find(|r| r.table != first.table) {
        return Err(DbError::InvalidBatch(format!(
            "multi-row insert mixes {} and {}",
            first.table, other.table
        )));
    }
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_identifier(first.table),
        column_list(first.columns)
    );
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&value_tuple(&row.values));
    }
    Ok(Some(sql))
}

/// `UPDATE "<table>" SET ... WHERE "Id" = <key>`.
pub fn update(row: &Row) -> String {
    let mut assignments = String::new();
    for (column, value) in row.columns.iter().zip(&row.values) {
        if *column == KEY_COLUMN {
            continue;
        }
        if !assignments.is_empty() {
            assignments.push_str(", ");
        }
        let _ = write!(assignments, "{} = {}", quote_identifier(column), format_value(value));
    }
    if assignments.is_empty() {
        let key = quote_identifier(KEY_COLUMN);
        assignments = format!("{key} = {key}");
    }
    format!(
        "UPDATE {} SET {} WHERE {} = {}",
        quote_identifier(row.table),
        assignments,
        quote_identifier(KEY_COLUMN),
        key_literal(row)
    )
}

/// `DELETE FROM "<table>" WHERE "Id" = <key>`.
pub fn delete(row: &Row) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {}",
        quote_identifier(row.table),
        quote_identifier(KEY_COLUMN),
        key_literal(row)
    )
}

/// `DELETE FROM "<table>" WHERE "Id" IN (...)` for rows of one table.
fn delete_many(table: &str, rows: &[&Row]) -> String {
    let keys: Vec<String> = rows.iter().map(|r| key_literal(r)).collect();
    format!(
        "DELETE FROM {} WHERE {} IN ({})",
        quote_identifier(table),
        quote_identifier(KEY_COLUMN),
        keys.join(", ")
    )
}

/// `TRUNCATE TABLE "<table>"`.
pub fn truncate(table: &str) -> String {
    format!("TRUNCATE TABLE {}", quote_identifier(table))
}

/// [`truncate`] as an executable statement. It reports no target rows.
pub fn truncate_statement(table: &str) -> Statement {
    Statement {
        sql: truncate(table),
        operation: Operation::Delete,
        targets: Vec::new(),
    }
}

/// Build one statement text for a batch of rows sharing an operation.
///
/// Consecutive rows of the same table are grouped: inserts share one
/// multi-row `INSERT`, deletes share one `IN (...)` list, and every update
/// is its own `UPDATE`. Parts are joined with `;`.
pub fn build<'a>(operation: Operation, rows: impl IntoIterator<Item = &'a Row>) -> Statement {
    let mut groups: Vec<(&'static str, Vec<&'a Row>)> = Vec::new();
    for row in rows {
        let same_table = groups.last().is_some_and(|(table, _)| *table == row.table);
        match groups.last_mut() {
            Some((_, members)) if same_table => members.push(row),
            _ => groups.push((row.table, vec![row])),
        }
    }

    let mut parts: Vec<String> = Vec::new();
    let mut targets: Vec<Target> = Vec::with_capacity(groups.len());
    for (table, members) in &groups {
        match operation {
            Operation::Insert => {
                // Members share a table, so this never fails.
                if let Ok(Some(sql)) = insert_many(members) {
                    parts.push(sql);
                }
            }
            Operation::Update => parts.extend(members.iter().map(|r| update(r))),
            Operation::Delete => parts.push(delete_many(table, members)),
        }
        targets.push(Target {
            table,
            rows: members.len(),
        });
    }

    Statement {
        sql: parts.join("; "),
        operation,
        targets,
    }
}
