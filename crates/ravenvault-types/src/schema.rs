//! Compile-time column schema shared by the store, the query builder, and
//! the migration tool.
//!
//! Every entity kind describes itself through [`Entity`]: a table name, a
//! fully-qualified name used for snapshot files, an ordered column list, and
//! the values of one row in the same order. Foreign-key "lookup groups" are
//! declared as plain function pointers so the store builds its secondary
//! indices without any runtime reflection.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Name of the primary-key column every entity table carries.
pub const KEY_COLUMN: &str = "Id";

/// A persisted record kind with a UUID primary key.
///
/// Implementations list their columns in [`COLUMNS`](Entity::COLUMNS) with the
/// primary key first, and [`values`](Entity::values) must return exactly one
/// value per column in the same order.
pub trait Entity:
    Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Table name, also used as the short kind name in logs.
    const KIND: &'static str;

    /// Fully-qualified kind name. Snapshot files are named `<QUALIFIED_NAME>.json`.
    const QUALIFIED_NAME: &'static str;

    /// Ordered column names. The first entry is [`KEY_COLUMN`].
    const COLUMNS: &'static [&'static str];

    /// Named foreign-key extractors used to build secondary indices.
    const LOOKUP_GROUPS: &'static [LookupGroup<Self>] = &[];

    /// The primary key of this record.
    fn key(&self) -> Uuid;

    /// Column values in [`COLUMNS`](Entity::COLUMNS) order.
    fn values(&self) -> Vec<SqlValue>;

    /// Flatten this record into a table row.
    fn to_row(&self) -> Row {
        Row {
            table: Self::KIND,
            columns: Self::COLUMNS,
            key: self.key(),
            values: self.values(),
        }
    }
}

/// A named secondary index over one entity kind, keyed by a foreign key.
///
/// The extractor returns `None` when the record does not qualify for the
/// group (for example a nullable foreign key that is unset).
pub struct LookupGroup<E> {
    /// Group name used by callers, e.g. `"User"` or `"Character"`.
    pub name: &'static str,
    /// Foreign-key extractor.
    pub key: fn(&E) -> Option<Uuid>,
}

impl<E> LookupGroup<E> {
    /// Declare a lookup group.
    pub const fn new(name: &'static str, key: fn(&E) -> Option<Uuid>) -> Self {
        Self { name, key }
    }

    /// Extract the group key from a record.
    pub fn key_of(&self, entity: &E) -> Option<Uuid> {
        (self.key)(entity)
    }
}

impl<E> Clone for LookupGroup<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for LookupGroup<E> {}

impl<E> core::fmt::Debug for LookupGroup<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LookupGroup").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A single column value, tagged with how it must be rendered as SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Free text.
    Text(String),
    /// A single character.
    Char(char),
    /// A UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// A 128-bit identifier.
    Uuid(Uuid),
    /// An enumeration, stored as its underlying integer.
    Enum(i64),
    /// A whole number.
    Integer(i64),
    /// A floating-point number.
    Float(f64),
    /// A fixed-point decimal (prices).
    Decimal(Decimal),
    /// A boolean flag.
    Bool(bool),
    /// An optional boolean flag. An absent value is stored as `0`.
    OptionalBool(Option<bool>),
    /// Raw bytes. No column type is mapped for this variant; it is written
    /// as `NULL`.
    Binary(Vec<u8>),
}

impl SqlValue {
    /// Convert an optional value, mapping `None` to [`SqlValue::Null`].
    pub fn nullable<T: Into<Self>>(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }

    /// Whether this value is [`SqlValue::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<char> for SqlValue {
    fn from(value: char) -> Self {
        Self::Char(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One table row, detached from its entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Destination table.
    pub table: &'static str,
    /// Column names, primary key first.
    pub columns: &'static [&'static str],
    /// Primary key value.
    pub key: Uuid,
    /// Values in column order.
    pub values: Vec<SqlValue>,
}

/// The kind of write a dirty row needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// The row does not exist in the database yet.
    Insert,
    /// The row exists and may have changed.
    Update,
    /// The row must be deleted.
    Delete,
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Type-erased descriptor of an entity kind.
///
/// Lets snapshot and migration code turn a JSON array of records into table
/// rows without knowing the concrete Rust type.
#[derive(Debug, Clone, Copy)]
pub struct EntityKind {
    name: &'static str,
    qualified_name: &'static str,
    columns: &'static [&'static str],
    rows_from_json: fn(&serde_json::Value) -> Result<Vec<Row>, serde_json::Error>,
}

impl EntityKind {
    /// Describe the kind `E`.
    pub fn of<E: Entity>() -> Self {
        Self {
            name: E::KIND,
            qualified_name: E::QUALIFIED_NAME,
            columns: E::COLUMNS,
            rows_from_json: rows_from_json::<E>,
        }
    }

    /// Table name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Fully-qualified kind name.
    pub const fn qualified_name(&self) -> &'static str {
        self.qualified_name
    }

    /// Column names, primary key first.
    pub const fn columns(&self) -> &'static [&'static str] {
        self.columns
    }

    /// Snapshot file name for this kind.
    pub fn file_name(&self) -> String {
        snapshot_file_name(self.qualified_name)
    }

    /// Decode a JSON array of records of this kind into rows.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if `json` is not an array of valid records.
    pub fn rows(&self, json: &serde_json::Value) -> Result<Vec<Row>, serde_json::Error> {
        (self.rows_from_json)(json)
    }
}

/// File name of a kind's snapshot file: `<qualified name>.json`.
pub fn snapshot_file_name(qualified_name: &str) -> String {
    format!("{qualified_name}.json")
}

fn rows_from_json<E: Entity>(json: &serde_json::Value) -> Result<Vec<Row>, serde_json::Error> {
    let records = Vec::<E>::deserialize(json)?;
    Ok(records.iter().map(Entity::to_row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullable_maps_none_to_null() {
        assert!(SqlValue::nullable::<String>(None).is_null());
        assert_eq!(
            SqlValue::nullable(Some("x")),
            SqlValue::Text("x".to_owned())
        );
    }

    #[test]
    fn snapshot_file_name_appends_json() {
        assert_eq!(
            snapshot_file_name("ravenvault.entities.User"),
            "ravenvault.entities.User.json"
        );
    }

    #[test]
    fn operation_display_is_lowercase() {
        assert_eq!(Operation::Insert.to_string(), "insert");
        assert_eq!(Operation::Delete.to_string(), "delete");
    }
}
