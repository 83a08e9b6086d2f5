//! The schema layer declares what a table looks like and how typed values
//! are turned into the primitive cell form the backing service accepts.
//!
//! Tables are built once at schema-definition time and never mutated, the
//! declared column order fixes both the serialization order of every row
//! and the remote sheet layout.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
/// An error raised when a record does not satisfy the schema it is
/// being flushed against.
pub enum SchemaError {
    #[error("column {column:?} expects a {expected} value, got {found}")]
    /// A value passed to an insert does not match the column's declared type.
    ///
    /// The schema layer never coerces, a mismatched shape always fails.
    TypeMismatch {
        column: String,
        expected: ColumnType,
        found: &'static str,
    },
    #[error("column {column:?} is not nullable but no value was provided")]
    /// A non-nullable column was absent or null at flush time.
    MissingValue { column: String },
    #[error("record references unknown column {column:?}")]
    /// A record carries a key that names no declared column.
    UnknownColumn { column: String },
    #[error("duplicate column name {column:?} in table {table:?}")]
    /// Two columns in one table share a name.
    DuplicateColumn { table: String, column: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// The primitive form a cell takes on the wire.
///
/// This is the only shape the backing service understands, everything
/// richer is serialized down to it by a [ColumnType].
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Converts a JSON value into a cell primitive.
    ///
    /// Returns `None` for arrays and objects, which have no cell form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(v) => Some(Self::Bool(*v)),
            serde_json::Value::Number(v) => v.as_f64().map(Self::Number),
            serde_json::Value::String(v) => Some(Self::Text(v.clone())),
            _ => None,
        }
    }
}

impl From<CellValue> for serde_json::Value {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(v) => serde_json::Value::Bool(v),
            CellValue::Number(v) => serde_json::Number::from_f64(v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Text(v) => serde_json::Value::String(v),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// A hint describing how the backing cell should be displayed.
///
/// Hints are written alongside the header row, they never affect
/// serialization correctness.
pub enum CellFormat {
    Text,
    Number,
    Bool,
    DateTime,
}

#[derive(Debug, Clone, PartialEq)]
/// A typed value as provided by the caller when inserting a record.
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    DateTime(DateTime<Utc>),
}

impl Value {
    /// The shape of the value, used for error messages.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::DateTime(_) => "date-time",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            None => Self::Null,
            Some(v) => v.into(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// The declared type of a column.
///
/// A column type is a pure serialization contract: it turns a matching
/// [Value] into its [CellValue] primitive and rejects everything else.
pub enum ColumnType {
    Numeric,
    Text,
    Bool,
    DateTime,
}

impl ColumnType {
    /// The format hint written into the column's header cell.
    pub fn format(&self) -> CellFormat {
        match self {
            ColumnType::Numeric => CellFormat::Number,
            ColumnType::Text => CellFormat::Text,
            ColumnType::Bool => CellFormat::Bool,
            ColumnType::DateTime => CellFormat::DateTime,
        }
    }

    /// Serializes a typed value into its primitive cell form.
    ///
    /// Fails with [SchemaError::TypeMismatch] on any value whose runtime
    /// shape does not match the column type, nulls are handled by the
    /// caller before serialization.
    pub fn serialize(
        &self,
        column: &str,
        value: &Value,
    ) -> Result<CellValue, SchemaError> {
        match (self, value) {
            (ColumnType::Numeric, Value::Number(v)) => Ok(CellValue::Number(*v)),
            (ColumnType::Text, Value::Text(v)) => Ok(CellValue::Text(v.clone())),
            (ColumnType::Bool, Value::Bool(v)) => Ok(CellValue::Bool(*v)),
            (ColumnType::DateTime, Value::DateTime(v)) => {
                Ok(CellValue::Text(v.to_rfc3339()))
            },
            (expected, value) => Err(SchemaError::TypeMismatch {
                column: column.to_string(),
                expected: *expected,
                found: value.kind(),
            }),
        }
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Text => "text",
            ColumnType::Bool => "bool",
            ColumnType::DateTime => "date-time",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A single named, typed column within a table.
pub struct Column {
    name: String,
    column_type: ColumnType,
    nullable: bool,
}

impl Column {
    /// Returns the name of the column.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type of the column.
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Returns whether the column accepts null or absent values.
    pub fn nullable(&self) -> bool {
        self.nullable
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A named, ordered set of columns.
///
/// The column order is the single source of truth for both the
/// serialization order of every buffered row and the remote sheet layout,
/// it must never change once rows exist.
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    /// Starts building a table with the given name.
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Returns the name of the table, which is also the remote sheet title.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

/// Builder for a [Table].
///
/// Columns are laid out in the order they are declared.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
}

impl TableBuilder {
    /// Adds a non-nullable column.
    pub fn column(
        mut self,
        name: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        self.columns.push(Column {
            name: name.into(),
            column_type,
            nullable: false,
        });
        self
    }

    /// Adds a nullable column.
    pub fn nullable_column(
        mut self,
        name: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        self.columns.push(Column {
            name: name.into(),
            column_type,
            nullable: true,
        });
        self
    }

    /// Finalises the table, rejecting duplicate column names.
    pub fn build(self) -> Result<Table, SchemaError> {
        let mut seen = ahash::HashSet::default();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name,
                    column: column.name.clone(),
                });
            }
        }

        Ok(Table {
            name: self.name,
            columns: self.columns,
        })
    }
}
