//! Per-transaction write buffering.
//!
//! A [TableWriter] accumulates typed records for one table within one
//! transaction and flattens them into row-major primitive data. Buffers
//! live exactly as long as the transaction that created them.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::schema::{CellValue, SchemaError, Table, Value};

#[derive(Debug, Clone, Default)]
/// A single record to be appended to a table.
///
/// Keys are column names, values are the typed form the column's
/// declared type will serialize at flush time. Nullable columns may be
/// omitted entirely.
pub struct Record {
    values: ahash::HashMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value, replacing any previous value for the column.
    pub fn set(
        mut self,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }
}

/// An append buffer for one table, scoped to one transaction.
///
/// Inserting is pure buffering and never fails, all schema checking is
/// deferred to [TableWriter::flush].
#[derive(Debug)]
pub struct TableWriter {
    table: Arc<Table>,
    records: Vec<Record>,
}

impl TableWriter {
    pub(crate) fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            records: Vec::new(),
        }
    }

    /// Buffers a single record.
    pub fn insert(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Buffers a batch of records, preserving their order.
    pub fn insert_many(&mut self, records: impl IntoIterator<Item = Record>) {
        self.records.extend(records);
    }

    /// Returns the number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records have been buffered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flattens the buffered records into row-major primitive data.
    ///
    /// Rows come out in insertion order, cells in the table's declared
    /// column order. Nullable columns that are absent or null become
    /// [CellValue::Null], a non-nullable column without a value fails
    /// with [SchemaError::MissingValue].
    ///
    /// Flushing is observational, the buffer is not drained.
    pub fn flush(&self) -> Result<Vec<Vec<CellValue>>, SchemaError> {
        let mut rows = Vec::with_capacity(self.records.len());

        for record in &self.records {
            for key in record.keys() {
                let known = self
                    .table
                    .columns()
                    .iter()
                    .any(|column| column.name() == key);
                if !known {
                    return Err(SchemaError::UnknownColumn {
                        column: key.to_string(),
                    });
                }
            }

            let mut row = Vec::with_capacity(self.table.columns().len());
            for column in self.table.columns() {
                let cell = match record.get(column.name()) {
                    None | Some(Value::Null) => {
                        if !column.nullable() {
                            return Err(SchemaError::MissingValue {
                                column: column.name().to_string(),
                            });
                        }
                        CellValue::Null
                    },
                    Some(value) => {
                        column.column_type().serialize(column.name(), value)?
                    },
                };
                row.push(cell);
            }
            rows.push(row);
        }

        Ok(rows)
    }
}

/// The set of per-table write buffers belonging to one transaction attempt.
///
/// Exclusively owned by the `transact` call that created it, the store
/// facade only holds shared handles into it.
pub(crate) struct Chunk {
    writers: ahash::HashMap<String, Arc<Mutex<TableWriter>>>,
}

impl Chunk {
    pub(crate) fn new(tables: &[Arc<Table>]) -> Self {
        let writers = tables
            .iter()
            .map(|table| {
                let writer = TableWriter::new(table.clone());
                (table.name().to_string(), Arc::new(Mutex::new(writer)))
            })
            .collect();

        Self { writers }
    }

    pub(crate) fn writer(&self, table: &str) -> Option<&Arc<Mutex<TableWriter>>> {
        self.writers.get(table)
    }

    pub(crate) fn iter(
        &self,
    ) -> impl Iterator<Item = (&str, &Arc<Mutex<TableWriter>>)> {
        self.writers.iter().map(|(name, writer)| (name.as_str(), writer))
    }
}
