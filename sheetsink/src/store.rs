//! The restricted per-transaction view handed to caller logic.
//!
//! A [Store] exposes one capability handle per declared table, resolved
//! once at construction. The handles only allow appending records, the
//! underlying buffers and the commit machinery stay out of reach.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::writer::{Chunk, Record, TableWriter};

#[derive(Debug, thiserror::Error)]
/// An error raised by the per-transaction store facade.
pub enum StoreError {
    #[error("store is closed, its transaction has already settled")]
    /// The store was used after its owning transaction completed,
    /// successfully or not. Nothing was buffered or sent.
    Closed,
    #[error("unknown table {0:?}")]
    /// The requested table is not part of the declared schema.
    UnknownTable(String),
}

#[derive(Clone)]
/// A write-only view over the tables of one in-flight transaction.
///
/// The store stays usable only while its transaction is running, any use
/// after the transaction settles fails with [StoreError::Closed]. This is
/// the only guard against a caller retaining the store across transaction
/// boundaries.
pub struct Store {
    tables: ahash::HashMap<String, TableStore>,
    open: Arc<AtomicBool>,
}

impl Store {
    pub(crate) fn new(chunk: &Chunk, open: Arc<AtomicBool>) -> Self {
        let tables = chunk
            .iter()
            .map(|(name, writer)| {
                let handle = TableStore {
                    writer: writer.clone(),
                    open: open.clone(),
                };
                (name.to_string(), handle)
            })
            .collect();

        Self { tables, open }
    }

    /// Returns the insert handle for the given table.
    pub fn table(&self, name: &str) -> Result<&TableStore, StoreError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }

        self.tables
            .get(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }
}

#[derive(Clone, Debug)]
/// The insert capability for a single table within one transaction.
pub struct TableStore {
    writer: Arc<Mutex<TableWriter>>,
    open: Arc<AtomicBool>,
}

impl TableStore {
    /// Buffers a single record for the table.
    pub fn insert(&self, record: Record) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.writer.lock().insert(record);
        Ok(())
    }

    /// Buffers a batch of records for the table, preserving their order.
    pub fn insert_many(&self, records: Vec<Record>) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.writer.lock().insert_many(records);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, Table};

    fn chunk_and_store() -> (Chunk, Store, Arc<AtomicBool>) {
        let tables = vec![Arc::new(
            Table::builder("blocks")
                .column("id", ColumnType::Numeric)
                .build()
                .expect("Build table"),
        )];
        let chunk = Chunk::new(&tables);
        let open = Arc::new(AtomicBool::new(true));
        let store = Store::new(&chunk, open.clone());
        (chunk, store, open)
    }

    #[test]
    fn test_insert_reaches_chunk_writer() {
        let (chunk, store, _open) = chunk_and_store();

        let blocks = store.table("blocks").expect("Resolve table handle");
        blocks
            .insert(Record::new().set("id", 1_i64))
            .expect("Insert record");
        blocks
            .insert_many(vec![
                Record::new().set("id", 2_i64),
                Record::new().set("id", 3_i64),
            ])
            .expect("Insert records");

        let writer = chunk.writer("blocks").expect("Writer exists");
        assert_eq!(writer.lock().len(), 3);
    }

    #[test]
    fn test_unknown_table_is_rejected() {
        let (_chunk, store, _open) = chunk_and_store();

        let err = store
            .table("missing")
            .expect_err("Unknown table should be rejected");
        assert!(matches!(err, StoreError::UnknownTable(_)));
    }

    #[test]
    fn test_closed_store_rejects_all_access() {
        let (chunk, store, open) = chunk_and_store();
        let blocks = store.table("blocks").expect("Resolve table handle").clone();

        open.store(false, Ordering::Release);

        let err = blocks
            .insert(Record::new().set("id", 1_i64))
            .expect_err("Closed store should reject inserts");
        assert!(matches!(err, StoreError::Closed));

        let err = store
            .table("blocks")
            .expect_err("Closed store should reject table lookup");
        assert!(matches!(err, StoreError::Closed));

        let writer = chunk.writer("blocks").expect("Writer exists");
        assert_eq!(writer.lock().len(), 0, "No buffer mutation after close");
    }
}
