//! The checkpoint protocol.
//!
//! A [Database] ties schema migration, row reservation and the durable
//! checkpoint marker together so that appending rows behaves like an
//! atomic, resumable transaction on top of a service whose only strong
//! primitive is a single batched range write.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, info, instrument, trace};

use crate::backend::{
    a1,
    BackendError,
    CellRange,
    HeaderCell,
    RangeWrite,
    SheetBackend,
    SheetProperties,
    SheetRequest,
};
use crate::config::DatabaseOptions;
use crate::schema::{CellValue, SchemaError, Table};
use crate::store::Store;
use crate::writer::Chunk;

/// The sentinel checkpoint value of a store that has never committed.
///
/// Distinct from every valid height, which are zero or positive.
pub const CHECKPOINT_UNSET: i64 = -1;

#[derive(Debug, thiserror::Error)]
/// An error that can occur while driving the checkpoint protocol.
pub enum DatabaseError {
    #[error("backend error: {0}")]
    /// The backing service failed, surfaced verbatim. The enclosing
    /// operation is aborted, nothing is retried.
    Backend(#[from] BackendError),
    #[error("schema error: {0}")]
    /// A buffered record violated its table's schema at flush time.
    Schema(#[from] SchemaError),
    #[error("duplicate table name {0:?} in schema")]
    /// Two declared tables share a name.
    DuplicateTable(String),
    #[error("table name {0:?} collides with the checkpoint sheet")]
    /// A declared table uses the title reserved for the checkpoint sheet.
    ReservedTableName(String),
    #[error("checkpoint cell holds a non-integer value: {0:?}")]
    /// The checkpoint cell exists but cannot be parsed as a height.
    CorruptCheckpoint(String),
    #[error("row reservation reply for table {table:?} is missing its range marker")]
    /// The backing service acknowledged a row append without reporting
    /// where the row landed. A fatal integrity error, never retried.
    MissingRowIndex { table: String },
    #[error("transaction callback failed: {0}")]
    /// The caller's transaction callback returned an error. The
    /// transaction is aborted before any backing-service call is made.
    Callback(#[source] anyhow::Error),
}

/// An append-only, checkpointed tabular store over a remote spreadsheet
/// service.
///
/// The database assumes a single logical writer process at a time, the
/// protocol has no locking to enforce that. No call here retries or
/// times out internally, a hung backend call hangs the operation and any
/// failure aborts it wholesale, leaving the caller to retry the whole
/// height range.
pub struct Database {
    backend: Arc<dyn SheetBackend>,
    tables: Vec<Arc<Table>>,
    options: DatabaseOptions,
    last_committed: i64,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("tables", &self.tables)
            .field("options", &self.options)
            .field("last_committed", &self.last_committed)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Creates a database over the given backend and declared table set.
    ///
    /// The table set is fixed for the lifetime of the database, table
    /// names must be unique and must not collide with the checkpoint
    /// sheet title.
    pub fn new(
        backend: Arc<dyn SheetBackend>,
        tables: Vec<Table>,
        options: DatabaseOptions,
    ) -> Result<Self, DatabaseError> {
        let mut seen = ahash::HashSet::default();
        for table in &tables {
            if table.name() == options.checkpoint_sheet {
                return Err(DatabaseError::ReservedTableName(
                    table.name().to_string(),
                ));
            }
            if !seen.insert(table.name().to_string()) {
                return Err(DatabaseError::DuplicateTable(
                    table.name().to_string(),
                ));
            }
        }

        Ok(Self {
            backend,
            tables: tables.into_iter().map(Arc::new).collect(),
            options,
            last_committed: CHECKPOINT_UNSET,
        })
    }

    /// Returns the highest committed height, [CHECKPOINT_UNSET] before
    /// [Database::connect] or on a store that has never committed.
    pub fn checkpoint(&self) -> i64 {
        self.last_committed
    }

    #[instrument(skip(self))]
    /// Discovers or initialises the checkpoint, ensures every declared
    /// table exists remotely, and returns the checkpoint so the caller
    /// can resume from the right height.
    ///
    /// Safe to call repeatedly, existing sheets are never recreated.
    pub async fn connect(&mut self) -> Result<i64, DatabaseError> {
        let metadata = self.backend.sheet_metadata().await?;

        let checkpoint_exists = metadata
            .iter()
            .any(|p| p.title == self.options.checkpoint_sheet);
        if checkpoint_exists {
            self.last_committed = self.read_checkpoint().await?;
        } else {
            info!(
                sheet = %self.options.checkpoint_sheet,
                "Create checkpoint sheet"
            );
            self.backend
                .create_sheet(SheetProperties {
                    sheet_id: next_sheet_id(&metadata),
                    title: self.options.checkpoint_sheet.clone(),
                    row_count: 1,
                    column_count: 1,
                })
                .await?;
            self.last_committed = CHECKPOINT_UNSET;
        }

        self.migrate().await?;

        info!(checkpoint = self.last_committed, "Database connected");
        Ok(self.last_committed)
    }

    #[instrument(skip(self))]
    /// Creates the remote sheet and header row for every declared table
    /// not yet present, in one atomic multi-request call.
    ///
    /// Sheet identifiers are allocated explicitly from the live metadata,
    /// so repeated migrations are idempotent and identifier assignment is
    /// independent of table naming.
    pub async fn migrate(&mut self) -> Result<(), DatabaseError> {
        let metadata = self.backend.sheet_metadata().await?;
        let existing: ahash::HashSet<&str> =
            metadata.iter().map(|p| p.title.as_str()).collect();

        let missing: Vec<&Arc<Table>> = self
            .tables
            .iter()
            .filter(|table| !existing.contains(table.name()))
            .collect();
        if missing.is_empty() {
            trace!("All declared tables already exist");
            return Ok(());
        }

        let mut next_id = next_sheet_id(&metadata);
        let mut requests = Vec::with_capacity(missing.len() * 2);
        for table in missing {
            info!(table = table.name(), sheet_id = next_id, "Create table sheet");
            requests.push(SheetRequest::AddSheet(SheetProperties {
                sheet_id: next_id,
                title: table.name().to_string(),
                row_count: self.options.row_capacity,
                column_count: table.columns().len() as u32,
            }));
            requests.push(SheetRequest::WriteHeader {
                sheet: table.name().to_string(),
                cells: table
                    .columns()
                    .iter()
                    .map(|column| HeaderCell {
                        text: column.name().to_string(),
                        format: column.column_type().format(),
                    })
                    .collect(),
            });
            next_id += 1;
        }

        self.backend.batch_update(requests).await?;
        Ok(())
    }

    #[instrument(skip(self, callback))]
    /// Runs one transaction covering the external height range
    /// `from..=to`.
    ///
    /// The callback receives a [Store] and may insert any number of
    /// records into any subset of tables. Once it returns, a blank row is
    /// reserved in every declared table, all buffers are flushed, and a
    /// single atomic batched write commits the data together with the
    /// checkpoint cell set to `to`. Only then is the in-memory checkpoint
    /// advanced.
    ///
    /// On any failure the store is closed, the in-memory checkpoint is
    /// left unchanged and the error propagates, the whole height range is
    /// the unit of retry. Rows reserved before a failure remain as blank
    /// gaps, they are never reused.
    ///
    /// `from` is recorded for observability only, it is not validated
    /// against the current checkpoint. That bookkeeping belongs to the
    /// caller.
    pub async fn transact<F, Fut>(
        &mut self,
        from: i64,
        to: i64,
        callback: F,
    ) -> Result<(), DatabaseError>
    where
        F: FnOnce(Store) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let chunk = Chunk::new(&self.tables);
        let open = Arc::new(AtomicBool::new(true));
        let store = Store::new(&chunk, open.clone());

        let result = self.run_transaction(to, &chunk, callback(store)).await;

        // The store settles with the transaction, success or failure.
        open.store(false, Ordering::Release);

        if result.is_ok() {
            self.last_committed = to;
            debug!(checkpoint = to, "Transaction committed");
        }
        result
    }

    async fn run_transaction(
        &self,
        to: i64,
        chunk: &Chunk,
        callback: impl Future<Output = anyhow::Result<()>>,
    ) -> Result<(), DatabaseError> {
        callback.await.map_err(DatabaseError::Callback)?;

        // Reserve the next free row in every declared table. The
        // reservations run concurrently but all of them must land before
        // the batched write below is issued.
        let reservations = self.tables.iter().map(|table| {
            let backend = self.backend.clone();
            async move {
                let reply = backend
                    .append_row(table.name(), table.columns().len() as u32)
                    .await?;
                let row = reply
                    .updated_range
                    .as_deref()
                    .and_then(a1::append_row_index)
                    .ok_or_else(|| DatabaseError::MissingRowIndex {
                        table: table.name().to_string(),
                    })?;
                trace!(table = table.name(), row, "Reserved row");
                Ok::<_, DatabaseError>((table, row))
            }
        });
        let reserved = try_join_all(reservations).await?;

        let mut writes = Vec::with_capacity(reserved.len() + 1);
        for (table, start_row) in reserved {
            let writer = chunk
                .writer(table.name())
                .expect("Chunk holds a writer for every declared table");
            let rows = writer.lock().flush()?;
            if rows.is_empty() {
                continue;
            }

            let range = CellRange {
                sheet: table.name().to_string(),
                start_row,
                start_column: 1,
                end_row: start_row + rows.len() as u32 - 1,
                end_column: table.columns().len() as u32,
            };
            debug!(
                table = table.name(),
                rows = rows.len(),
                range = %range.to_a1(),
                "Stage table write"
            );
            writes.push(RangeWrite {
                range,
                values: rows,
            });
        }

        writes.push(RangeWrite {
            range: self.checkpoint_cell(),
            values: vec![vec![CellValue::Number(to as f64)]],
        });

        self.backend.batch_write(writes).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    /// Records progress past a height range that produced no rows.
    ///
    /// A no-op when `height` already equals the in-memory checkpoint, no
    /// backing-service call is issued in that case.
    pub async fn advance(&mut self, height: i64) -> Result<(), DatabaseError> {
        if height == self.last_committed {
            trace!("Checkpoint already at height");
            return Ok(());
        }

        self.backend
            .write_range(RangeWrite {
                range: self.checkpoint_cell(),
                values: vec![vec![CellValue::Number(height as f64)]],
            })
            .await?;
        self.last_committed = height;

        debug!(checkpoint = height, "Checkpoint advanced");
        Ok(())
    }

    async fn read_checkpoint(&self) -> Result<i64, DatabaseError> {
        let values = self.backend.read_range(&self.checkpoint_cell()).await?;
        let cell = values
            .first()
            .and_then(|row| row.first())
            .cloned()
            .unwrap_or(CellValue::Null);
        parse_checkpoint(&cell)
    }

    fn checkpoint_cell(&self) -> CellRange {
        CellRange::cell(self.options.checkpoint_sheet.clone(), 1, 1)
    }
}

fn next_sheet_id(metadata: &[SheetProperties]) -> u32 {
    metadata
        .iter()
        .map(|p| p.sheet_id)
        .max()
        .map(|id| id + 1)
        .unwrap_or(0)
}

fn parse_checkpoint(cell: &CellValue) -> Result<i64, DatabaseError> {
    match cell {
        CellValue::Null => Ok(CHECKPOINT_UNSET),
        CellValue::Text(s) if s.trim().is_empty() => Ok(CHECKPOINT_UNSET),
        CellValue::Number(n) if n.fract() == 0.0 => Ok(*n as i64),
        CellValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| DatabaseError::CorruptCheckpoint(s.clone())),
        other => Err(DatabaseError::CorruptCheckpoint(format!("{other:?}"))),
    }
}
