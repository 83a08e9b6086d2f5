//! A typed, append-only, checkpointed tabular store over a remote
//! spreadsheet-like service.
//!
//! Rows produced by a long-running process are persisted in discrete,
//! resumable transactions: buffered inserts, reserved row positions and a
//! durable "last committed height" marker are committed together in one
//! atomic batched write against the backing service.

pub mod backend;
mod config;
mod database;
mod schema;
mod store;
mod writer;

pub use self::backend::memory::MemoryBackend;
pub use self::backend::{BackendError, SheetBackend};
pub use self::config::DatabaseOptions;
pub use self::database::{Database, DatabaseError, CHECKPOINT_UNSET};
pub use self::schema::{
    CellFormat,
    CellValue,
    Column,
    ColumnType,
    SchemaError,
    Table,
    TableBuilder,
    Value,
};
pub use self::store::{Store, StoreError, TableStore};
pub use self::writer::{Record, TableWriter};
