//! The seam between the store and the remote tabular service.
//!
//! Everything the checkpoint protocol needs from the backing service is
//! expressed as the [SheetBackend] trait. Real deployments implement it
//! over their transport of choice, the protocol itself never sees
//! anything below these operations. [memory::MemoryBackend] is a complete
//! in-process implementation used by the protocol tests.

pub mod a1;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::schema::{CellFormat, CellValue};

#[derive(Debug, thiserror::Error)]
/// An error raised by a backing service implementation.
pub enum BackendError {
    #[error("sheet not found: {0:?}")]
    /// The referenced sheet does not exist in the storage container.
    SheetNotFound(String),
    #[error("sheet already exists: {0:?}")]
    /// A sheet with the given title already exists.
    SheetAlreadyExists(String),
    #[error("invalid range: {0}")]
    /// A range did not describe a usable rectangle of cells.
    InvalidRange(String),
    #[error("transport error: {0}")]
    /// An opaque failure from the transport, surfaced verbatim.
    Transport(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// The identity and capacity of one remote sheet.
pub struct SheetProperties {
    /// The numeric sheet identifier, assigned explicitly at creation.
    pub sheet_id: u32,
    /// The sheet's display name. Tables are matched to sheets by title.
    pub title: String,
    /// The row capacity the sheet was created with.
    pub row_count: u32,
    /// The column capacity the sheet was created with.
    pub column_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A rectangular cell range within one sheet.
///
/// Rows and columns are 1-based and both bounds are inclusive, matching
/// the A1 notation the backing service speaks.
pub struct CellRange {
    pub sheet: String,
    pub start_row: u32,
    pub start_column: u32,
    pub end_row: u32,
    pub end_column: u32,
}

impl CellRange {
    /// A range covering a single cell.
    pub fn cell(sheet: impl Into<String>, row: u32, column: u32) -> Self {
        Self {
            sheet: sheet.into(),
            start_row: row,
            start_column: column,
            end_row: row,
            end_column: column,
        }
    }

    /// Renders the range in A1 notation, e.g. `'my table'!A2:C5`.
    pub fn to_a1(&self) -> String {
        a1::format_range(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One independent range write within a batched update.
pub struct RangeWrite {
    pub range: CellRange,
    /// Row-major values sized exactly to the range.
    pub values: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A header cell carrying a column name and its display format hint.
pub struct HeaderCell {
    pub text: String,
    pub format: CellFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A single structural request within an atomic [SheetBackend::batch_update].
pub enum SheetRequest {
    /// Create a new sheet with the given properties.
    AddSheet(SheetProperties),
    /// Write the header row of a sheet, one cell per column.
    WriteHeader {
        sheet: String,
        cells: Vec<HeaderCell>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// The backing service's reply to a row append.
///
/// A well-behaved service reports the A1 range the blank row landed on,
/// the protocol treats a missing marker as a fatal integrity error.
pub struct AppendReply {
    pub updated_range: Option<String>,
}

#[async_trait]
/// The operations the checkpoint protocol requires from the backing
/// tabular service.
///
/// All calls are asynchronous network operations, nothing here is retried
/// or timed out. [SheetBackend::batch_write] is the only call the
/// protocol relies on for atomicity, and that atomicity is a property of
/// the service itself.
pub trait SheetBackend: Send + Sync {
    /// Lists the properties of every sheet in the storage container.
    async fn sheet_metadata(&self) -> Result<Vec<SheetProperties>, BackendError>;

    /// Creates a single new sheet.
    async fn create_sheet(
        &self,
        properties: SheetProperties,
    ) -> Result<(), BackendError>;

    /// Applies a batch of structural requests atomically in one call.
    async fn batch_update(
        &self,
        requests: Vec<SheetRequest>,
    ) -> Result<(), BackendError>;

    /// Reads the raw values of a cell range.
    async fn read_range(
        &self,
        range: &CellRange,
    ) -> Result<Vec<Vec<CellValue>>, BackendError>;

    /// Writes the raw values of a single cell range.
    async fn write_range(&self, write: RangeWrite) -> Result<(), BackendError>;

    /// Appends one blank row of the given width to a sheet and reports
    /// where it landed.
    async fn append_row(
        &self,
        sheet: &str,
        width: u32,
    ) -> Result<AppendReply, BackendError>;

    /// Applies a batch of independent range writes atomically in one call.
    async fn batch_write(
        &self,
        writes: Vec<RangeWrite>,
    ) -> Result<(), BackendError>;
}
