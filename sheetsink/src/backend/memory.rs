//! A complete in-process [SheetBackend] implementation.
//!
//! Used as the fixture for the protocol tests, it keeps per-operation
//! call counters so tests can assert exactly which calls a code path
//! issued, including that a path issued none at all.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::backend::{
    a1,
    AppendReply,
    BackendError,
    CellRange,
    RangeWrite,
    SheetBackend,
    SheetProperties,
    SheetRequest,
};
use crate::schema::{CellFormat, CellValue};

#[derive(Debug, Default)]
/// An in-memory backing service holding a single storage container.
pub struct MemoryBackend {
    state: RwLock<State>,
    counters: OpCounters,
}

#[derive(Debug, Default)]
struct State {
    sheets: Vec<MemorySheet>,
}

impl State {
    fn sheet(&self, title: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|s| s.properties.title == title)
    }

    fn sheet_mut(&mut self, title: &str) -> Result<&mut MemorySheet, BackendError> {
        self.sheets
            .iter_mut()
            .find(|s| s.properties.title == title)
            .ok_or_else(|| BackendError::SheetNotFound(title.to_string()))
    }

    fn add_sheet(&mut self, properties: SheetProperties) -> Result<(), BackendError> {
        if self.sheet(&properties.title).is_some() {
            return Err(BackendError::SheetAlreadyExists(properties.title));
        }

        self.sheets.push(MemorySheet {
            properties,
            rows: Vec::new(),
            header_formats: Vec::new(),
        });
        Ok(())
    }

    fn validate_write(&self, write: &RangeWrite) -> Result<(), BackendError> {
        let range = &write.range;
        if self.sheet(&range.sheet).is_none() {
            return Err(BackendError::SheetNotFound(range.sheet.clone()));
        }
        if range.end_row < range.start_row || range.end_column < range.start_column {
            return Err(BackendError::InvalidRange(range.to_a1()));
        }

        let height = (range.end_row - range.start_row + 1) as usize;
        let width = (range.end_column - range.start_column + 1) as usize;
        if write.values.len() != height
            || write.values.iter().any(|row| row.len() != width)
        {
            return Err(BackendError::InvalidRange(format!(
                "values do not fit {}",
                range.to_a1()
            )));
        }

        Ok(())
    }

    fn apply_write(&mut self, write: RangeWrite) -> Result<(), BackendError> {
        self.validate_write(&write)?;

        let range = &write.range;
        let sheet = self.sheet_mut(&range.sheet)?;
        for (offset, values) in write.values.into_iter().enumerate() {
            let row_index = range.start_row as usize - 1 + offset;
            if sheet.rows.len() <= row_index {
                sheet.rows.resize(row_index + 1, Vec::new());
            }

            let row = &mut sheet.rows[row_index];
            let end = range.end_column as usize;
            if row.len() < end {
                row.resize(end, CellValue::Null);
            }

            let start = range.start_column as usize - 1;
            row[start..end].clone_from_slice(&values);
        }

        Ok(())
    }
}

#[derive(Debug)]
struct MemorySheet {
    properties: SheetProperties,
    rows: Vec<Vec<CellValue>>,
    header_formats: Vec<CellFormat>,
}

#[derive(Debug, Default)]
struct OpCounters {
    sheet_metadata: AtomicU64,
    create_sheet: AtomicU64,
    batch_update: AtomicU64,
    read_range: AtomicU64,
    write_range: AtomicU64,
    append_row: AtomicU64,
    batch_write: AtomicU64,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// A snapshot of how many times each backend operation has been called.
pub struct CallCounts {
    pub sheet_metadata: u64,
    pub create_sheet: u64,
    pub batch_update: u64,
    pub read_range: u64,
    pub write_range: u64,
    pub append_row: u64,
    pub batch_write: u64,
}

impl CallCounts {
    /// The total number of calls that mutate remote state.
    pub fn writes(&self) -> u64 {
        self.create_sheet
            + self.batch_update
            + self.write_range
            + self.append_row
            + self.batch_write
    }
}

impl MemoryBackend {
    /// Creates an empty storage container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the per-operation call counters.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            sheet_metadata: self.counters.sheet_metadata.load(Ordering::Relaxed),
            create_sheet: self.counters.create_sheet.load(Ordering::Relaxed),
            batch_update: self.counters.batch_update.load(Ordering::Relaxed),
            read_range: self.counters.read_range.load(Ordering::Relaxed),
            write_range: self.counters.write_range.load(Ordering::Relaxed),
            append_row: self.counters.append_row.load(Ordering::Relaxed),
            batch_write: self.counters.batch_write.load(Ordering::Relaxed),
        }
    }

    /// Returns the number of materialised rows in a sheet, header included.
    pub fn row_count(&self, sheet: &str) -> Option<usize> {
        self.state.read().sheet(sheet).map(|s| s.rows.len())
    }

    /// Returns a copy of all materialised rows in a sheet.
    pub fn rows(&self, sheet: &str) -> Option<Vec<Vec<CellValue>>> {
        self.state.read().sheet(sheet).map(|s| s.rows.clone())
    }

    /// Returns the header format hints recorded for a sheet.
    pub fn header_formats(&self, sheet: &str) -> Option<Vec<CellFormat>> {
        self.state
            .read()
            .sheet(sheet)
            .map(|s| s.header_formats.clone())
    }

    /// Returns the properties a sheet was created with.
    pub fn sheet_properties(&self, sheet: &str) -> Option<SheetProperties> {
        self.state.read().sheet(sheet).map(|s| s.properties.clone())
    }
}

#[async_trait]
impl SheetBackend for MemoryBackend {
    async fn sheet_metadata(&self) -> Result<Vec<SheetProperties>, BackendError> {
        self.counters.sheet_metadata.fetch_add(1, Ordering::Relaxed);

        let state = self.state.read();
        Ok(state.sheets.iter().map(|s| s.properties.clone()).collect())
    }

    async fn create_sheet(
        &self,
        properties: SheetProperties,
    ) -> Result<(), BackendError> {
        self.counters.create_sheet.fetch_add(1, Ordering::Relaxed);
        self.state.write().add_sheet(properties)
    }

    async fn batch_update(
        &self,
        requests: Vec<SheetRequest>,
    ) -> Result<(), BackendError> {
        self.counters.batch_update.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write();

        // Validate the whole batch before touching anything so the call
        // stays all-or-nothing.
        let mut pending_titles = Vec::new();
        for request in &requests {
            match request {
                SheetRequest::AddSheet(properties) => {
                    let exists = state.sheet(&properties.title).is_some()
                        || pending_titles.contains(&properties.title);
                    if exists {
                        return Err(BackendError::SheetAlreadyExists(
                            properties.title.clone(),
                        ));
                    }
                    pending_titles.push(properties.title.clone());
                },
                SheetRequest::WriteHeader { sheet, .. } => {
                    let exists = state.sheet(sheet).is_some()
                        || pending_titles.contains(sheet);
                    if !exists {
                        return Err(BackendError::SheetNotFound(sheet.clone()));
                    }
                },
            }
        }

        for request in requests {
            match request {
                SheetRequest::AddSheet(properties) => {
                    state.add_sheet(properties)?;
                },
                SheetRequest::WriteHeader { sheet, cells } => {
                    let sheet = state.sheet_mut(&sheet)?;
                    sheet.header_formats =
                        cells.iter().map(|c| c.format).collect();
                    let header = cells
                        .into_iter()
                        .map(|c| CellValue::Text(c.text))
                        .collect();
                    if sheet.rows.is_empty() {
                        sheet.rows.push(header);
                    } else {
                        sheet.rows[0] = header;
                    }
                },
            }
        }

        Ok(())
    }

    async fn read_range(
        &self,
        range: &CellRange,
    ) -> Result<Vec<Vec<CellValue>>, BackendError> {
        self.counters.read_range.fetch_add(1, Ordering::Relaxed);

        let state = self.state.read();
        let sheet = state
            .sheet(&range.sheet)
            .ok_or_else(|| BackendError::SheetNotFound(range.sheet.clone()))?;

        let mut out = Vec::new();
        for row in range.start_row..=range.end_row {
            let mut cells = Vec::new();
            for column in range.start_column..=range.end_column {
                let cell = sheet
                    .rows
                    .get(row as usize - 1)
                    .and_then(|r| r.get(column as usize - 1))
                    .cloned()
                    .unwrap_or(CellValue::Null);
                cells.push(cell);
            }
            out.push(cells);
        }

        Ok(out)
    }

    async fn write_range(&self, write: RangeWrite) -> Result<(), BackendError> {
        self.counters.write_range.fetch_add(1, Ordering::Relaxed);
        self.state.write().apply_write(write)
    }

    async fn append_row(
        &self,
        sheet: &str,
        width: u32,
    ) -> Result<AppendReply, BackendError> {
        self.counters.append_row.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write();
        let sheet = state.sheet_mut(sheet)?;

        sheet
            .rows
            .push(vec![CellValue::Null; width.max(1) as usize]);
        let row = sheet.rows.len() as u32;

        let range = CellRange {
            sheet: sheet.properties.title.clone(),
            start_row: row,
            start_column: 1,
            end_row: row,
            end_column: width.max(1),
        };
        Ok(AppendReply {
            updated_range: Some(a1::format_range(&range)),
        })
    }

    async fn batch_write(
        &self,
        writes: Vec<RangeWrite>,
    ) -> Result<(), BackendError> {
        self.counters.batch_write.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write();

        // All-or-nothing: refuse the whole batch if any write is unusable.
        for write in &writes {
            state.validate_write(write)?;
        }

        for write in writes {
            state.apply_write(write)?;
        }

        Ok(())
    }
}
