use bon::Builder;

/// The default title of the dedicated checkpoint sheet.
pub const DEFAULT_CHECKPOINT_SHEET: &str = "_checkpoint";

/// The default row capacity new data sheets are created with.
pub const DEFAULT_ROW_CAPACITY: u32 = 1_000;

#[derive(Debug, Clone, Builder)]
/// Options that can be adjusted when opening a database.
///
/// These have sane defaults and only need touching when the storage
/// container is shared with something else that owns the default names.
pub struct DatabaseOptions {
    #[builder(into, default = DEFAULT_CHECKPOINT_SHEET.to_string())]
    /// The title of the reserved sheet holding the checkpoint cell.
    ///
    /// Must not collide with any declared table name.
    pub checkpoint_sheet: String,
    #[builder(default = DEFAULT_ROW_CAPACITY)]
    /// The row capacity new data sheets are created with.
    ///
    /// This is a creation-time hint for the backing service, sheets still
    /// grow through row reservation as rows are appended.
    pub row_capacity: u32,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}
