//! Record store adapter
//!
//! The rest of the crate talks to the tabular store through [`RecordStore`]:
//! download every row of a tab as records, and write single cells addressed by
//! physical (row, column). [`WorkbookStore`] implements it over a local
//! workbook file.

use crate::columns::{ColumnMap, SchemaError};
use crate::record::{CellValue, Table};
use crate::saving::{load_workbook, save_workbook};
use crate::workbook::{Workbook, cell_name};
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Physical rows between a 0-based record position and its sheet row: the
/// header occupies row 1 and sheet rows are 1-based.
pub const ROW_OFFSET: usize = 2;

/// Sheet row holding the record at `position` in the loaded sequence
pub fn physical_row(position: usize) -> usize {
    position + ROW_OFFSET
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The resource, workbook or tab cannot be reached; fatal for the interaction
    #[error("connection error: {0}")]
    Connection(String),

    /// A single cell write failed
    #[error("write to row {row}, column {column} failed: {reason}")]
    Write {
        row: usize,
        column: usize,
        reason: String,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Load/update contract of the tabular store
pub trait RecordStore {
    /// Fetch every row of the tab, in stored order, keyed by header
    fn load(&mut self) -> Result<Table, StoreError>;

    /// Write one cell; `row` and `column` are 1-based physical positions
    fn update_field(&mut self, row: usize, column: usize, value: &str) -> Result<(), StoreError>;
}

/// Load a tab and check its header row against `columns`
///
/// Returns the records together with the column map bound to the sheet's own
/// header spellings.
pub fn load_checked<S: RecordStore + ?Sized>(
    store: &mut S,
    columns: &ColumnMap,
) -> Result<(Table, ColumnMap), StoreError> {
    let table = store.load()?;
    let bound = columns.bind(&table.headers)?;
    Ok((table, bound))
}

/// [`RecordStore`] over one tab of a workbook file
#[derive(Debug)]
pub struct WorkbookStore {
    path: PathBuf,
    tab: String,
    workbook: Workbook,
}

impl WorkbookStore {
    /// Open `tab` of the workbook at `path`
    ///
    /// # Errors
    /// * `StoreError::Connection` if the file is missing or unreadable, or the
    ///   tab does not exist
    pub fn open(path: impl AsRef<Path>, tab: &str) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let workbook = read_workbook(&path)?;
        if workbook.tab(tab).is_none() {
            return Err(StoreError::Connection(format!(
                "tab '{}' not found in workbook {}",
                tab,
                path.display()
            )));
        }
        debug!("opened tab '{}' of {}", tab, path.display());
        Ok(WorkbookStore {
            path,
            tab: tab.to_string(),
            workbook,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tab(&self) -> &str {
        &self.tab
    }

    /// Re-read the workbook file, picking up writes made by anyone else
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let workbook = read_workbook(&self.path)?;
        if workbook.tab(&self.tab).is_none() {
            return Err(StoreError::Connection(format!(
                "tab '{}' disappeared from workbook {}",
                self.tab,
                self.path.display()
            )));
        }
        self.workbook = workbook;
        Ok(())
    }
}

impl RecordStore for WorkbookStore {
    fn load(&mut self) -> Result<Table, StoreError> {
        self.reload()?;
        let grid = self
            .workbook
            .tab(&self.tab)
            .ok_or_else(|| StoreError::Connection(format!("tab '{}' not found", self.tab)))?;
        let table = grid.to_table();
        info!("loaded {} records from '{}'", table.len(), self.tab);
        Ok(table)
    }

    fn update_field(&mut self, row: usize, column: usize, value: &str) -> Result<(), StoreError> {
        let write_error = |reason: String| StoreError::Write {
            row,
            column,
            reason,
        };

        if row < ROW_OFFSET {
            return Err(write_error("the header row is read-only".to_string()));
        }

        let grid = self
            .workbook
            .tab_mut(&self.tab)
            .ok_or_else(|| write_error(format!("tab '{}' not found", self.tab)))?;
        let previous = grid
            .set(row, column, CellValue::from_input(value))
            .map_err(write_error)?;

        if let Err(e) = save_workbook(&self.workbook, &self.path) {
            warn!("rolling back {} after failed save: {}", cell_name(row, column), e);
            if let Some(grid) = self.workbook.tab_mut(&self.tab) {
                let _ = grid.set(row, column, previous);
            }
            return Err(write_error(e.to_string()));
        }

        debug!("{}!{} <- {:?}", self.tab, cell_name(row, column), value);
        Ok(())
    }
}

fn read_workbook(path: &Path) -> Result<Workbook, StoreError> {
    load_workbook(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            StoreError::Connection(format!("workbook {} not found", path.display()))
        }
        _ => StoreError::Connection(format!("cannot read workbook {}: {}", path.display(), e)),
    })
}
