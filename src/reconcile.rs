//! Push edits from a working copy back to the store
//!
//! A save is planned first and applied second. Planning compares the edited
//! rows with the rows as last loaded, validates every dirty row and produces
//! the exact list of cell writes; applying issues them one cell at a time.
//! Application is best-effort: a row whose writes fail is recorded and the
//! remaining rows are still written. Nothing is rolled back, so after a
//! partial failure the caller should load again.

use crate::columns::ColumnMap;
use crate::record::{CellValue, Field, FieldSet, Record, Status, parse_currency};
use crate::store::RecordStore;
use crate::view::WorkingRow;
use chrono::Local;
use log::{debug, info, warn};
use thiserror::Error;

/// Format of the last-updated stamp, local clock
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Current local time formatted for the last-updated column
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Reasons a save is refused before any cell is written
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("edited table has {edited} rows but the original has {original}")]
    LengthMismatch { original: usize, edited: usize },

    #[error("row {index} is misaligned: position {original} was loaded, {edited} was edited")]
    Misaligned {
        index: usize,
        original: usize,
        edited: usize,
    },

    #[error("row {row}: '{value}' is not a valid status")]
    InvalidStatus { row: usize, value: String },
}

/// One pending cell write
#[derive(Clone, Debug, PartialEq)]
pub struct CellWrite {
    pub field: Field,
    /// 1-based physical column
    pub column: usize,
    pub value: String,
}

/// Every write for one dirty row, timestamp last
#[derive(Clone, Debug, PartialEq)]
pub struct RowChange {
    /// 0-based position in the loaded table
    pub position: usize,
    /// 1-based physical row
    pub row: usize,
    pub writes: Vec<CellWrite>,
}

/// A validated save, ready to apply
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    pub rows: Vec<RowChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total number of cell writes, timestamps included
    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|row| row.writes.len()).sum()
    }
}

/// A row that could not be fully written
#[derive(Clone, Debug, PartialEq)]
pub struct RowFailure {
    pub position: usize,
    pub row: usize,
    pub message: String,
}

/// Outcome of applying a [`ChangeSet`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SaveReport {
    /// Physical rows whose writes all succeeded
    pub rows_written: Vec<usize>,
    pub cells_written: usize,
    pub failures: Vec<RowFailure>,
}

impl SaveReport {
    /// True when every planned write succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of rows that failed, one per row however many cells failed
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    /// Actor-facing one-line summary
    pub fn message(&self) -> String {
        if self.is_clean() {
            format!("{} row(s) updated", self.rows_written.len())
        } else {
            format!(
                "finished with {} error(s); reload to see the current state",
                self.error_count()
            )
        }
    }
}

/// Indices of the rows whose edited form differs from the loaded form
///
/// # Errors
/// * `LengthMismatch` if the two sequences differ in length
/// * `Misaligned` if a pair of rows refers to different store positions
pub fn dirty_rows(original: &[WorkingRow], edited: &[WorkingRow]) -> Result<Vec<usize>, ReconcileError> {
    if original.len() != edited.len() {
        return Err(ReconcileError::LengthMismatch {
            original: original.len(),
            edited: edited.len(),
        });
    }

    let mut dirty = Vec::new();
    for (index, (before, after)) in original.iter().zip(edited).enumerate() {
        if before.position != after.position {
            return Err(ReconcileError::Misaligned {
                index,
                original: before.position,
                edited: after.position,
            });
        }
        if before.record != after.record {
            dirty.push(index);
        }
    }
    Ok(dirty)
}

/// Text written for `field`, with status and amounts coerced to their types
fn write_value(record: &Record, columns: &ColumnMap, field: Field) -> String {
    let value = columns.value(record, field);
    match field {
        Field::Status => value
            .to_string()
            .parse::<Status>()
            .map(|status| status.as_str().to_string())
            .unwrap_or_else(|_| value.to_string()),
        Field::DisbursedAmount if !value.is_empty() => {
            CellValue::Number(parse_currency(value)).to_string()
        }
        _ => value.to_string(),
    }
}

/// Build the writes needed to persist `edited`
///
/// Only fields in `writable` are written, in physical column order, followed by
/// `timestamp` in the last-updated column. The last-updated column itself is
/// never taken from the edited record.
///
/// # Errors
/// * Any [`dirty_rows`] error
/// * `InvalidStatus` if a dirty row carries a status outside the enumeration;
///   in that case nothing is planned
pub fn plan_changes(
    original: &[WorkingRow],
    edited: &[WorkingRow],
    columns: &ColumnMap,
    writable: &FieldSet,
    timestamp: &str,
) -> Result<ChangeSet, ReconcileError> {
    let dirty = dirty_rows(original, edited)?;

    for &index in &dirty {
        let row = &edited[index];
        let status = columns.value(&row.record, Field::Status).to_string();
        if status.parse::<Status>().is_err() {
            return Err(ReconcileError::InvalidStatus {
                row: row.physical_row(),
                value: status,
            });
        }
    }

    let mut fields: Vec<Field> = writable
        .iter()
        .copied()
        .filter(|field| *field != Field::LastUpdated)
        .collect();
    fields.sort_by_key(|field| columns.column(*field));

    let rows = dirty
        .into_iter()
        .map(|index| {
            let row = &edited[index];
            let mut writes: Vec<CellWrite> = fields
                .iter()
                .map(|&field| CellWrite {
                    field,
                    column: columns.column(field),
                    value: write_value(&row.record, columns, field),
                })
                .collect();
            writes.push(CellWrite {
                field: Field::LastUpdated,
                column: columns.column(Field::LastUpdated),
                value: timestamp.to_string(),
            });
            RowChange {
                position: row.position,
                row: row.physical_row(),
                writes,
            }
        })
        .collect();

    Ok(ChangeSet { rows })
}

/// Issue every write of `changes`, one cell per store call
///
/// A failing cell abandons the rest of its row and counts as one error; the
/// next row is still attempted.
pub fn apply_changes<S: RecordStore + ?Sized>(store: &mut S, changes: &ChangeSet) -> SaveReport {
    let mut report = SaveReport::default();

    for change in &changes.rows {
        let mut failed = None;
        for write in &change.writes {
            match store.update_field(change.row, write.column, &write.value) {
                Ok(()) => report.cells_written += 1,
                Err(e) => {
                    failed = Some(e.to_string());
                    break;
                }
            }
        }

        match failed {
            None => {
                debug!("row {} written ({} cells)", change.row, change.writes.len());
                report.rows_written.push(change.row);
            }
            Some(message) => {
                warn!("error in row {}: {}", change.row, message);
                report.failures.push(RowFailure {
                    position: change.position,
                    row: change.row,
                    message,
                });
            }
        }
    }

    info!(
        "save finished: {} row(s) written, {} cell(s), {} error(s)",
        report.rows_written.len(),
        report.cells_written,
        report.error_count()
    );
    report
}

/// Plan and apply in one call
pub fn save_changes<S: RecordStore + ?Sized>(
    store: &mut S,
    original: &[WorkingRow],
    edited: &[WorkingRow],
    columns: &ColumnMap,
    writable: &FieldSet,
    timestamp: &str,
) -> Result<SaveReport, ReconcileError> {
    let changes = plan_changes(original, edited, columns, writable, timestamp)?;
    if changes.is_empty() {
        info!("no pending changes");
        return Ok(SaveReport::default());
    }
    Ok(apply_changes(store, &changes))
}
