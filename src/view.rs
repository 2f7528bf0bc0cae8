//! The slice of the active tab an actor is allowed to see
//!
//! Managers see the rows whose manager email is their own; the administrator
//! sees everything, optionally narrowed to one branch. Each visible row keeps
//! its position in the loaded table, which is what the reconciler writes back to.

use crate::columns::{ColumnMap, SchemaError};
use crate::login::Identity;
use crate::record::{Field, Record, Table};
use crate::store::physical_row;
use std::collections::BTreeSet;
use thiserror::Error;

/// A save touching rows outside the actor's view
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccessError {
    #[error("row {0} does not exist")]
    NoSuchRow(usize),

    #[error("row {row} is not assigned to {email}")]
    NotAssigned { row: usize, email: String },
}

/// A record in the caller's working copy, tagged with its store position
#[derive(Clone, Debug, PartialEq)]
pub struct WorkingRow {
    /// 0-based index in the loaded table
    pub position: usize,
    pub record: Record,
}

impl WorkingRow {
    pub fn new(position: usize, record: Record) -> Self {
        WorkingRow { position, record }
    }

    /// Sheet row this record lives on
    pub fn physical_row(&self) -> usize {
        physical_row(self.position)
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Whether `identity` may observe and edit `record`
pub fn can_access(identity: &Identity, record: &Record, columns: &ColumnMap) -> bool {
    identity.is_admin()
        || same_email(
            &columns.value(record, Field::ManagerEmail).to_string(),
            &identity.email,
        )
}

/// Rows of `table` visible to `identity`
///
/// # Arguments
/// * `table` - Freshly loaded active tab
/// * `columns` - Column map bound to the tab's header
/// * `identity` - Who is looking
/// * `branch` - Administrator-only branch filter; ignored for managers
///
/// # Errors
/// * `SchemaError::MissingColumn` if the column the filter needs is absent
pub fn visible_rows(
    table: &Table,
    columns: &ColumnMap,
    identity: &Identity,
    branch: Option<&str>,
) -> Result<Vec<WorkingRow>, SchemaError> {
    let rows = table
        .records
        .iter()
        .enumerate()
        .map(|(position, record)| WorkingRow::new(position, record.clone()));

    if !identity.is_admin() {
        let email_header = columns.header(Field::ManagerEmail);
        if !table.has_column(email_header) {
            return Err(SchemaError::MissingColumn(email_header.to_string()));
        }
        return Ok(rows
            .filter(|row| can_access(identity, &row.record, columns))
            .collect());
    }

    match branch.map(str::trim).filter(|b| !b.is_empty()) {
        None => Ok(rows.collect()),
        Some(branch) => {
            let branch_header = columns.header(Field::Branch);
            if !table.has_column(branch_header) {
                return Err(SchemaError::MissingColumn(branch_header.to_string()));
            }
            Ok(rows
                .filter(|row| columns.value(&row.record, Field::Branch).to_string().trim() == branch)
                .collect())
        }
    }
}

/// Check that every row of a pending save is visible to `identity` in the
/// table as it stands now
///
/// Positions come from the caller's working copy, so they are checked against
/// a fresh load rather than trusted.
pub fn check_editable(
    identity: &Identity,
    table: &Table,
    columns: &ColumnMap,
    rows: &[WorkingRow],
) -> Result<(), AccessError> {
    for row in rows {
        let current = table
            .records
            .get(row.position)
            .ok_or(AccessError::NoSuchRow(row.physical_row()))?;
        if !can_access(identity, current, columns) {
            return Err(AccessError::NotAssigned {
                row: row.physical_row(),
                email: identity.email.clone(),
            });
        }
    }
    Ok(())
}

/// Distinct non-blank branch labels, sorted, for the administrator's filter
pub fn branches(table: &Table, columns: &ColumnMap) -> Vec<String> {
    table
        .records
        .iter()
        .map(|record| columns.value(record, Field::Branch).to_string().trim().to_string())
        .filter(|branch| !branch.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::login::Role;
    use crate::record::CellValue;

    fn record(email: &str, branch: &str) -> Record {
        let columns = ColumnMap::default();
        let mut record = Record::default();
        record.set(columns.header(Field::ManagerEmail), CellValue::Text(email.into()));
        record.set(columns.header(Field::Branch), CellValue::Text(branch.into()));
        record
    }

    fn table() -> Table {
        Table {
            headers: ColumnMap::default().header_row(),
            records: vec![
                record("a@x.com", "Sucursal Masaya"),
                record("b@x.com", "Sucursal Rivas"),
                record("a@x.com", "Sucursal Masaya"),
                record("b@x.com", "Sucursal Rivas"),
                record("A@X.com ", "Sucursal Masaya"),
            ],
        }
    }

    fn actor(email: &str, role: Role) -> Identity {
        Identity {
            email: email.to_string(),
            role,
            branch: "Sucursal Masaya".to_string(),
        }
    }

    #[test]
    fn managers_see_only_their_rows_with_original_positions() {
        let rows = visible_rows(&table(), &ColumnMap::default(), &actor("a@x.com", Role::Manager), None)
            .unwrap();
        let positions: Vec<usize> = rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 2, 4]);
        assert_eq!(rows[1].physical_row(), 4);
    }

    #[test]
    fn admin_sees_everything_or_one_branch() {
        let admin = actor("admin@x.com", Role::Admin);
        let columns = ColumnMap::default();
        assert_eq!(visible_rows(&table(), &columns, &admin, None).unwrap().len(), 5);
        assert_eq!(
            visible_rows(&table(), &columns, &admin, Some("Sucursal Rivas")).unwrap().len(),
            2
        );
        assert_eq!(visible_rows(&table(), &columns, &admin, Some("  ")).unwrap().len(), 5);
    }

    #[test]
    fn manager_filter_needs_the_email_column() {
        let mut table = table();
        table.headers.retain(|h| h != "Email_Gerente");
        let result = visible_rows(&table, &ColumnMap::default(), &actor("a@x.com", Role::Manager), None);
        assert_eq!(result, Err(SchemaError::MissingColumn("Email_Gerente".to_string())));
    }

    #[test]
    fn branch_list_is_distinct_and_sorted() {
        assert_eq!(
            branches(&table(), &ColumnMap::default()),
            vec!["Sucursal Masaya".to_string(), "Sucursal Rivas".to_string()]
        );
    }

    #[test]
    fn saves_are_limited_to_rows_the_actor_owns_now() {
        let table = table();
        let columns = ColumnMap::default();
        let manager = actor("a@x.com", Role::Manager);
        let row = |position: usize| WorkingRow::new(position, table.records[position % 5].clone());

        assert_eq!(check_editable(&manager, &table, &columns, &[row(0), row(4)]), Ok(()));
        assert_eq!(
            check_editable(&manager, &table, &columns, &[row(0), row(1)]),
            Err(AccessError::NotAssigned {
                row: 3,
                email: "a@x.com".to_string()
            })
        );
        assert_eq!(
            check_editable(&manager, &table, &columns, &[row(7)]),
            Err(AccessError::NoSuchRow(9))
        );

        let admin = actor("admin@x.com", Role::Admin);
        assert_eq!(check_editable(&admin, &table, &columns, &[row(1), row(3)]), Ok(()));
        assert_eq!(
            check_editable(&admin, &table, &columns, &[row(5)]),
            Err(AccessError::NoSuchRow(7))
        );
    }

    #[test]
    fn ownership_follows_the_store_not_the_submitted_record() {
        let table = table();
        let manager = actor("b@x.com", Role::Manager);
        // Working copy claims the row belongs to b@x.com; the store says a@x.com
        let forged = WorkingRow::new(0, record("b@x.com", "Sucursal Rivas"));

        assert!(matches!(
            check_editable(&manager, &table, &ColumnMap::default(), &[forged]),
            Err(AccessError::NotAssigned { row: 2, .. })
        ));
    }
}
