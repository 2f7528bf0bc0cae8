/*!
# Credit Desk

Role-gated editor for micro-credit applications kept in a shared workbook.

## Overview

Branch managers and one administrator log in, see the slice of the "Clientes"
tab they are entitled to, edit a few workflow columns, and save the edits back
cell by cell. A read-only "Historico" tab can be searched and summarised.

## Architecture

### Store Layer
- **Record Store Adapter** (`store`) - loads a tab as header-keyed records and
  writes single cells addressed by physical row and column
- **Workbook** (`workbook`, `saving`) - gzip+bincode workbook file behind the
  adapter
- **Column Map** (`columns`) - field to column layout, checked against the live
  header row on every load

### Editing Layer
- **View** (`view`) - which rows an actor sees, each tagged with its store position
- **Reconciler** (`reconcile`) - diffs edited rows against loaded rows and writes
  only permitted fields of dirty rows, plus a last-updated stamp

### Access Layer
- **Login** (`login`) - user directory with Argon2 hashes, role policy, sessions

### Interaction Layer
- **App** (`app`, feature `web`) - JSON API over axum
- **CLI** (`credit-desk-cli`) - CSV import/export, user registration, history

## Save Semantics

Writes are best-effort and per cell. A row whose writes fail is reported and
the remaining rows are still written; nothing is rolled back. Two actors editing
the same row race, and the last write of each cell wins.
*/

#[cfg(feature = "web")]
pub mod app;
pub mod columns;
pub mod config;
pub mod downloader;
pub mod history;
pub mod loader;
pub mod login;
pub mod reconcile;
pub mod record;
pub mod saving;
pub mod store;
pub mod view;
pub mod workbook;

pub use columns::{ColumnMap, ColumnSpec, SchemaError};
pub use login::{AuthError, Identity, IdentityProvider, PermissionPolicy, Role, Session};
pub use reconcile::{ReconcileError, SaveReport};
pub use record::{CellValue, Field, FieldSet, Record, Status, Table};
pub use store::{RecordStore, StoreError, WorkbookStore};
pub use view::{AccessError, WorkingRow};
