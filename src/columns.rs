//! Field to physical column mapping
//!
//! Writes address cells by 1-based column number, reads address them by header
//! name. The map ties the two together and is checked against the live header
//! row before anything is written, so a reordered sheet fails loudly instead of
//! receiving values in the wrong column.

use crate::record::{CellValue, Field, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Problems with the shape of the sheet or of the column configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("column {column} should hold '{expected}' ({field}) but the sheet has '{found}'")]
    SchemaMismatch {
        field: Field,
        column: usize,
        expected: String,
        found: String,
    },

    #[error("missing expected column '{0}'")]
    MissingColumn(String),

    #[error("invalid column map: {0}")]
    InvalidMap(String),
}

/// Where one field lives in the sheet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: Field,
    /// 1-based physical column
    pub column: usize,
    /// Header text expected in row 1
    pub header: String,
    /// Other spellings accepted for the header
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ColumnSpec {
    pub fn new(field: Field, column: usize, header: &str) -> Self {
        ColumnSpec {
            field,
            column,
            header: header.to_string(),
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    fn accepts(&self, found: &str) -> bool {
        let found = found.trim();
        std::iter::once(&self.header)
            .chain(self.aliases.iter())
            .any(|name| name.trim().eq_ignore_ascii_case(found))
    }
}

/// Validated mapping from every [`Field`] to its column
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ColumnSpec>", into = "Vec<ColumnSpec>")]
pub struct ColumnMap {
    columns: Vec<ColumnSpec>,
}

impl ColumnMap {
    /// Build a map, rejecting duplicate fields or columns and missing fields
    pub fn new(mut columns: Vec<ColumnSpec>) -> Result<Self, SchemaError> {
        let mut fields = BTreeSet::new();
        let mut positions = BTreeSet::new();

        for spec in &columns {
            if spec.column == 0 {
                return Err(SchemaError::InvalidMap(format!(
                    "{} is mapped to column 0; columns are 1-based",
                    spec.field
                )));
            }
            if !fields.insert(spec.field) {
                return Err(SchemaError::InvalidMap(format!(
                    "{} is mapped more than once",
                    spec.field
                )));
            }
            if !positions.insert(spec.column) {
                return Err(SchemaError::InvalidMap(format!(
                    "column {} is used by more than one field",
                    spec.column
                )));
            }
        }

        if let Some(missing) = Field::ALL.iter().find(|f| !fields.contains(f)) {
            return Err(SchemaError::InvalidMap(format!("{} has no column", missing)));
        }

        columns.sort_by_key(|spec| spec.column);
        Ok(ColumnMap { columns })
    }

    pub fn spec(&self, field: Field) -> &ColumnSpec {
        // Construction guarantees every field is present
        self.columns
            .iter()
            .find(|spec| spec.field == field)
            .unwrap_or_else(|| unreachable!("column map without {}", field))
    }

    pub fn column(&self, field: Field) -> usize {
        self.spec(field).column
    }

    pub fn header(&self, field: Field) -> &str {
        &self.spec(field).header
    }

    pub fn specs(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Value of `field` in `record`, `Empty` when the column is absent
    pub fn value<'a>(&self, record: &'a Record, field: Field) -> &'a CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        record.get(self.header(field)).unwrap_or(EMPTY)
    }

    /// Check the map against a live header row
    ///
    /// Returns a copy whose headers are the exact spellings found in the sheet,
    /// so later lookups by header hit the loaded records.
    pub fn bind(&self, headers: &[String]) -> Result<ColumnMap, SchemaError> {
        let mut bound = self.clone();
        for spec in bound.columns.iter_mut() {
            let found = headers.get(spec.column - 1).map(String::as_str).unwrap_or("");
            if !spec.accepts(found) {
                return Err(SchemaError::SchemaMismatch {
                    field: spec.field,
                    column: spec.column,
                    expected: spec.header.clone(),
                    found: found.to_string(),
                });
            }
            spec.header = found.to_string();
        }
        Ok(bound)
    }

    /// Header in `headers` naming `field` at any position, for tabs read by name only
    pub fn find_header<'a>(&self, field: Field, headers: &'a [String]) -> Option<&'a str> {
        let spec = self.spec(field);
        headers
            .iter()
            .find(|found| spec.accepts(found))
            .map(String::as_str)
    }

    /// Header row matching this map, for seeding an empty tab
    pub fn header_row(&self) -> Vec<String> {
        let width = self.columns.iter().map(|s| s.column).max().unwrap_or(0);
        let mut row = vec![String::new(); width];
        for spec in &self.columns {
            row[spec.column - 1] = spec.header.clone();
        }
        row
    }
}

impl Default for ColumnMap {
    /// Layout of the "Clientes" tab: identity columns A..J, workflow K..N and
    /// the last-updated stamp in O
    fn default() -> Self {
        let columns = vec![
            ColumnSpec::new(Field::Agent, 1, "Agente"),
            ColumnSpec::new(Field::ReportDate, 2, "Fecha Reporte"),
            ColumnSpec::new(Field::FullName, 3, "Nombre Completo"),
            ColumnSpec::new(Field::CreditType, 4, "Tipo Credito"),
            ColumnSpec::new(Field::Phone, 5, "Telefono"),
            ColumnSpec::new(Field::BusinessAddress, 6, "Direccion Negocio"),
            ColumnSpec::new(Field::BusinessType, 7, "Tipo Negocio"),
            ColumnSpec::new(Field::RequestedAmount, 8, "Monto Solicitado"),
            ColumnSpec::new(Field::Branch, 9, "Sucursal"),
            ColumnSpec::new(Field::ManagerEmail, 10, "Email_Gerente"),
            ColumnSpec::new(Field::Status, 11, "Status"),
            ColumnSpec::new(Field::Justification, 12, "Justificacion").with_alias("Justificación"),
            ColumnSpec::new(Field::Collaborator, 13, "Asignado_Colaborador"),
            ColumnSpec::new(Field::DisbursedAmount, 14, "Monto desembolsar")
                .with_alias("Monto Desembolsar"),
            ColumnSpec::new(Field::LastUpdated, 15, "Fecha Actualizacion")
                .with_alias("Fecha Actualización"),
        ];
        ColumnMap { columns }
    }
}

impl TryFrom<Vec<ColumnSpec>> for ColumnMap {
    type Error = SchemaError;

    fn try_from(columns: Vec<ColumnSpec>) -> Result<Self, Self::Error> {
        ColumnMap::new(columns)
    }
}

impl From<ColumnMap> for Vec<ColumnSpec> {
    fn from(map: ColumnMap) -> Self {
        map.columns
    }
}
