use crate::record::{CellValue, Record, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One tab of a workbook: a 2-D grid whose first row is the header
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Grid {
    pub rows: Vec<Vec<CellValue>>,
}

impl Grid {
    /// Create a tab holding only a header row
    pub fn with_header(headers: &[String]) -> Self {
        let header = headers
            .iter()
            .map(|h| CellValue::Text(h.clone()))
            .collect();
        Grid { rows: vec![header] }
    }

    /// Header row as text (empty when the tab has no rows at all)
    pub fn headers(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
            .unwrap_or_default()
    }

    /// Rows below the header
    pub fn data_rows(&self) -> &[Vec<CellValue>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    /// Number of physical rows, header included
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    /// Read one cell by 1-based physical position
    pub fn get(&self, row: usize, col: usize) -> Option<&CellValue> {
        if row == 0 || col == 0 {
            return None;
        }
        self.rows.get(row - 1)?.get(col - 1)
    }

    /// Write one cell by 1-based physical position, returning the previous value
    ///
    /// Only existing rows can be written; a row shorter than `col` is padded
    /// with blanks first.
    pub fn set(&mut self, row: usize, col: usize, value: CellValue) -> Result<CellValue, String> {
        if row == 0 || col == 0 {
            return Err("rows and columns are 1-based".to_string());
        }
        let cells = self
            .rows
            .get_mut(row - 1)
            .ok_or_else(|| format!("row {} does not exist", row))?;
        if cells.len() < col {
            cells.resize(col, CellValue::Empty);
        }
        Ok(std::mem::replace(&mut cells[col - 1], value))
    }

    /// Convert every data row into a header-keyed record
    pub fn to_table(&self) -> Table {
        let headers = self.headers();
        let records = self
            .data_rows()
            .iter()
            .map(|row| Record::from_row(&headers, row))
            .collect();
        Table { headers, records }
    }
}

/// A named collection of tabs
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Workbook {
    tabs: BTreeMap<String, Grid>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tab(&self, name: &str) -> Option<&Grid> {
        self.tabs.get(name)
    }

    pub fn tab_mut(&mut self, name: &str) -> Option<&mut Grid> {
        self.tabs.get_mut(name)
    }

    /// Add or replace a tab
    pub fn insert_tab(&mut self, name: &str, grid: Grid) -> Option<Grid> {
        self.tabs.insert(name.to_string(), grid)
    }

    pub fn tab_names(&self) -> impl Iterator<Item = &str> {
        self.tabs.keys().map(String::as_str)
    }
}

/// Spreadsheet column letters for a 1-based column (1 -> A, 27 -> AA)
pub fn col_to_letter(col: usize) -> String {
    let mut col = col;
    let mut result = String::new();
    while col > 0 {
        col -= 1;
        result.push(((col % 26) as u8 + b'A') as char);
        col /= 26;
    }
    result.chars().rev().collect()
}

/// A1-style name of a 1-based cell position
pub fn cell_name(row: usize, col: usize) -> String {
    format!("{}{}", col_to_letter(col), row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Grid {
        let mut grid = Grid::with_header(&["Nombre".to_string(), "Status".to_string()]);
        grid.push_row(vec![CellValue::Text("Ana".into()), CellValue::Text("Proceso".into())]);
        grid.push_row(vec![CellValue::Text("Luis".into())]);
        grid
    }

    #[test]
    fn cell_names_follow_spreadsheet_letters() {
        assert_eq!(cell_name(2, 11), "K2");
        assert_eq!(col_to_letter(26), "Z");
        assert_eq!(col_to_letter(27), "AA");
        assert_eq!(col_to_letter(0), "");
    }

    #[test]
    fn set_pads_short_rows_but_never_adds_rows() {
        let mut grid = sample();
        assert_eq!(
            grid.set(3, 2, CellValue::Text("Pendiente".into())),
            Ok(CellValue::Empty)
        );
        assert_eq!(grid.get(3, 2), Some(&CellValue::Text("Pendiente".into())));
        assert!(grid.set(4, 1, CellValue::Empty).is_err());
        assert!(grid.set(0, 1, CellValue::Empty).is_err());
        assert_eq!(grid.row_count(), 3);
    }

    #[test]
    fn to_table_keys_rows_by_header() {
        let table = sample().to_table();
        assert_eq!(table.headers, vec!["Nombre", "Status"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].text("Status"), "Proceso");
        assert_eq!(table.records[1].text("Status"), "");
    }
}
