//! Read-only view over archived records: free-text search and the figures
//! behind the status distribution and volume charts.

use crate::columns::ColumnMap;
use crate::record::{Field, Record, Status, Table, parse_currency};
use serde::Serialize;
use std::collections::BTreeMap;

/// Label used for records whose status cell is blank
pub const BLANK_STATUS: &str = "(sin estado)";

/// Records containing `query` in any column, case-insensitively
///
/// A blank query matches everything.
pub fn search<'a>(records: &'a [Record], query: &str) -> Vec<&'a Record> {
    let query = query.trim();
    if query.is_empty() {
        return records.iter().collect();
    }
    records.iter().filter(|record| record.contains_text(query)).collect()
}

/// Count and disbursed volume for one status
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusTotal {
    pub status: String,
    pub count: usize,
    pub disbursed: f64,
}

/// Aggregate figures over a set of records
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub records: usize,
    pub requested_total: f64,
    pub disbursed_total: f64,
    /// The four known statuses first (always present), then any other labels
    /// found in the data, alphabetically
    pub by_status: Vec<StatusTotal>,
}

impl Summary {
    pub fn status(&self, status: &str) -> Option<&StatusTotal> {
        self.by_status.iter().find(|total| total.status == status)
    }
}

fn status_label(raw: &str) -> String {
    match raw.parse::<Status>() {
        Ok(status) => status.as_str().to_string(),
        Err(_) if raw.trim().is_empty() => BLANK_STATUS.to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

/// Summarise `records` from a tab with header row `headers`
///
/// Columns are located by header name, so the historical tab may have a
/// different layout from the active one. Missing columns count as blank.
pub fn summarize<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    headers: &[String],
    columns: &ColumnMap,
) -> Summary {
    let status_header = columns.find_header(Field::Status, headers);
    let requested_header = columns.find_header(Field::RequestedAmount, headers);
    let disbursed_header = columns.find_header(Field::DisbursedAmount, headers);

    let amount = |record: &Record, header: Option<&str>| {
        header
            .and_then(|h| record.get(h))
            .map(parse_currency)
            .unwrap_or(0.0)
    };

    let mut summary = Summary::default();
    let mut known: Vec<StatusTotal> = Status::ALL
        .iter()
        .map(|status| StatusTotal {
            status: status.as_str().to_string(),
            count: 0,
            disbursed: 0.0,
        })
        .collect();
    let mut other: BTreeMap<String, StatusTotal> = BTreeMap::new();

    for record in records {
        let label = status_label(&status_header.map(|h| record.text(h)).unwrap_or_default());
        let requested = amount(record, requested_header);
        let disbursed = amount(record, disbursed_header);

        summary.records += 1;
        summary.requested_total += requested;
        summary.disbursed_total += disbursed;

        let total = match known.iter_mut().find(|t| t.status == label) {
            Some(total) => total,
            None => other.entry(label.clone()).or_insert_with(|| StatusTotal {
                status: label,
                count: 0,
                disbursed: 0.0,
            }),
        };
        total.count += 1;
        total.disbursed += disbursed;
    }

    known.extend(other.into_values());
    summary.by_status = known;
    summary
}

/// Summarise a whole table
pub fn summarize_table(table: &Table, columns: &ColumnMap) -> Summary {
    summarize(&table.records, &table.headers, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CellValue;

    fn table() -> Table {
        let headers: Vec<String> = ["Nombre Completo", "Status", "Monto Solicitado", "Monto Desembolsar"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![
            vec!["Ana Lopez", "Desembolsado", "C$ 10,000", "C$ 8,000"],
            vec!["Luis Perez", "desembolsado", "5000", "5000"],
            vec!["Maria Ruiz", "Denegado", "3000", ""],
            vec!["Jose Diaz", "", "abc", ""],
            vec!["Rosa Mena", "Archivado", "1000", ""],
        ];
        let records = rows
            .into_iter()
            .map(|row| {
                let cells: Vec<CellValue> = row.into_iter().map(CellValue::from_input).collect();
                Record::from_row(&headers, &cells)
            })
            .collect();
        Table { headers, records }
    }

    #[test]
    fn search_is_case_insensitive_across_columns() {
        let table = table();
        assert_eq!(search(&table.records, "PEREZ").len(), 1);
        assert_eq!(search(&table.records, "desembolsado").len(), 2);
        assert_eq!(search(&table.records, "5000").len(), 1);
        assert_eq!(search(&table.records, "  ").len(), 5);
        assert!(search(&table.records, "zzz").is_empty());
    }

    #[test]
    fn summary_counts_and_sums_by_status() {
        let summary = summarize_table(&table(), &ColumnMap::default());

        assert_eq!(summary.records, 5);
        assert_eq!(summary.requested_total, 19000.0);
        assert_eq!(summary.disbursed_total, 13000.0);

        let disbursed = summary.status("Desembolsado").unwrap();
        assert_eq!(disbursed.count, 2);
        assert_eq!(disbursed.disbursed, 13000.0);
        assert_eq!(summary.status("Pendiente").unwrap().count, 0);
        assert_eq!(summary.status(BLANK_STATUS).unwrap().count, 1);
        assert_eq!(summary.status("Archivado").unwrap().count, 1);

        let order: Vec<&str> = summary.by_status.iter().map(|t| t.status.as_str()).collect();
        assert_eq!(
            order,
            vec!["Proceso", "Denegado", "Desembolsado", "Pendiente", BLANK_STATUS, "Archivado"]
        );
    }

    #[test]
    fn summary_of_search_results() {
        let table = table();
        let hits = search(&table.records, "ruiz");
        let summary = summarize(hits, &table.headers, &ColumnMap::default());
        assert_eq!(summary.records, 1);
        assert_eq!(summary.status("Denegado").unwrap().count, 1);
    }
}
