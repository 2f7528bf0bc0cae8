use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref CURRENCY_NOISE: Regex = Regex::new(r"[^0-9.\-]").unwrap();
}

/// Currency prefix used when formatting monetary amounts for display
pub const CURRENCY_SYMBOL: &str = "C$";

/// A single cell as returned by the tabular store
///
/// Mirrors what a spreadsheet API hands back for a row: blank cells, free text,
/// or numbers. Equality is structural, so `Number(5.0)` and `Text("5")` differ.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Blank cell
    #[default]
    Empty,
    /// Free text
    Text(String),
    /// Numeric cell
    Number(f64),
}

impl CellValue {
    /// Coerce user-entered text the way a spreadsheet does on write
    ///
    /// Empty (or whitespace-only) input becomes `Empty`, anything that parses as a
    /// number becomes `Number`, the rest is kept verbatim as `Text`.
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return CellValue::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(input.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Convert from a JSON scalar (used by the web boundary)
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Empty,
            serde_json::Value::Number(n) => n.as_f64().map_or(CellValue::Empty, CellValue::Number),
            serde_json::Value::String(s) if s.is_empty() => CellValue::Empty,
            serde_json::Value::String(s) => CellValue::Text(s.clone()),
            serde_json::Value::Bool(b) => CellValue::Text(b.to_string().to_uppercase()),
            other => CellValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Empty => serde_json::Value::String(String::new()),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
            CellValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            // Whole numbers print without a trailing ".0", as the sheet shows them
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Every column this application knows about
///
/// The variant order is the physical column order of the default layout, so
/// sorting a set of fields yields the order in which they are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Agent,
    ReportDate,
    FullName,
    CreditType,
    Phone,
    BusinessAddress,
    BusinessType,
    RequestedAmount,
    Branch,
    ManagerEmail,
    Status,
    Justification,
    Collaborator,
    DisbursedAmount,
    LastUpdated,
}

/// Set of field identifiers, ordered by physical column
pub type FieldSet = BTreeSet<Field>;

impl Field {
    pub const ALL: [Field; 15] = [
        Field::Agent,
        Field::ReportDate,
        Field::FullName,
        Field::CreditType,
        Field::Phone,
        Field::BusinessAddress,
        Field::BusinessType,
        Field::RequestedAmount,
        Field::Branch,
        Field::ManagerEmail,
        Field::Status,
        Field::Justification,
        Field::Collaborator,
        Field::DisbursedAmount,
        Field::LastUpdated,
    ];

    /// Applicant and context attributes, writable by the administrator only
    pub const IDENTITY: [Field; 10] = [
        Field::Agent,
        Field::ReportDate,
        Field::FullName,
        Field::CreditType,
        Field::Phone,
        Field::BusinessAddress,
        Field::BusinessType,
        Field::RequestedAmount,
        Field::Branch,
        Field::ManagerEmail,
    ];

    /// Fields the assigned manager may edit
    pub const WORKFLOW: [Field; 4] = [
        Field::Status,
        Field::Justification,
        Field::Collaborator,
        Field::DisbursedAmount,
    ];

    /// Stable identifier used in configuration files and the JSON API
    pub fn key(self) -> &'static str {
        match self {
            Field::Agent => "agent",
            Field::ReportDate => "report_date",
            Field::FullName => "full_name",
            Field::CreditType => "credit_type",
            Field::Phone => "phone",
            Field::BusinessAddress => "business_address",
            Field::BusinessType => "business_type",
            Field::RequestedAmount => "requested_amount",
            Field::Branch => "branch",
            Field::ManagerEmail => "manager_email",
            Field::Status => "status",
            Field::Justification => "justification",
            Field::Collaborator => "collaborator",
            Field::DisbursedAmount => "disbursed_amount",
            Field::LastUpdated => "last_updated",
        }
    }

    pub fn is_workflow(self) -> bool {
        Self::WORKFLOW.contains(&self)
    }

    pub fn is_identity(self) -> bool {
        Self::IDENTITY.contains(&self)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Workflow status of a credit application
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Proceso,
    Denegado,
    Desembolsado,
    Pendiente,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Proceso,
        Status::Denegado,
        Status::Desembolsado,
        Status::Pendiente,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Proceso => "Proceso",
            Status::Denegado => "Denegado",
            Status::Desembolsado => "Desembolsado",
            Status::Pendiente => "Pendiente",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    /// Parse a status label, ignoring surrounding whitespace and letter case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("'{}' is not a valid status", s))
    }
}

/// One credit-application row, keyed by column header
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    cells: BTreeMap<String, CellValue>,
}

impl Record {
    /// Build a record from a header row and one data row
    ///
    /// Short rows are padded with `Empty`; cells under a blank header are dropped.
    pub fn from_row(headers: &[String], row: &[CellValue]) -> Self {
        let cells = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.trim().is_empty())
            .map(|(i, header)| (header.clone(), row.get(i).cloned().unwrap_or_default()))
            .collect();
        Record { cells }
    }

    /// Lay the record out as a row following `headers`
    pub fn to_row(&self, headers: &[String]) -> Vec<CellValue> {
        headers
            .iter()
            .map(|header| self.cells.get(header).cloned().unwrap_or_default())
            .collect()
    }

    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells.get(header)
    }

    /// Display text of a cell, empty when the column is absent
    pub fn text(&self, header: &str) -> String {
        self.get(header).map(|v| v.to_string()).unwrap_or_default()
    }

    pub fn set(&mut self, header: &str, value: CellValue) {
        self.cells.insert(header.to_string(), value);
    }

    pub fn cells(&self) -> impl Iterator<Item = (&String, &CellValue)> {
        self.cells.iter()
    }

    /// Case-insensitive substring match against every cell
    pub fn contains_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.cells
            .values()
            .any(|value| value.to_string().to_lowercase().contains(&needle))
    }

    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.cells
            .iter()
            .map(|(header, value)| (header.clone(), value.to_json()))
            .collect()
    }

    pub fn from_json(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let cells = map
            .iter()
            .map(|(header, value)| (header.clone(), CellValue::from_json(value)))
            .collect();
        Record { cells }
    }
}

/// All records of one tab plus the header row they were keyed by
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    pub fn has_column(&self, header: &str) -> bool {
        self.headers.iter().any(|h| h == header)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse monetary text into a number
///
/// Everything but digits, the decimal point and a minus sign is stripped, so
/// `"C$ 5,000"` reads as `5000.0`. Anything unparseable coerces to zero.
pub fn parse_currency_text(text: &str) -> f64 {
    let cleaned = CURRENCY_NOISE.replace_all(text, "");
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

/// Numeric value of a monetary cell, zero for blank or malformed cells
pub fn parse_currency(value: &CellValue) -> f64 {
    match value {
        CellValue::Number(n) if n.is_finite() => *n,
        CellValue::Number(_) | CellValue::Empty => 0.0,
        CellValue::Text(s) => parse_currency_text(s),
    }
}

/// Format an amount for display, e.g. `C$ 5,000.00`
pub fn format_currency(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::new();
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!(
        "{}{} {}.{:02}",
        if negative { "-" } else { "" },
        CURRENCY_SYMBOL,
        grouped,
        cents % 100
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_parsing_strips_symbols_and_separators() {
        assert_eq!(parse_currency(&CellValue::Text("C$ 5,000".into())), 5000.0);
        assert_eq!(parse_currency(&CellValue::Text("".into())), 0.0);
        assert_eq!(parse_currency(&CellValue::Text("abc".into())), 0.0);
        assert_eq!(parse_currency(&CellValue::Number(1200.0)), 1200.0);
        assert_eq!(parse_currency(&CellValue::Empty), 0.0);
        assert_eq!(parse_currency_text("C$ 1,250.75"), 1250.75);
        assert_eq!(parse_currency_text("1.2.3"), 0.0);
    }

    #[test]
    fn currency_formatting_groups_thousands() {
        assert_eq!(format_currency(5000.0), "C$ 5,000.00");
        assert_eq!(format_currency(1234567.891), "C$ 1,234,567.89");
        assert_eq!(format_currency(0.5), "C$ 0.50");
        assert_eq!(format_currency(-42.0), "-C$ 42.00");
    }

    #[test]
    fn status_parses_only_the_four_labels() {
        assert_eq!("Desembolsado".parse::<Status>(), Ok(Status::Desembolsado));
        assert_eq!(" pendiente ".parse::<Status>(), Ok(Status::Pendiente));
        assert!("Aprobado".parse::<Status>().is_err());
        assert!("".parse::<Status>().is_err());
    }

    #[test]
    fn user_input_is_coerced_like_a_sheet() {
        assert_eq!(CellValue::from_input(""), CellValue::Empty);
        assert_eq!(CellValue::from_input("  "), CellValue::Empty);
        assert_eq!(CellValue::from_input("1200"), CellValue::Number(1200.0));
        assert_eq!(
            CellValue::from_input("C$ 10"),
            CellValue::Text("C$ 10".to_string())
        );
        assert_eq!(CellValue::Number(1200.0).to_string(), "1200");
        assert_eq!(CellValue::Number(12.5).to_string(), "12.5");
    }

    #[test]
    fn records_pad_short_rows_and_search_all_cells() {
        let headers = vec!["Nombre".to_string(), "Status".to_string(), "".to_string()];
        let record = Record::from_row(&headers, &[CellValue::Text("Ana Lopez".into())]);

        assert_eq!(record.get("Status"), Some(&CellValue::Empty));
        assert_eq!(record.cells().count(), 2);
        assert!(record.contains_text("LOPEZ"));
        assert!(!record.contains_text("perez"));
        assert_eq!(record.to_row(&headers).len(), 3);
    }
}
