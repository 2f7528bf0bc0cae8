use crate::record::CellValue;
use crate::saving::{load_workbook, save_workbook};
use crate::workbook::{Grid, Workbook};
use log::info;
use std::error::Error;
use std::fs;
use std::path::Path;

/// Parse CSV text into a tab
///
/// The first non-blank line is the header and is kept as text; data cells are
/// coerced the way a spreadsheet coerces typed input (numbers become numbers,
/// blanks become empty).
///
/// # Arguments
/// * `content` - CSV text, optionally starting with a UTF-8 byte order mark
///
/// # Returns
/// * `Result<Grid, Box<dyn Error>>` - The parsed tab or an error
pub fn grid_from_csv(content: &str) -> Result<Grid, Box<dyn Error>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = parse_csv_records(content)?.into_iter();

    let headers: Vec<String> = records
        .next()
        .ok_or("CSV file is empty")?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut grid = Grid::with_header(&headers);
    for record in records {
        grid.push_row(record.iter().map(|value| CellValue::from_input(value)).collect());
    }

    Ok(grid)
}

/// Load a tab from a CSV file
///
/// # Examples
/// ```no_run
/// use credit_desk::loader::from_csv;
///
/// match from_csv("clientes.csv") {
///     Ok(grid) => println!("Loaded {} rows", grid.row_count()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<Grid, Box<dyn Error>> {
    let content = fs::read_to_string(filepath)?;
    grid_from_csv(&content)
}

/// Import a CSV file into `tab` of the workbook at `workbook_path`
///
/// Creates the workbook if it does not exist and replaces the tab if it does.
/// Returns the number of data rows imported.
pub fn import_csv(
    workbook_path: impl AsRef<Path>,
    tab: &str,
    csv_path: impl AsRef<Path>,
) -> Result<usize, Box<dyn Error>> {
    let workbook_path = workbook_path.as_ref();
    let grid = from_csv(csv_path)?;
    let rows = grid.data_rows().len();

    let mut workbook = if workbook_path.exists() {
        load_workbook(workbook_path)?
    } else {
        Workbook::new()
    };
    workbook.insert_tab(tab, grid);
    save_workbook(&workbook, workbook_path)?;

    info!("imported {} rows into '{}' of {}", rows, tab, workbook_path.display());
    Ok(rows)
}

// Split CSV text into records of fields. Quoted fields may span lines;
// blank lines between records are skipped.
fn parse_csv_records(content: &str) -> Result<Vec<Vec<String>>, Box<dyn Error>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut record_start = 1;
    let mut line = 1;
    let mut chars = content.chars().peekable();

    let mut finish_record = |record: &mut Vec<String>, field: &mut String| {
        record.push(std::mem::take(field));
        let blank = record.len() == 1 && record[0].trim().is_empty();
        let done = std::mem::take(record);
        if !blank {
            records.push(done);
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                // Doubled quote inside a quoted field
                current_field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => record.push(std::mem::take(&mut current_field)),
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                line += 1;
                finish_record(&mut record, &mut current_field);
                record_start = line;
            }
            _ => {
                if c == '\n' {
                    line += 1;
                }
                current_field.push(c);
            }
        }
    }

    if in_quotes {
        return Err(format!("unterminated quote in record starting at line {}", record_start).into());
    }
    if !record.is_empty() || !current_field.is_empty() {
        finish_record(&mut record, &mut current_field);
    }

    Ok(records)
}
