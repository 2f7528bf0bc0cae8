use crate::record::Record;

/// Convert records to CSV, columns in `headers` order
///
/// Values containing commas, quotes or newlines are quoted, with embedded
/// quotes doubled.
///
/// # Examples
/// ```
/// use credit_desk::downloader::to_csv;
/// use credit_desk::record::{CellValue, Record};
///
/// let headers = vec!["Nombre".to_string(), "Monto".to_string()];
/// let record = Record::from_row(&headers, &[CellValue::Text("Ana".into()), CellValue::Number(5000.0)]);
/// assert_eq!(to_csv(&headers, [&record]), "Nombre,Monto\nAna,5000\n");
/// ```
pub fn to_csv<'a>(headers: &[String], records: impl IntoIterator<Item = &'a Record>) -> String {
    let mut csv_content = String::new();

    push_row(&mut csv_content, headers.iter().map(String::as_str));
    for record in records {
        let values: Vec<String> = headers.iter().map(|h| record.text(h)).collect();
        push_row(&mut csv_content, values.iter().map(String::as_str));
    }

    csv_content
}

fn push_row<'a>(out: &mut String, values: impl Iterator<Item = &'a str>) {
    for (i, value) in values.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(value));
    }
    out.push('\n');
}

fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
