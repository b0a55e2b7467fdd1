use std::io::Read;
use std::path::Path;

use crate::error::SpiError;
use crate::models::{Dataset, Value};

/// Field separator of the inventory CSV exchange format.
pub const DEFAULT_DELIMITER: u8 = b';';

/// Pick the delimiter from the header line: `;` unless the header only
/// contains commas.
pub fn sniff_delimiter(header_line: &str) -> u8 {
    if !header_line.contains(';') && header_line.contains(',') {
        b','
    } else {
        DEFAULT_DELIMITER
    }
}

fn parse_records<R: Read>(rdr: &mut csv::Reader<R>, name: &str) -> Result<Dataset, SpiError> {
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(SpiError::ParseError(format!("Dataset '{name}' has no header row")));
    }

    let mut dataset = Dataset::new(name, headers);
    for result in rdr.records() {
        let record = result?;
        dataset.push_row(record.iter().map(Value::raw).collect());
    }
    Ok(dataset)
}

/// Read a CSV file into a raw dataset (every cell text or null).
pub fn read_csv_dataset(path: impl AsRef<Path>, name: &str) -> Result<Dataset, SpiError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    read_csv_dataset_from_bytes(content.as_bytes(), name)
}

/// Read CSV bytes into a raw dataset.
pub fn read_csv_dataset_from_bytes(data: &[u8], name: &str) -> Result<Dataset, SpiError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| SpiError::ParseError(format!("Invalid UTF-8 in '{name}': {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let delimiter = sniff_delimiter(text.lines().next().unwrap_or_default());

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    parse_records(&mut rdr, name)
}

/// Cell text in the exchange format: decimal comma, empty for null.
pub fn format_cell(value: &Value) -> String {
    match value {
        Value::Float(f) => f.to_string().replace('.', ","),
        other => other.to_text(),
    }
}

/// Write a dataset as `;`-separated CSV with decimal commas.
pub fn write_csv_dataset(dataset: &Dataset, path: impl AsRef<Path>) -> Result<(), SpiError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(DEFAULT_DELIMITER)
        .from_path(path.as_ref())?;

    wtr.write_record(&dataset.columns)?;
    for row in &dataset.rows {
        wtr.write_record(row.iter().map(format_cell))?;
    }

    wtr.flush()?;
    Ok(())
}
