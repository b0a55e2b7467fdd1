use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook};

use crate::error::SpiError;
use crate::models::{Dataset, Value};

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::Integer(*i),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Boolean(*b),
        Data::String(s) => Value::raw(s),
        other => Value::raw(&other.to_string()),
    }
}

/// Read the first sheet of an Excel (.xlsx) workbook into a dataset. The
/// first row holds the column names.
pub fn read_excel_dataset(path: impl AsRef<Path>, name: &str) -> Result<Dataset, SpiError> {
    let path = path.as_ref();
    let mut workbook: Xlsx<_> = open_workbook(path)?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SpiError::Excel("No sheets found in workbook".to_string()))?;

    let range = workbook.worksheet_range(&sheet_name)?;
    let mut rows = range.rows();

    let headers: Vec<String> = rows
        .next()
        .map(|header| header.iter().map(|c| c.to_string()).collect())
        .ok_or_else(|| SpiError::ParseError(format!("Sheet '{sheet_name}' is empty")))?;

    let mut dataset = Dataset::new(name, headers);
    for row in rows {
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        dataset.push_row(row.iter().map(cell_value).collect());
    }

    tracing::debug!(path = %path.display(), rows = dataset.len(), "workbook read");
    Ok(dataset)
}

/// Write a dataset to a single-sheet Excel (.xlsx) workbook.
pub fn write_excel_dataset(dataset: &Dataset, path: impl AsRef<Path>) -> Result<(), SpiError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name(&dataset.name))?;

    let header_format = Format::new().set_bold();
    for (col, name) in dataset.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &header_format)?;
    }

    for (idx, row) in dataset.rows.iter().enumerate() {
        let r = (idx + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            let c = col as u16;
            match value {
                Value::Null => {}
                Value::Integer(i) => {
                    worksheet.write_number(r, c, *i as f64)?;
                }
                Value::Float(f) => {
                    worksheet.write_number(r, c, *f)?;
                }
                Value::Boolean(b) => {
                    worksheet.write_boolean(r, c, *b)?;
                }
                Value::Text(s) => {
                    worksheet.write_string(r, c, s)?;
                }
            }
        }
    }

    workbook.save(path.as_ref())?;
    Ok(())
}

/// Worksheet names are limited to 31 characters.
fn sheet_name(name: &str) -> String {
    let trimmed: String = name.chars().take(31).collect();
    if trimmed.is_empty() {
        "Sheet1".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excel_roundtrip() {
        let mut ds = Dataset::new(
            "sample_trees",
            vec!["locality".to_string(), "species".to_string(), "height".to_string()],
        );
        ds.push_row(vec![Value::Integer(101), Value::from("SM"), Value::Float(24.5)]);
        ds.push_row(vec![Value::Integer(102), Value::from("BK"), Value::Null]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trees.xlsx");
        write_excel_dataset(&ds, &path).unwrap();

        let back = read_excel_dataset(&path, "sample_trees").unwrap();
        assert_eq!(back.columns, ds.columns);
        assert_eq!(back.len(), 2);
        assert_eq!(back.get_f64(0, "height"), Some(24.5));
        assert_eq!(back.get_f64(0, "locality"), Some(101.0));
        assert_eq!(back.get(1, "height"), Some(&Value::Null));
        assert_eq!(back.get_text(1, "species"), "BK");
    }

    #[test]
    fn test_missing_workbook() {
        assert!(read_excel_dataset("/nonexistent/file.xlsx", "x").is_err());
    }

    #[test]
    fn test_sheet_name_truncated() {
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
        assert_eq!(sheet_name(""), "Sheet1");
    }
}
