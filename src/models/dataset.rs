use serde::{Deserialize, Serialize};

use super::value::Value;

/// An imported table: ordered column names plus rows of cells.
///
/// Column names are lower-cased on construction so that rule lookup is
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(|c| c.trim().to_lowercase()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Cell at `row` / `column`; `None` when the column does not exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn get_f64(&self, row: usize, column: &str) -> Option<f64> {
        self.get(row, column).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, row: usize, column: &str) -> Option<i64> {
        self.get(row, column).and_then(Value::as_i64)
    }

    /// Text of a cell, empty when missing or null.
    pub fn get_text(&self, row: usize, column: &str) -> String {
        self.get(row, column).map(Value::to_text).unwrap_or_default()
    }

    /// Mutable access to the cells of one column.
    pub fn column_mut(&mut self, column: &str) -> Option<impl Iterator<Item = &mut Value>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter_mut().filter_map(move |r| r.get_mut(idx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut ds = Dataset::new("trees", vec!["Locality".to_string(), " DBH ".to_string()]);
        ds.push_row(vec![Value::Integer(1), Value::Float(25.0)]);
        ds.push_row(vec![Value::Integer(2)]);
        ds
    }

    #[test]
    fn test_columns_lowercased() {
        let ds = sample();
        assert_eq!(ds.columns, vec!["locality", "dbh"]);
        assert!(ds.has_column("dbh"));
        assert!(!ds.has_column("DBH"));
    }

    #[test]
    fn test_short_rows_padded() {
        let ds = sample();
        assert_eq!(ds.get(1, "dbh"), Some(&Value::Null));
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn test_typed_getters() {
        let ds = sample();
        assert_eq!(ds.get_i64(0, "locality"), Some(1));
        assert_eq!(ds.get_f64(0, "dbh"), Some(25.0));
        assert_eq!(ds.get_f64(1, "dbh"), None);
        assert_eq!(ds.get_text(0, "missing"), "");
    }

    #[test]
    fn test_column_mut() {
        let mut ds = sample();
        for cell in ds.column_mut("dbh").unwrap() {
            if cell.is_null() {
                *cell = Value::Float(0.0);
            }
        }
        assert_eq!(ds.get_f64(1, "dbh"), Some(0.0));
    }
}
