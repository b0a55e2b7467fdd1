mod csv_io;
mod excel_io;
mod json_io;

use std::path::Path;

use crate::error::SpiError;
use crate::models::Dataset;

pub use csv_io::{
    format_cell, read_csv_dataset, read_csv_dataset_from_bytes, sniff_delimiter,
    write_csv_dataset, DEFAULT_DELIMITER,
};
pub use excel_io::{read_excel_dataset, write_excel_dataset};
pub use json_io::{read_json, write_json};

/// Trait for reading a tabular dataset from a file.
pub trait DatasetReader {
    fn read(&self, path: &Path, name: &str) -> Result<Dataset, SpiError>;
}

/// Trait for writing a tabular dataset to a file.
pub trait DatasetWriter {
    fn write(&self, dataset: &Dataset, path: &Path) -> Result<(), SpiError>;
}

/// `;`-separated CSV with decimal commas.
pub struct CsvFormat;

impl DatasetReader for CsvFormat {
    fn read(&self, path: &Path, name: &str) -> Result<Dataset, SpiError> {
        read_csv_dataset(path, name)
    }
}

impl DatasetWriter for CsvFormat {
    fn write(&self, dataset: &Dataset, path: &Path) -> Result<(), SpiError> {
        write_csv_dataset(dataset, path)
    }
}

/// Excel (.xlsx) workbook, first sheet.
pub struct ExcelFormat;

impl DatasetReader for ExcelFormat {
    fn read(&self, path: &Path, name: &str) -> Result<Dataset, SpiError> {
        read_excel_dataset(path, name)
    }
}

impl DatasetWriter for ExcelFormat {
    fn write(&self, dataset: &Dataset, path: &Path) -> Result<(), SpiError> {
        write_excel_dataset(dataset, path)
    }
}

/// Reader matching the file extension; anything but `.xlsx` is read as CSV.
pub fn reader_for(path: &Path) -> Box<dyn DatasetReader> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("xlsx") | Some("xlsm") => Box::new(ExcelFormat),
        _ => Box::new(CsvFormat),
    }
}

/// Read a dataset with the reader its extension selects.
pub fn read_dataset(path: impl AsRef<Path>, name: &str) -> Result<Dataset, SpiError> {
    let path = path.as_ref();
    reader_for(path).read(path, name)
}
