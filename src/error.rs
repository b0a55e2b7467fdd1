use thiserror::Error;

/// Errors that can occur while running the inventory calculation.
#[derive(Error, Debug)]
pub enum SpiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Excel error: {0}")]
    Excel(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Unknown step operation: {0}")]
    UnknownStep(String),
}

impl From<calamine::Error> for SpiError {
    fn from(e: calamine::Error) -> Self {
        SpiError::Excel(e.to_string())
    }
}

impl From<calamine::XlsxError> for SpiError {
    fn from(e: calamine::XlsxError) -> Self {
        SpiError::Excel(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for SpiError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        SpiError::Excel(e.to_string())
    }
}

/// Render an error together with its chain of sources, one cause per line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = SpiError::from(io_err);
        let msg = err.to_string();
        assert!(msg.contains("IO error"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_excel_error_display() {
        let err = SpiError::Excel("bad sheet".to_string());
        assert_eq!(err.to_string(), "Excel error: bad sheet");
    }

    #[test]
    fn test_config_error_display() {
        let err = SpiError::ConfigError("missing unit code".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing unit code");
    }

    #[test]
    fn test_model_error_display() {
        let err = SpiError::ModelError("no usable height function".to_string());
        assert_eq!(err.to_string(), "Model error: no usable height function");
    }

    #[test]
    fn test_unknown_step_display() {
        let err = SpiError::UnknownStep("import_gsi".to_string());
        assert_eq!(err.to_string(), "Unknown step operation: import_gsi");
    }

    #[test]
    fn test_toml_error_from_conversion() {
        let result: Result<toml::Table, _> = toml::from_str("not = = valid");
        let spi_err: SpiError = result.unwrap_err().into();
        assert!(matches!(spi_err, SpiError::Toml(_)));
        assert!(spi_err.to_string().contains("TOML error"));
    }

    #[test]
    fn test_sqlite_error_from_conversion() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn.execute("select * from missing_table", []).unwrap_err();
        let spi_err: SpiError = err.into();
        assert!(matches!(spi_err, SpiError::Sqlite(_)));
    }

    #[test]
    fn test_error_chain_includes_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = SpiError::from(io_err);
        let chain = error_chain(&err);
        assert!(chain.starts_with("IO error: disk full"));
    }
}
