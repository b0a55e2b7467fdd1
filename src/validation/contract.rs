use serde::{Deserialize, Serialize};

use super::rules::{RuleSet, SemanticType};
use crate::models::{Dataset, Value};

/// A cell that could not be converted to its declared type. The original
/// value is left in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoercionIssue {
    pub column: String,
    pub row: usize,
    pub value: String,
    pub expected: String,
}

/// What coercion did to a dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoercionReport {
    /// `(column, number of nulls replaced by the column default)`
    pub defaults_filled: Vec<(String, usize)>,
    pub issues: Vec<CoercionIssue>,
}

/// One violation found by validation. `row` is `None` for dataset-level
/// failures such as a missing required column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureCase {
    pub column: String,
    pub row: Option<usize>,
    pub value: String,
    pub check: String,
}

impl std::fmt::Display for FailureCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.row {
            Some(row) => write!(
                f,
                "row {row}, column '{}': value '{}' fails {}",
                self.column, self.value, self.check
            ),
            None => write!(f, "column '{}': fails {}", self.column, self.check),
        }
    }
}

/// Result of validating a whole dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub dataset: String,
    pub checked_rows: usize,
    pub failures: Vec<FailureCase>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fill declared defaults into nulls, then convert every ruled column to its
/// semantic type.
pub fn coerce(dataset: &mut Dataset, rules: &RuleSet) -> CoercionReport {
    let mut report = CoercionReport::default();

    for rule in &rules.columns {
        let Some(default) = &rule.default else { continue };
        let Some(cells) = dataset.column_mut(rule.column) else { continue };
        let mut filled = 0;
        for cell in cells {
            if cell.is_null() {
                *cell = default.clone();
                filled += 1;
            }
        }
        if filled > 0 {
            report.defaults_filled.push((rule.column.to_string(), filled));
        }
    }

    for rule in &rules.columns {
        let Some(cells) = dataset.column_mut(rule.column) else { continue };
        for (row, cell) in cells.enumerate() {
            match coerce_value(cell, rule.semantic_type) {
                Some(converted) => *cell = converted,
                None => {
                    tracing::debug!(column = rule.column, row, value = %cell, "coercion failed");
                    report.issues.push(CoercionIssue {
                        column: rule.column.to_string(),
                        row,
                        value: cell.to_text(),
                        expected: rule.semantic_type.to_string(),
                    });
                }
            }
        }
    }

    report
}

/// Convert a cell; `None` when the value cannot represent the type.
fn coerce_value(value: &Value, target: SemanticType) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match target {
        SemanticType::String => Some(Value::Text(value.to_text())),
        SemanticType::Float => match value {
            Value::Float(_) => Some(value.clone()),
            Value::Integer(i) => Some(Value::Float(*i as f64)),
            Value::Text(s) => parse_number(s).map(Value::Float),
            _ => None,
        },
        SemanticType::Integer => match value {
            Value::Integer(_) => Some(value.clone()),
            Value::Float(f) => integral(*f).map(Value::Integer),
            Value::Text(s) => {
                let normalized = s.trim();
                match normalized.parse::<i64>() {
                    Ok(i) => Some(Value::Integer(i)),
                    Err(_) => parse_number(normalized).and_then(integral).map(Value::Integer),
                }
            }
            _ => None,
        },
        SemanticType::Boolean => match value {
            Value::Boolean(_) => Some(value.clone()),
            Value::Integer(0) => Some(Value::Boolean(false)),
            Value::Integer(1) => Some(Value::Boolean(true)),
            Value::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "y" | "a" => Some(Value::Boolean(true)),
                "false" | "0" | "no" | "n" => Some(Value::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
    }
}

/// Parse a number written with either a decimal comma or a decimal point.
pub fn parse_number(text: &str) -> Option<f64> {
    let normalized: String = text.trim().replace(' ', "").replace(',', ".");
    normalized.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn integral(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

/// Check every row against every rule and collect all violations.
pub fn validate(dataset: &Dataset, rules: &RuleSet) -> ValidationReport {
    let mut failures = Vec::new();

    for rule in &rules.columns {
        let Some(idx) = dataset.column_index(rule.column) else {
            if rule.required {
                failures.push(FailureCase {
                    column: rule.column.to_string(),
                    row: None,
                    value: String::new(),
                    check: "column_in_dataset".to_string(),
                });
            }
            continue;
        };

        for (row, cells) in dataset.rows.iter().enumerate() {
            // A short row reads as null
            let value = cells.get(idx).unwrap_or(&Value::Null);
            let check = if value.is_null() {
                (!rule.nullable).then(|| "not_nullable".to_string())
            } else if !rule.semantic_type.matches(value) {
                Some(format!("dtype('{}')", rule.semantic_type))
            } else if !rule.constraint.check(value) {
                Some(rule.constraint.to_string())
            } else {
                None
            };

            if let Some(check) = check {
                failures.push(FailureCase {
                    column: rule.column.to_string(),
                    row: Some(row),
                    value: value.to_text(),
                    check,
                });
            }
        }
    }

    ValidationReport {
        dataset: dataset.name.clone(),
        checked_rows: dataset.len(),
        failures,
    }
}
