//! Validation contract of the tabular inputs: declared column rules, type
//! coercion and lazy validation that collects every violation.

mod contract;
mod rules;
mod schemas;

pub use contract::{
    coerce, parse_number, validate, CoercionIssue, CoercionReport, FailureCase, ValidationReport,
};
pub use rules::{in_range, range_or_zero, ColumnRule, Constraint, RuleSet, SemanticType};
pub use schemas::{rule_set, RULED_DATASETS};
