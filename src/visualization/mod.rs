mod format;
mod tables;

pub use format::format_number;
pub use tables::{
    format_comparison, format_compliance, format_failure_cases, format_group_model,
    format_indicator_summary, print_comparison, print_failure_cases,
};
