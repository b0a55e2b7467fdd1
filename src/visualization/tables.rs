use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, ContentArrangement, Table};

use super::format::format_number;
use crate::analysis::{ComplianceCheck, ConfidenceInterval, GroupModel, Indicators, ModelComparison};
use crate::validation::ValidationReport;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Format every fitted and failed candidate of a comparison. The best fit
/// is marked with `*`.
pub fn format_comparison(comparison: &ModelComparison) -> String {
    let mut table = new_table(vec!["", "Function", "a", "b", "R²", "RMSE", "n"]);
    let best = comparison.best().map(|f| f.function);

    for fit in &comparison.fits {
        table.add_row(vec![
            Cell::new(if Some(fit.function) == best { "*" } else { "" }),
            Cell::new(fit.function.display_name()),
            Cell::new(format!("{:.5}", fit.a)),
            Cell::new(format!("{:.5}", fit.b)),
            Cell::new(format!("{:.4}", fit.r2)),
            Cell::new(format!("{:.4}", fit.rmse)),
            Cell::new(fit.sample_size),
        ]);
    }
    for failure in &comparison.failures {
        table.add_row(vec![
            Cell::new(""),
            Cell::new(failure.function().display_name()),
            Cell::new("failed"),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
        ]);
    }
    table.to_string()
}

/// Comparison table of one stratification group, headed by the group.
pub fn format_group_model(model: &GroupModel) -> String {
    let mut output = format!(
        "Height model of group '{}' ({} occasion, {} sample trees)\n",
        model.group, model.occasion, model.sample_size
    );
    output.push_str(&format_comparison(&model.comparison));
    output
}

/// Listing of validation failures, at most `limit` rows when given.
pub fn format_failure_cases(report: &ValidationReport, limit: Option<usize>) -> String {
    let mut table = new_table(vec!["Row", "Column", "Value", "Check"]);
    let shown = limit.unwrap_or(report.failures.len());
    for case in report.failures.iter().take(shown) {
        table.add_row(vec![
            Cell::new(case.row.map(|r| r.to_string()).unwrap_or_default()),
            Cell::new(&case.column),
            Cell::new(&case.value),
            Cell::new(&case.check),
        ]);
    }
    let mut output = table.to_string();
    if report.failures.len() > shown {
        output.push_str(&format!(
            "\n... and {} more failure cases",
            report.failures.len() - shown
        ));
    }
    output
}

fn interval_row(table: &mut Table, label: &str, unit: &str, ci: &ConfidenceInterval) {
    table.add_row(vec![
        Cell::new(label),
        Cell::new(format_number(ci.mean, 2)),
        Cell::new(format_number(ci.std_error, 2)),
        Cell::new(format!("{} – {}", format_number(ci.lower, 2), format_number(ci.upper, 2))),
        Cell::new(unit),
    ]);
}

/// Indicator table: per-hectare means with standard error and confidence
/// interval, plus totals over the plan area.
pub fn format_indicator_summary(indicators: &Indicators) -> String {
    let mut table = new_table(vec!["Indicator", "Value", "Std Error", "Interval", "Unit"]);
    let scalar = |table: &mut Table, label: &str, value: String, unit: &str| {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value),
            Cell::new(""),
            Cell::new(""),
            Cell::new(unit),
        ]);
    };

    scalar(&mut table, "Area", format_number(indicators.area_ha, 2), "ha");
    scalar(&mut table, "Sample plots", indicators.plots.to_string(), "");
    scalar(
        &mut table,
        "Stock",
        format_number(indicators.stock_total(), 0),
        "m³",
    );
    interval_row(&mut table, "Stock per ha", "m³/ha", &indicators.stock);
    if let Some(prev) = &indicators.stock_prev {
        interval_row(&mut table, "Previous stock per ha", "m³/ha", prev);
    }
    if let Some(harvest) = &indicators.harvest {
        interval_row(&mut table, "Harvest per ha", "m³/ha", harvest);
    }
    if let Some(increment) = &indicators.increment {
        scalar(
            &mut table,
            "Increment per year",
            format_number(increment.mean * indicators.area_ha, 0),
            "m³/year",
        );
        interval_row(&mut table, "Increment per ha and year", "m³/ha/year", increment);
    }

    let confidence = indicators.stock.confidence_level * 100.0;
    format!("{table}\nConfidence level: {confidence:.0} %")
}

/// Requirement checks with their outcome.
pub fn format_compliance(checks: &[ComplianceCheck]) -> String {
    let mut table = new_table(vec!["Requirement", "Value", "Limit", "Met"]);
    for check in checks {
        table.add_row(vec![
            Cell::new(check.name),
            Cell::new(format_number(check.value, 2)),
            Cell::new(&check.requirement),
            Cell::new(if check.passed { "yes" } else { "NO" }),
        ]);
    }
    table.to_string()
}

/// Print a comparison under a coloured title.
pub fn print_comparison(title: &str, comparison: &ModelComparison) {
    println!("\n{}", title.bold().green());
    println!("{}", format_comparison(comparison));
}

/// Print a failure listing under a coloured title.
pub fn print_failure_cases(report: &ValidationReport) {
    let title = format!(
        "Validation of '{}': {} rows, {} failure cases",
        report.dataset,
        report.checked_rows,
        report.failures.len()
    );
    if report.passed() {
        println!("\n{}", title.bold().green());
    } else {
        println!("\n{}", title.bold().yellow());
        println!("{}", format_failure_cases(report, None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::korf_sample;
    use crate::analysis::{compare, compute_ci, FitOptions, IndicatorBasis, PlotEstimate};
    use crate::models::{HeightFunction, PlotKey};
    use crate::validation::FailureCase;

    #[test]
    fn test_comparison_marks_best() {
        let (d, h) = korf_sample();
        let comparison = compare(&HeightFunction::ALL, &d, &h, &FitOptions::default());
        let text = format_comparison(&comparison);
        let best = comparison.best().unwrap().function.display_name();
        let marked = text.lines().find(|l| l.contains('*')).unwrap();
        assert!(marked.contains(best));
        assert_eq!(text.matches('*').count(), 1);
    }

    #[test]
    fn test_comparison_lists_failures() {
        let comparison = compare(
            &[HeightFunction::Korf],
            &[20.0],
            &[18.0],
            &FitOptions::default(),
        );
        let text = format_comparison(&comparison);
        assert!(text.contains("failed"));
        assert!(!text.contains('*'));
    }

    #[test]
    fn test_failure_listing_limited() {
        let report = ValidationReport {
            dataset: "trees".to_string(),
            checked_rows: 10,
            failures: (0..5)
                .map(|row| FailureCase {
                    column: "dbh".to_string(),
                    row: Some(row),
                    value: "900".to_string(),
                    check: "zero_or_in_range(7, 800)".to_string(),
                })
                .collect(),
        };
        let text = format_failure_cases(&report, Some(2));
        assert!(text.contains("zero_or_in_range(7, 800)"));
        assert!(text.ends_with("... and 3 more failure cases"));
    }

    #[test]
    fn test_indicator_summary_uses_czech_numbers() {
        let plots: Vec<PlotEstimate> = [310.0, 290.0, 305.0]
            .into_iter()
            .enumerate()
            .map(|(i, stock)| PlotEstimate {
                key: PlotKey { locality: i as i64, plot: 1 },
                stock,
                stock_prev: 0.0,
                harvest: 0.0,
            })
            .collect();
        let indicators = Indicators::compute(
            &plots,
            &IndicatorBasis {
                area_ha: 1200.0,
                localities: 3,
                height_trees: 9,
                form_factor: 0.45,
                interval_years: None,
                confidence: 0.95,
            },
        )
        .unwrap();
        let text = format_indicator_summary(&indicators);
        assert!(text.contains("1 200,00"));
        // 301.666 m³/ha over 1200 ha
        assert!(text.contains("362 000"));
        assert!(!text.contains("Increment"));
        assert!(text.ends_with("Confidence level: 95 %"));
    }

    #[test]
    fn test_compliance_table() {
        let ci = compute_ci(&[1.0, 2.0, 3.0], 0.95).unwrap();
        let checks = vec![ComplianceCheck {
            name: "Standard error of stock",
            value: ci.std_error,
            requirement: "below 25 m3/ha or 10 % of the mean".to_string(),
            passed: true,
        }];
        let text = format_compliance(&checks);
        assert!(text.contains("Standard error of stock"));
        assert!(text.contains("yes"));
    }
}
