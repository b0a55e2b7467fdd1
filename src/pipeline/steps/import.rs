use std::collections::{BTreeMap, BTreeSet};

use crate::error::SpiError;
use crate::io::read_dataset;
use crate::models::{sample_trees_from_dataset, Dataset, PlotKey};
use crate::pipeline::context::RunContext;
use crate::pipeline::outcome::StepOutcome;
use crate::store::NavigationPoint;
use crate::validation::{coerce, rule_set, validate};
use crate::visualization::format_failure_cases;

/// Staged datasets written into the inventory tables, in import order.
pub const INVENTORY_DATASETS: [&str; 3] = ["plots", "trees", "navigation"];

/// Read, type, validate and stage every dataset enabled under
/// `import_csv.data`.
pub fn import_tables(ctx: &mut RunContext) -> Result<StepOutcome, SpiError> {
    let datasets = ctx.run.enabled_keys("import_csv.data");
    for name in ctx.run.disabled_keys("import_csv.data") {
        ctx.protocol.log(format!("Dataset '{name}' ignored"));
    }
    if datasets.is_empty() {
        ctx.protocol.log("No datasets configured for import");
        return Ok(StepOutcome::Success);
    }

    let mut failed = Vec::new();
    for name in &datasets {
        let path = ctx.unit.dataset_path(name);
        if !path.is_file() {
            return Ok(StepOutcome::failure(format!(
                "File {} of dataset '{name}' does not exist",
                path.display()
            )));
        }
        let mut dataset = read_dataset(&path, name)?;
        ctx.protocol.log(format!(
            "Dataset '{name}': {} rows read from {}",
            dataset.len(),
            path.display()
        ));

        match rule_set(name) {
            Some(rules) => {
                let coercion = coerce(&mut dataset, &rules);
                for (column, filled) in &coercion.defaults_filled {
                    ctx.protocol
                        .detail(format!("{name}.{column}: default filled into {filled} rows"));
                }
                let mut unconverted: BTreeMap<(&str, &str), usize> = BTreeMap::new();
                for issue in &coercion.issues {
                    ctx.protocol.detail(format!(
                        "{name}.{}: row {} value '{}' is not {}",
                        issue.column, issue.row, issue.value, issue.expected
                    ));
                    *unconverted
                        .entry((issue.column.as_str(), issue.expected.as_str()))
                        .or_default() += 1;
                }
                for ((column, expected), count) in unconverted {
                    ctx.protocol.warn(format!(
                        "{name}.{column}: {count} values could not be converted to {expected}"
                    ));
                }

                let report = validate(&dataset, &rules);
                if report.passed() {
                    ctx.protocol.log(format!("Dataset '{name}' passed validation"));
                } else {
                    ctx.protocol.warn(format!(
                        "Dataset '{name}' failed validation with {} failure cases",
                        report.failures.len()
                    ));
                    ctx.protocol.warn(format_failure_cases(&report, None));
                    failed.push(name.as_str());
                }
            }
            None => ctx.protocol.log(format!("Dataset '{name}' processed without schema")),
        }

        ctx.store.replace_staging(&dataset)?;
    }

    if failed.is_empty() {
        Ok(StepOutcome::Success)
    } else {
        Ok(StepOutcome::warning(format!(
            "validation failed for {}",
            failed.join(", ")
        )))
    }
}

/// Plot keys of a dataset that match no generated sample plot.
fn orphan_plots(dataset: &Dataset, plots: &BTreeSet<PlotKey>) -> BTreeSet<PlotKey> {
    (0..dataset.len())
        .filter_map(|row| {
            Some(PlotKey {
                locality: dataset.get_i64(row, "locality")?,
                plot: dataset.get_i64(row, "plot")?,
            })
        })
        .filter(|key| !plots.contains(key))
        .collect()
}

fn navigation_points(dataset: &Dataset) -> Result<Vec<NavigationPoint>, SpiError> {
    (0..dataset.len())
        .map(|row| {
            let number = |column: &str| {
                dataset.get_i64(row, column).ok_or_else(|| {
                    SpiError::ParseError(format!(
                        "{}: row {row} has no {column} number",
                        dataset.name
                    ))
                })
            };
            Ok(NavigationPoint {
                key: PlotKey {
                    locality: number("locality")?,
                    plot: number("plot")?,
                },
                point: dataset.get_i64(row, "point").unwrap_or(0),
                x_m: dataset.get_f64(row, "x_m"),
                y_m: dataset.get_f64(row, "y_m"),
                description: dataset.get_text(row, "description"),
            })
        })
        .collect()
}

/// Move the staged plot, tree and navigation data into the inventory
/// tables. Every record must address a generated sample plot.
pub fn import_data(ctx: &mut RunContext) -> Result<StepOutcome, SpiError> {
    let plan = ctx.plan_id()?;
    let plots: BTreeSet<PlotKey> = ctx.store.plots(plan)?.into_iter().map(|p| p.key).collect();

    for name in INVENTORY_DATASETS {
        if !ctx.run.flag(&format!("import_data.{name}.perform")) {
            ctx.protocol.log(format!("Import of dataset '{name}' was not performed"));
            continue;
        }
        let Some(dataset) = ctx.store.staging(name)? else {
            return Ok(StepOutcome::failure(format!(
                "Dataset '{name}' has not been imported"
            )));
        };

        let orphans = orphan_plots(&dataset, &plots);
        if !orphans.is_empty() {
            ctx.protocol.error(format!(
                "Dataset '{name}' refers to {} sample plots that do not exist:",
                orphans.len()
            ));
            for key in &orphans {
                ctx.protocol.error(format!("  locality/plot {key}"));
            }
            return Ok(StepOutcome::failure(format!(
                "dataset '{name}' refers to unknown sample plots"
            )));
        }

        let records = match name {
            "plots" => ctx.store.update_plot_attributes(plan, &dataset)?,
            "trees" => {
                let trees = sample_trees_from_dataset(&dataset)?;
                ctx.store.replace_sample_trees(plan, &trees)?
            }
            _ => {
                let points = navigation_points(&dataset)?;
                ctx.store.replace_navigation_points(plan, &points)?
            }
        };
        ctx.protocol.log(format!("Dataset '{name}': {records} records imported"));
    }
    Ok(StepOutcome::Success)
}
