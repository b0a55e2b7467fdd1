//! Built-in rule sets of the tabular inventory inputs.

use super::rules::{ColumnRule, RuleSet};

const LOCALITY_MAX: f64 = 999_999_999_999.0;

const YES_NO_CODES: &[&str] = &["100", "200"];
const OPTIONAL_YES_NO_CODES: &[&str] = &["", "100", "200"];
const TREE_STATUS_CODES: &[&str] = &["", "100", "200", "300", "400", "500", "600", "700"];

/// Names of the datasets that carry a rule set.
pub const RULED_DATASETS: &[&str] = &[
    "localities",
    "plots",
    "trees",
    "navigation",
    "model_heights",
    "model_heights_prev",
];

/// Rule set of a dataset, or `None` when the dataset is imported without schema.
pub fn rule_set(dataset: &str) -> Option<RuleSet> {
    let columns = match dataset {
        "localities" => localities(),
        "plots" => plots(),
        "trees" => trees(),
        "navigation" => navigation(),
        "model_heights" => model_heights("stem", "model_height"),
        "model_heights_prev" => model_heights("stem_prev", "model_height_prev"),
        _ => return None,
    };
    let dataset = RULED_DATASETS.iter().find(|d| **d == dataset).copied()?;
    Some(RuleSet { dataset, columns })
}

fn plot_address() -> Vec<ColumnRule> {
    vec![
        ColumnRule::integer("locality").range(0.0, LOCALITY_MAX),
        ColumnRule::integer("plot").range(1.0, 3.0),
    ]
}

fn localities() -> Vec<ColumnRule> {
    vec![
        ColumnRule::integer("locality").range(0.0, LOCALITY_MAX),
        ColumnRule::string("stratum").default(""),
        ColumnRule::string("config").default(""),
    ]
}

fn plots() -> Vec<ColumnRule> {
    let mut cols = plot_address();
    cols.extend([
        ColumnRule::float("stab_azimuth").range(0.0, 360.0).default(0.0),
        ColumnRule::float("stab_distance").range(0.0, 20.0).default(0.0),
        ColumnRule::integer("target_stock").range(0.0, 274.0).default(0i64),
        ColumnRule::float("max_stock").range(0.0, 11.1).default(0.0),
        ColumnRule::float("regeneration_period").range_or_zero(30.0, 60.0).default(0.0),
        ColumnRule::string("surveyor").max_length(40).default(""),
        ColumnRule::string("note").max_length(255).default(""),
        ColumnRule::string("status").one_of(YES_NO_CODES).default(""),
        ColumnRule::string("accessible").one_of(YES_NO_CODES).default(""),
        ColumnRule::string("stabilized").one_of(YES_NO_CODES).default(""),
        ColumnRule::string("land_category").one_of(YES_NO_CODES).default(""),
        ColumnRule::string("forest").one_of(&["100", "200", "300"]).default(""),
    ]);
    cols
}

fn trees() -> Vec<ColumnRule> {
    let mut cols = plot_address();
    cols.extend([
        ColumnRule::integer("stem").range(0.0, 999.0).nullable().default(0i64),
        ColumnRule::integer("stem_prev").range(0.0, 999.0).nullable().default(0i64),
        ColumnRule::float("x_m").nullable().optional(),
        ColumnRule::float("y_m").nullable().optional(),
        ColumnRule::float("distance").range(0.0, 50.0).nullable(),
        ColumnRule::float("azimuth").range(0.0, 360.0).nullable(),
        ColumnRule::float("dbh").range_or_zero(7.0, 800.0).nullable(),
        ColumnRule::float("dbh_prev").range_or_zero(7.0, 800.0).nullable(),
        ColumnRule::float("height").range_or_zero(1.3, 80.0).nullable(),
        ColumnRule::float("height_prev").range_or_zero(1.3, 80.0).nullable(),
        ColumnRule::float("model_height").range_or_zero(1.3, 80.0).nullable(),
        ColumnRule::float("model_height_prev").range_or_zero(1.3, 80.0).nullable(),
        ColumnRule::string("species").default(""),
        ColumnRule::string("status").one_of(TREE_STATUS_CODES).default(""),
        ColumnRule::string("status_prev").one_of(OPTIONAL_YES_NO_CODES).default(""),
        ColumnRule::string("note").max_length(255).default(""),
    ]);
    cols
}

fn navigation() -> Vec<ColumnRule> {
    let mut cols = plot_address();
    cols.extend([
        ColumnRule::integer("point").range(1.0, 2.0).nullable().default(0i64),
        ColumnRule::float("x_m").nullable().optional(),
        ColumnRule::float("y_m").nullable().optional(),
        ColumnRule::string("description").max_length(255).default(""),
    ]);
    cols
}

fn model_heights(stem: &'static str, height: &'static str) -> Vec<ColumnRule> {
    let mut cols = plot_address();
    cols.extend([
        ColumnRule::integer(stem).range(0.0, 999.0).nullable().default(0i64),
        ColumnRule::float(height).range_or_zero(1.3, 80.0).nullable(),
    ]);
    cols
}
