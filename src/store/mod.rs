//! Relational store of a run: reference data, staged imports, inventory
//! records and the procedures that derive plots, areas and indicators.

mod procedures;
mod schema;
mod sqlite;

use serde::{Deserialize, Serialize};

use crate::analysis::{HeightModelRecord, Indicators};
use crate::error::SpiError;
use crate::models::{Dataset, Occasion, PlotKey, SampleTree, Value};

pub use procedures::{PROC_COMPUTE_LHP, PROC_GENERATE_GEOMETRY, PROC_GENERATE_SAMPLE_PLOTS};
pub use sqlite::SqliteStore;

/// Tables the pipeline writes through [`Store::upsert`] or counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Company,
    Unit,
    Plan,
    ManagementGroup,
    ThicknessClassType,
    ThicknessClass,
    LocalityConfig,
    LocalityPlot,
    LocalitySubplot,
    Stratum,
    SubregionType,
    Subregion,
    Locality,
    Plot,
    SampleTree,
    NavigationPoint,
    HeightModel,
    Indicator,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Company => "company",
            Table::Unit => "unit",
            Table::Plan => "plan",
            Table::ManagementGroup => "management_group",
            Table::ThicknessClassType => "thickness_class_type",
            Table::ThicknessClass => "thickness_class",
            Table::LocalityConfig => "locality_config",
            Table::LocalityPlot => "locality_plot",
            Table::LocalitySubplot => "locality_subplot",
            Table::Stratum => "stratum",
            Table::SubregionType => "subregion_type",
            Table::Subregion => "subregion",
            Table::Locality => "locality",
            Table::Plot => "plot",
            Table::SampleTree => "sample_tree",
            Table::NavigationPoint => "navigation_point",
            Table::HeightModel => "height_model",
            Table::Indicator => "indicator",
        }
    }

    /// Columns that may be named in an upsert.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Company => &["registration", "name", "legal"],
            Table::Unit => &["company_id", "code", "name", "legal"],
            Table::Plan => &[
                "unit_id",
                "valid_from",
                "years",
                "repeated_inventory",
                "interval_years",
                "area_ha",
                "form_factor",
            ],
            Table::ManagementGroup => &["plan_id", "code", "name", "description"],
            Table::ThicknessClassType => &["company_id", "code", "description"],
            Table::ThicknessClass => &["class_type_id", "class", "min_dbh", "max_dbh"],
            Table::LocalityConfig => &["company_id", "code", "name"],
            Table::LocalityPlot => &["locality_config_id", "plot", "azimuth", "distance"],
            Table::LocalitySubplot => &["locality_plot_id", "subplot", "radius_m", "min_dbh_cm"],
            Table::Stratum => &["plan_id", "code", "description", "area_ha", "config"],
            Table::SubregionType => &["plan_id", "code", "name", "description"],
            Table::Subregion => &["subregion_type_id", "code", "name", "description"],
            Table::Locality => &["plan_id", "locality", "stratum", "config"],
            Table::Plot => &["plan_id", "locality", "plot", "stratum", "config", "azimuth", "distance"],
            Table::SampleTree => &[],
            Table::NavigationPoint => &[],
            Table::HeightModel => &[
                "plan_id",
                "grp",
                "occasion",
                "function",
                "a",
                "b",
                "r2",
                "rmse",
                "sample_size",
            ],
            Table::Indicator => &[
                "plan_id",
                "name",
                "mean",
                "std_error",
                "lower",
                "upper",
                "confidence",
                "sample_size",
                "sampling_error",
            ],
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A generated sample plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRecord {
    pub key: PlotKey,
    pub stratum: String,
    pub config: String,
    pub azimuth: f64,
    pub distance: f64,
}

/// Navigation point of a plot centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationPoint {
    pub key: PlotKey,
    pub point: i64,
    pub x_m: Option<f64>,
    pub y_m: Option<f64>,
    pub description: String,
}

/// A model height addressed by plot and stem number of one occasion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelHeight {
    pub key: PlotKey,
    pub stem: i64,
    pub height: f64,
}

/// Named arguments of a store procedure.
pub type ProcedureArgs<'a> = [(&'a str, Value)];

/// Persistence used by the pipeline steps. Every multi-row write is atomic.
pub trait Store {
    /// Insert a row or update the row with the same natural `key`; returns
    /// the row id either way.
    fn upsert(
        &mut self,
        table: Table,
        key: &[(&str, Value)],
        values: &[(&str, Value)],
    ) -> Result<i64, SpiError>;

    /// Id of the row with the given natural key.
    fn find(&self, table: Table, key: &[(&str, Value)]) -> Result<Option<i64>, SpiError>;

    fn count(&self, table: Table) -> Result<usize, SpiError>;

    /// Stage an imported dataset, replacing any earlier import of the same name.
    fn replace_staging(&mut self, dataset: &Dataset) -> Result<(), SpiError>;

    fn staging(&self, name: &str) -> Result<Option<Dataset>, SpiError>;

    /// Run a named procedure; returns the notices it raised.
    fn call(&mut self, procedure: &str, args: &ProcedureArgs) -> Result<Vec<String>, SpiError>;

    fn plots(&self, plan: i64) -> Result<Vec<PlotRecord>, SpiError>;

    /// Copy plot attributes from an imported `plots` dataset; returns the
    /// number of plots updated.
    fn update_plot_attributes(&mut self, plan: i64, plots: &Dataset) -> Result<usize, SpiError>;

    fn replace_sample_trees(&mut self, plan: i64, trees: &[SampleTree]) -> Result<usize, SpiError>;

    fn sample_trees(&self, plan: i64) -> Result<Vec<SampleTree>, SpiError>;

    fn update_model_heights(
        &mut self,
        plan: i64,
        occasion: Occasion,
        heights: &[ModelHeight],
    ) -> Result<usize, SpiError>;

    fn replace_navigation_points(
        &mut self,
        plan: i64,
        points: &[NavigationPoint],
    ) -> Result<usize, SpiError>;

    fn height_models(&self, plan: i64) -> Result<Vec<HeightModelRecord>, SpiError>;

    fn indicators(&self, plan: i64) -> Result<Option<Indicators>, SpiError>;
}
