//! Unit, run and step configuration files.
//!
//! A run reads `<UNIT>.toml` (the unit and its plan), `<UNIT>_run.toml`
//! (which steps run and with what options) and optionally `steps.toml` (the
//! step order) from one configuration directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::Subplot;
use crate::error::SpiError;

/// Configuration of a forest management unit and its plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub code: String,
    pub name: String,
    pub company_id: String,
    pub company_name: String,
    #[serde(default)]
    pub legal: String,
    pub plan_valid_from: toml::value::Datetime,
    pub plan_years: u32,
    #[serde(default)]
    pub repeated_inventory: bool,
    #[serde(default)]
    pub inventory_interval_years: Option<f64>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite file; `<data_dir>/spi.db` when not set.
    #[serde(default)]
    pub database: Option<PathBuf>,
    pub thickness_classes: ThicknessClassConfig,
    #[serde(default)]
    pub management_groups: BTreeMap<String, ManagementGroupConfig>,
    #[serde(default)]
    pub locality_configs: BTreeMap<String, LocalityConfig>,
    #[serde(default)]
    pub strata: BTreeMap<String, StratumConfig>,
    #[serde(default)]
    pub subregions: BTreeMap<String, SubregionTypeConfig>,
    /// Species code to height-model group.
    #[serde(default)]
    pub species_groups: BTreeMap<String, String>,
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThicknessClassConfig {
    pub first: i64,
    /// Exclusive
    pub last: i64,
    pub interval: i64,
}

/// One diameter class, bounds in cm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThicknessClass {
    pub class: i64,
    pub min_dbh: f64,
    pub max_dbh: f64,
}

impl ThicknessClassConfig {
    /// Classes `first, first + interval, ..` below `last`; class `i` spans
    /// `[i - interval/2 + 0.1, i + interval/2]`.
    pub fn classes(&self) -> Vec<ThicknessClass> {
        if self.interval <= 0 {
            return Vec::new();
        }
        let half = self.interval as f64 / 2.0;
        (self.first..self.last)
            .step_by(self.interval as usize)
            .map(|class| ThicknessClass {
                class,
                min_dbh: class as f64 - half + 0.1,
                max_dbh: class as f64 + half,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementGroupConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Layout of the sample plots of a locality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalityConfig {
    pub name: String,
    /// Keyed by plot number.
    #[serde(default)]
    pub plots: BTreeMap<String, PlotLayout>,
}

/// Position of a plot centre relative to the locality centre, and its
/// concentric subplots keyed by subplot number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotLayout {
    #[serde(default)]
    pub azimuth: f64,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub subplots: BTreeMap<String, Subplot>,
}

impl PlotLayout {
    pub fn subplot_list(&self) -> Vec<Subplot> {
        self.subplots.values().copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumConfig {
    pub description: String,
    pub area_ha: f64,
    /// Locality configuration used by localities of this stratum.
    #[serde(default)]
    pub config: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubregionTypeConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub areas: BTreeMap<String, SubregionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubregionConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub file: PathBuf,
}

/// Parse a plot or subplot number used as a table key.
pub fn parse_number_key(kind: &str, key: &str) -> Result<i64, SpiError> {
    key.trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| SpiError::ConfigError(format!("{kind} key '{key}' is not a positive number")))
}

impl UnitConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SpiError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SpiError::ConfigError(format!("Cannot read unit configuration {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SpiError> {
        let config: UnitConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks serde cannot express.
    pub fn validate(&self) -> Result<(), SpiError> {
        if self.code.trim().is_empty() {
            return Err(SpiError::ConfigError("Unit code must not be empty".to_string()));
        }
        if self.plan_years == 0 {
            return Err(SpiError::ConfigError("plan_years must be positive".to_string()));
        }
        let tc = &self.thickness_classes;
        if tc.interval <= 0 || tc.first >= tc.last {
            return Err(SpiError::ConfigError(format!(
                "Invalid thickness classes: first {}, last {}, interval {}",
                tc.first, tc.last, tc.interval
            )));
        }
        if self.repeated_inventory && self.interval_years().is_none() {
            return Err(SpiError::ConfigError(
                "A repeated inventory needs a positive inventory_interval_years".to_string(),
            ));
        }
        for (code, locality) in &self.locality_configs {
            for (plot, layout) in &locality.plots {
                parse_number_key("Plot", plot)?;
                for subplot in layout.subplots.keys() {
                    parse_number_key("Subplot", subplot)?;
                }
                if layout.subplots.values().any(|s| s.radius_m <= 0.0) {
                    return Err(SpiError::ConfigError(format!(
                        "Locality configuration '{code}', plot {plot}: subplot radius must be positive"
                    )));
                }
            }
        }
        for (code, stratum) in &self.strata {
            if !stratum.config.is_empty() && !self.locality_configs.contains_key(&stratum.config) {
                return Err(SpiError::ConfigError(format!(
                    "Stratum '{code}' refers to unknown locality configuration '{}'",
                    stratum.config
                )));
            }
        }
        Ok(())
    }

    /// Interval between the two occasions when the inventory is repeated.
    pub fn interval_years(&self) -> Option<f64> {
        self.inventory_interval_years.filter(|y| *y > 0.0)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir.join("spi.db"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    /// Input file of a dataset: configured name or `<dataset>.csv`, relative
    /// to the data directory.
    pub fn dataset_path(&self, dataset: &str) -> PathBuf {
        let file = self
            .datasets
            .get(dataset)
            .map(|d| d.file.clone())
            .unwrap_or_else(|| PathBuf::from(format!("{dataset}.csv")));
        if file.is_absolute() {
            file
        } else {
            self.data_dir.join(file)
        }
    }

    /// Height-model group of a species; species without a mapping form a
    /// group of their own.
    pub fn species_group(&self, species: &str) -> String {
        self.species_groups
            .get(species)
            .cloned()
            .unwrap_or_else(|| species.to_string())
    }
}

/// Run configuration: an arbitrary nested table whose values gate and
/// parameterise the steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfig {
    table: toml::Table,
}

/// Truthiness of a configuration value.
pub fn truthy(value: &toml::Value) -> bool {
    match value {
        toml::Value::Boolean(b) => *b,
        toml::Value::Integer(i) => *i != 0,
        toml::Value::Float(f) => *f != 0.0,
        toml::Value::String(s) => !s.is_empty(),
        toml::Value::Array(a) => !a.is_empty(),
        toml::Value::Table(t) => !t.is_empty(),
        toml::Value::Datetime(_) => true,
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SpiError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SpiError::ConfigError(format!("Cannot read run configuration {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SpiError> {
        Ok(Self {
            table: toml::from_str(raw)?,
        })
    }

    pub fn from_table(table: toml::Table) -> Self {
        Self { table }
    }

    /// Value at a dotted path; `None` when any segment is missing.
    pub fn lookup(&self, path: &str) -> Option<&toml::Value> {
        let mut segments = path.split('.');
        let mut current = self.table.get(segments.next()?)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }
        Some(current)
    }

    /// Whether the value at `path` is set and truthy.
    pub fn flag(&self, path: &str) -> bool {
        self.lookup(path).is_some_and(truthy)
    }

    pub fn ignore_warnings(&self) -> bool {
        self.flag("ignore_warnings")
    }

    pub fn str_value(&self, path: &str) -> Option<&str> {
        self.lookup(path).and_then(toml::Value::as_str)
    }

    pub fn f64_value(&self, path: &str) -> Option<f64> {
        match self.lookup(path)? {
            toml::Value::Float(f) => Some(*f),
            toml::Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Keys of the table at `path` whose values are truthy, in key order. A
    /// list of names is accepted as well.
    pub fn enabled_keys(&self, path: &str) -> Vec<String> {
        match self.lookup(path) {
            Some(toml::Value::Table(t)) => t
                .iter()
                .filter(|(_, v)| truthy(v))
                .map(|(k, _)| k.clone())
                .collect(),
            Some(toml::Value::Array(a)) => a
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Keys of the table at `path` whose values are falsy, in key order.
    pub fn disabled_keys(&self, path: &str) -> Vec<String> {
        match self.lookup(path) {
            Some(toml::Value::Table(t)) => t
                .iter()
                .filter(|(_, v)| !truthy(v))
                .map(|(k, _)| k.clone())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// One entry of `steps.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    pub message: String,
    pub key: String,
    pub operation: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StepsFile {
    steps: Vec<StepConfig>,
}

/// Read the step order; `None` when the file does not exist.
pub fn load_steps(path: impl AsRef<Path>) -> Result<Option<Vec<StepConfig>>, SpiError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    let file: StepsFile = toml::from_str(&raw)?;
    Ok(Some(file.steps))
}

/// Everything a run reads from the configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigSet {
    pub unit: UnitConfig,
    pub run: RunConfig,
    pub steps: Option<Vec<StepConfig>>,
}

impl ConfigSet {
    pub fn load(config_dir: impl AsRef<Path>, unit: &str) -> Result<Self, SpiError> {
        let dir = config_dir.as_ref();
        Ok(Self {
            unit: UnitConfig::load(dir.join(format!("{unit}.toml")))?,
            run: RunConfig::load(dir.join(format!("{unit}_run.toml")))?,
            steps: load_steps(dir.join("steps.toml"))?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const UNIT_TOML: &str = r#"
code = "LHC01"
name = "Training forest"
company_id = "12345678"
company_name = "Forest Estate Ltd."
legal = "CZ"
plan_valid_from = 2025-01-01
plan_years = 10
repeated_inventory = true
inventory_interval_years = 10
data_dir = "data"

[thickness_classes]
first = 8
last = 20
interval = 4

[management_groups.A]
name = "Spruce stands"

[locality_configs.K1]
name = "Three plots"

[locality_configs.K1.plots.1]
azimuth = 0
distance = 0

[locality_configs.K1.plots.1.subplots.1]
radius_m = 3.0
min_dbh_cm = 7.0

[locality_configs.K1.plots.1.subplots.2]
radius_m = 12.62
min_dbh_cm = 12.0

[strata.S1]
description = "Production forest"
area_ha = 850.5
config = "K1"

[subregions.OWN]
name = "Ownership"

[subregions.OWN.areas.P1]
name = "Parcel 1"

[species_groups]
SM = "conifers"
JD = "conifers"
"#;

    #[test]
    fn test_unit_config_parses() {
        let unit = UnitConfig::from_toml_str(UNIT_TOML).unwrap();
        assert_eq!(unit.code, "LHC01");
        assert_eq!(unit.plan_valid_from.to_string(), "2025-01-01");
        assert_eq!(unit.interval_years(), Some(10.0));
        assert_eq!(unit.locality_configs["K1"].plots["1"].subplots.len(), 2);
        assert_eq!(unit.strata["S1"].area_ha, 850.5);
        assert_eq!(unit.database_path(), PathBuf::from("data/spi.db"));
        assert_eq!(unit.dataset_path("trees"), PathBuf::from("data/trees.csv"));
    }

    #[test]
    fn test_thickness_classes_exclude_last() {
        let unit = UnitConfig::from_toml_str(UNIT_TOML).unwrap();
        let classes = unit.thickness_classes.classes();
        let ids: Vec<i64> = classes.iter().map(|c| c.class).collect();
        assert_eq!(ids, vec![8, 12, 16]);
        assert!((classes[0].min_dbh - 6.1).abs() < 1e-9);
        assert!((classes[0].max_dbh - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_species_groups_fall_back_to_species() {
        let unit = UnitConfig::from_toml_str(UNIT_TOML).unwrap();
        assert_eq!(unit.species_group("SM"), "conifers");
        assert_eq!(unit.species_group("BK"), "BK");
    }

    #[test]
    fn test_unknown_stratum_config_rejected() {
        let raw = UNIT_TOML.replace("config = \"K1\"", "config = \"K9\"");
        let err = UnitConfig::from_toml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("K9"));
    }

    #[test]
    fn test_bad_plot_key_rejected() {
        let raw = UNIT_TOML.replace("[locality_configs.K1.plots.1]", "[locality_configs.K1.plots.first]")
            .replace("[locality_configs.K1.plots.1.subplots", "[locality_configs.K1.plots.first.subplots");
        assert!(UnitConfig::from_toml_str(&raw).is_err());
    }

    #[test]
    fn test_repeated_inventory_needs_interval() {
        let raw = UNIT_TOML.replace("inventory_interval_years = 10\n", "");
        assert!(matches!(
            UnitConfig::from_toml_str(&raw),
            Err(SpiError::ConfigError(_))
        ));
    }

    #[test]
    fn test_run_config_flags() {
        let run = RunConfig::from_toml_str(
            r#"
ignore_warnings = false
[init]
unit = true
subregions = 0
[import_csv]
perform = 1
data = { trees = true, plots = 1, navigation = false }
[height_model]
perform = "yes"
source = "compute"
[compute.parameters]
form_factor = 0.42
"#,
        )
        .unwrap();
        assert!(run.flag("init.unit"));
        assert!(!run.flag("init.subregions"));
        assert!(run.flag("import_csv.perform"));
        assert!(run.flag("height_model.perform"));
        assert!(!run.flag("export.perform"));
        assert!(!run.flag("init.unit.deeper"));
        assert!(!run.ignore_warnings());
        assert_eq!(run.str_value("height_model.source"), Some("compute"));
        assert_eq!(run.f64_value("compute.parameters.form_factor"), Some(0.42));
        assert_eq!(run.enabled_keys("import_csv.data"), vec!["plots", "trees"]);
        assert_eq!(run.disabled_keys("import_csv.data"), vec!["navigation"]);
        assert!(run.disabled_keys("height_model.source").is_empty());
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&toml::Value::String(String::new())));
        assert!(truthy(&toml::Value::Float(0.5)));
        assert!(!truthy(&toml::Value::Array(vec![])));
    }

    #[test]
    fn test_steps_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_steps(dir.path().join("steps.toml")).unwrap().is_none());

        let path = dir.path().join("steps.toml");
        std::fs::write(
            &path,
            r#"
[[steps]]
name = "unit"
message = "Unit initialization"
key = "init.unit"
operation = "init_unit"
"#,
        )
        .unwrap();
        let steps = load_steps(&path).unwrap().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].operation, "init_unit");
    }
}
