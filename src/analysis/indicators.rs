use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::statistics::{compute_ci, ConfidenceInterval};
use crate::error::SpiError;
use crate::models::{Occasion, PlotKey, SampleTree};

pub const DEFAULT_FORM_FACTOR: f64 = 0.45;
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

const SQUARE_METRES_PER_HA: f64 = 10_000.0;

/// Concentric circle of a sample plot on which trees from `min_dbh_cm` up are
/// recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Subplot {
    pub radius_m: f64,
    pub min_dbh_cm: f64,
}

/// Radius of the circle a tree of the given diameter is counted on: the
/// subplot with the largest threshold not above the diameter.
pub fn counting_radius(subplots: &[Subplot], dbh: f64) -> Option<f64> {
    subplots
        .iter()
        .filter(|s| s.radius_m > 0.0 && s.min_dbh_cm <= dbh)
        .max_by(|x, y| x.min_dbh_cm.total_cmp(&y.min_dbh_cm))
        .map(|s| s.radius_m)
}

/// Stem volume in m³ from diameter (cm), height (m) and form factor.
pub fn stem_volume(dbh_cm: f64, height_m: f64, form_factor: f64) -> f64 {
    form_factor * PI / 4.0 * (dbh_cm / 100.0).powi(2) * height_m
}

/// Height used for volume: the model height, or the measured one when the
/// tree has no model height.
fn volume_height(tree: &SampleTree, occasion: Occasion) -> Option<f64> {
    tree.model_height_on(occasion)
        .filter(|h| *h > 0.0)
        .or_else(|| tree.height_on(occasion).filter(|h| *h > 0.0))
}

/// Per-hectare volume one tree represents on an occasion, 0 when it cannot be
/// counted.
fn tree_volume_per_ha(tree: &SampleTree, subplots: &[Subplot], form_factor: f64, occasion: Occasion) -> f64 {
    let Some(dbh) = tree.dbh_on(occasion).filter(|d| *d > 0.0) else {
        return 0.0;
    };
    let (Some(height), Some(radius)) = (volume_height(tree, occasion), counting_radius(subplots, dbh)) else {
        return 0.0;
    };
    stem_volume(dbh, height, form_factor) * SQUARE_METRES_PER_HA / (PI * radius * radius)
}

/// Per-hectare values of one sample plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotEstimate {
    pub key: PlotKey,
    /// Living stock on the current occasion, m³/ha
    pub stock: f64,
    /// Living stock on the previous occasion, m³/ha
    pub stock_prev: f64,
    /// Volume of trees living previously but not now, m³/ha
    pub harvest: f64,
}

impl PlotEstimate {
    pub fn from_trees<'a>(
        key: PlotKey,
        trees: impl IntoIterator<Item = &'a SampleTree>,
        subplots: &[Subplot],
        form_factor: f64,
    ) -> Self {
        let mut estimate = PlotEstimate {
            key,
            stock: 0.0,
            stock_prev: 0.0,
            harvest: 0.0,
        };
        for tree in trees {
            if tree.is_living_on(Occasion::Current) {
                estimate.stock += tree_volume_per_ha(tree, subplots, form_factor, Occasion::Current);
            }
            if tree.is_living_on(Occasion::Previous) {
                let prev = tree_volume_per_ha(tree, subplots, form_factor, Occasion::Previous);
                estimate.stock_prev += prev;
                if !tree.is_living_on(Occasion::Current) {
                    estimate.harvest += prev;
                }
            }
        }
        estimate
    }

    /// Gross periodic increment per year.
    pub fn increment(&self, interval_years: f64) -> f64 {
        (self.stock - self.stock_prev + self.harvest) / interval_years
    }
}

/// Inputs of the indicator computation besides the plot estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorBasis {
    pub area_ha: f64,
    pub localities: usize,
    /// Sample trees with a measured height
    pub height_trees: usize,
    pub form_factor: f64,
    /// Years between the occasions; `None` computes the current occasion only.
    pub interval_years: Option<f64>,
    pub confidence: f64,
}

/// Inventory indicators of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub area_ha: f64,
    pub localities: usize,
    pub plots: usize,
    pub height_trees: usize,
    pub form_factor: f64,
    pub interval_years: Option<f64>,
    /// m³/ha
    pub stock: ConfidenceInterval,
    pub stock_prev: Option<ConfidenceInterval>,
    /// m³/ha over the interval
    pub harvest: Option<ConfidenceInterval>,
    /// m³/ha/year
    pub increment: Option<ConfidenceInterval>,
}

impl Indicators {
    pub fn compute(plots: &[PlotEstimate], basis: &IndicatorBasis) -> Result<Self, SpiError> {
        let stock_values: Vec<f64> = plots.iter().map(|p| p.stock).collect();
        let stock = compute_ci(&stock_values, basis.confidence)?;

        let (stock_prev, harvest, increment) = match basis.interval_years {
            Some(years) if years > 0.0 => {
                let prev: Vec<f64> = plots.iter().map(|p| p.stock_prev).collect();
                let harvest: Vec<f64> = plots.iter().map(|p| p.harvest).collect();
                let increment: Vec<f64> = plots.iter().map(|p| p.increment(years)).collect();
                (
                    Some(compute_ci(&prev, basis.confidence)?),
                    Some(compute_ci(&harvest, basis.confidence)?),
                    Some(compute_ci(&increment, basis.confidence)?),
                )
            }
            Some(years) => {
                return Err(SpiError::ConfigError(format!(
                    "Inventory interval must be positive, got {years}"
                )))
            }
            None => (None, None, None),
        };

        Ok(Indicators {
            area_ha: basis.area_ha,
            localities: basis.localities,
            plots: plots.len(),
            height_trees: basis.height_trees,
            form_factor: basis.form_factor,
            interval_years: basis.interval_years,
            stock,
            stock_prev,
            harvest,
            increment,
        })
    }

    pub fn stock_total(&self) -> f64 {
        self.stock.mean * self.area_ha
    }

    pub fn height_trees_per_plot(&self) -> f64 {
        if self.plots == 0 {
            0.0
        } else {
            self.height_trees as f64 / self.plots as f64
        }
    }

    /// Statutory precision and sample-size checks. Reported only; they never
    /// fail a run.
    pub fn compliance(&self) -> Vec<ComplianceCheck> {
        let mut checks = vec![ComplianceCheck {
            name: "Standard error of stock",
            value: self.stock.std_error,
            requirement: "below 25 m3/ha or 10 % of the mean".to_string(),
            passed: self.stock.std_error < 25.0 || self.stock.std_error < 0.1 * self.stock.mean,
        }];
        if let Some(increment) = &self.increment {
            checks.push(ComplianceCheck {
                name: "Standard error of increment",
                value: increment.std_error,
                requirement: "below 1 m3/ha/year or 10 % of the mean".to_string(),
                passed: increment.std_error < 1.0 || increment.std_error < 0.1 * increment.mean,
            });
        }
        checks.push(ComplianceCheck {
            name: "Number of localities",
            value: self.localities as f64,
            requirement: "more than 50".to_string(),
            passed: self.localities > 50,
        });
        checks.push(ComplianceCheck {
            name: "Height sample trees per plot",
            value: self.height_trees_per_plot(),
            requirement: "more than 2".to_string(),
            passed: self.height_trees_per_plot() > 2.0,
        });
        checks
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceCheck {
    pub name: &'static str,
    pub value: f64,
    pub requirement: String,
    pub passed: bool,
}
