use serde::{Deserialize, Serialize};

use super::dataset::Dataset;
use super::value::Value;
use crate::error::SpiError;

/// Status code of a living, standing tree.
pub const STATUS_LIVING: &str = "100";

/// Inventory occasion a measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occasion {
    Current,
    Previous,
}

impl Occasion {
    pub fn label(&self) -> &'static str {
        match self {
            Occasion::Current => "current",
            Occasion::Previous => "previous",
        }
    }
}

impl std::fmt::Display for Occasion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Occasion {
    type Err = crate::error::SpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "current" => Ok(Occasion::Current),
            "previous" => Ok(Occasion::Previous),
            _ => Err(crate::error::SpiError::ParseError(format!(
                "Unknown inventory occasion: '{s}'"
            ))),
        }
    }
}

/// Address of a sample plot: locality number and plot number within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlotKey {
    pub locality: i64,
    pub plot: i64,
}

impl std::fmt::Display for PlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.locality, self.plot)
    }
}

/// A sample tree measured on a plot, with both inventory occasions.
///
/// Diameters in cm, heights in m. A stem number of 0 means the tree did not
/// exist (or was not numbered) on that occasion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTree {
    pub locality: i64,
    pub plot: i64,
    pub stem: i64,
    pub stem_prev: i64,
    pub species: String,
    pub dbh: Option<f64>,
    pub dbh_prev: Option<f64>,
    /// Measured height
    pub height: Option<f64>,
    pub height_prev: Option<f64>,
    /// Height from the height model
    pub model_height: Option<f64>,
    pub model_height_prev: Option<f64>,
    pub status: String,
    pub status_prev: String,
    pub distance: Option<f64>,
    pub azimuth: Option<f64>,
    pub note: String,
}

impl SampleTree {
    pub fn plot_key(&self) -> PlotKey {
        PlotKey {
            locality: self.locality,
            plot: self.plot,
        }
    }

    pub fn stem_on(&self, occasion: Occasion) -> i64 {
        match occasion {
            Occasion::Current => self.stem,
            Occasion::Previous => self.stem_prev,
        }
    }

    pub fn dbh_on(&self, occasion: Occasion) -> Option<f64> {
        match occasion {
            Occasion::Current => self.dbh,
            Occasion::Previous => self.dbh_prev,
        }
    }

    pub fn height_on(&self, occasion: Occasion) -> Option<f64> {
        match occasion {
            Occasion::Current => self.height,
            Occasion::Previous => self.height_prev,
        }
    }

    pub fn model_height_on(&self, occasion: Occasion) -> Option<f64> {
        match occasion {
            Occasion::Current => self.model_height,
            Occasion::Previous => self.model_height_prev,
        }
    }

    pub fn set_model_height(&mut self, occasion: Occasion, value: Option<f64>) {
        match occasion {
            Occasion::Current => self.model_height = value,
            Occasion::Previous => self.model_height_prev = value,
        }
    }

    /// Whether the tree stood alive on the given occasion.
    pub fn is_living_on(&self, occasion: Occasion) -> bool {
        match occasion {
            Occasion::Current => self.status == STATUS_LIVING,
            Occasion::Previous => self.stem_prev > 0 && self.status_prev == STATUS_LIVING,
        }
    }

    /// Whether the tree belongs to the height-model sample of an occasion:
    /// a numbered stem with a positive diameter.
    pub fn in_model_sample(&self, occasion: Occasion) -> bool {
        self.stem_on(occasion) > 0 && self.dbh_on(occasion).is_some_and(|d| d > 0.0)
    }

    /// Whether a model height is missing for a tree that needs one.
    pub fn lacks_model_height(&self, occasion: Occasion) -> bool {
        self.is_living_on(occasion) && self.model_height_on(occasion).unwrap_or(0.0) <= 0.0
    }
}

/// Columns of the tabular form of sample trees, in export order.
pub const TREE_COLUMNS: &[&str] = &[
    "locality",
    "plot",
    "stem",
    "stem_prev",
    "species",
    "dbh",
    "dbh_prev",
    "height",
    "height_prev",
    "model_height",
    "model_height_prev",
    "status",
    "status_prev",
    "distance",
    "azimuth",
    "note",
];

/// Build sample trees from a coerced `trees` dataset. Every row needs a
/// locality and a plot number.
pub fn sample_trees_from_dataset(dataset: &Dataset) -> Result<Vec<SampleTree>, SpiError> {
    (0..dataset.len())
        .map(|row| {
            let address = |column: &str| {
                dataset.get_i64(row, column).ok_or_else(|| {
                    SpiError::ParseError(format!(
                        "{}: row {row} has no {column} number",
                        dataset.name
                    ))
                })
            };
            Ok(SampleTree {
                locality: address("locality")?,
                plot: address("plot")?,
                stem: dataset.get_i64(row, "stem").unwrap_or(0),
                stem_prev: dataset.get_i64(row, "stem_prev").unwrap_or(0),
                species: dataset.get_text(row, "species"),
                dbh: dataset.get_f64(row, "dbh"),
                dbh_prev: dataset.get_f64(row, "dbh_prev"),
                height: dataset.get_f64(row, "height"),
                height_prev: dataset.get_f64(row, "height_prev"),
                model_height: dataset.get_f64(row, "model_height"),
                model_height_prev: dataset.get_f64(row, "model_height_prev"),
                status: dataset.get_text(row, "status"),
                status_prev: dataset.get_text(row, "status_prev"),
                distance: dataset.get_f64(row, "distance"),
                azimuth: dataset.get_f64(row, "azimuth"),
                note: dataset.get_text(row, "note"),
            })
        })
        .collect()
}

pub fn sample_trees_to_dataset<'a>(
    name: &str,
    trees: impl IntoIterator<Item = &'a SampleTree>,
) -> Dataset {
    let mut dataset = Dataset::new(name, TREE_COLUMNS.iter().map(|c| c.to_string()).collect());
    for t in trees {
        dataset.push_row(vec![
            Value::Integer(t.locality),
            Value::Integer(t.plot),
            Value::Integer(t.stem),
            Value::Integer(t.stem_prev),
            Value::from(t.species.as_str()),
            Value::from(t.dbh),
            Value::from(t.dbh_prev),
            Value::from(t.height),
            Value::from(t.height_prev),
            Value::from(t.model_height),
            Value::from(t.model_height_prev),
            Value::from(t.status.as_str()),
            Value::from(t.status_prev.as_str()),
            Value::from(t.distance),
            Value::from(t.azimuth),
            Value::from(t.note.as_str()),
        ]);
    }
    dataset
}
