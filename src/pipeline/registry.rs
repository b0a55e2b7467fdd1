use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::context::RunContext;
use super::outcome::StepOutcome;
use super::steps;
use crate::config::StepConfig;
use crate::error::SpiError;

/// One entry of the step order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub name: String,
    /// Human readable message the protocol lines start with
    pub message: String,
    /// Dotted path of the gating flag in the run configuration
    pub key: String,
    /// Registry id of the operation
    pub operation: String,
}

impl StepDescriptor {
    pub fn new(name: &str, message: &str, key: &str, operation: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
            key: key.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl From<StepConfig> for StepDescriptor {
    fn from(c: StepConfig) -> Self {
        Self {
            name: c.name,
            message: c.message,
            key: c.key,
            operation: c.operation,
        }
    }
}

/// Work done by a step.
pub trait StepOperation {
    fn run(&self, ctx: &mut RunContext) -> Result<StepOutcome, SpiError>;
}

impl<F> StepOperation for F
where
    F: Fn(&mut RunContext) -> Result<StepOutcome, SpiError>,
{
    fn run(&self, ctx: &mut RunContext) -> Result<StepOutcome, SpiError> {
        self(ctx)
    }
}

/// Built-in step order.
pub fn default_steps() -> Vec<StepDescriptor> {
    vec![
        StepDescriptor::new("init_unit", "Unit initialization", "init.unit", "init_unit"),
        StepDescriptor::new(
            "init_subregions",
            "Subregion initialization",
            "init.subregions",
            "init_subregions",
        ),
        StepDescriptor::new(
            "import_tables",
            "Import of tabular data",
            "import_csv.perform",
            "import_tables",
        ),
        StepDescriptor::new(
            "generate_plots",
            "Generation of sample plots",
            "generate.plots",
            "generate_plots",
        ),
        StepDescriptor::new(
            "compute_areas",
            "Computation of areas",
            "generate.areas",
            "compute_areas",
        ),
        StepDescriptor::new(
            "import_data",
            "Import of inventory data",
            "import_data.perform",
            "import_data",
        ),
        StepDescriptor::new("height_model", "Height model", "height_model.perform", "height_model"),
        StepDescriptor::new(
            "compute_indicators",
            "Computation of indicators",
            "compute.perform",
            "compute_indicators",
        ),
        StepDescriptor::new(
            "export_results",
            "Export of results",
            "export.perform",
            "export_results",
        ),
    ]
}

/// Operations by id.
#[derive(Default)]
pub struct Registry {
    operations: BTreeMap<String, Box<dyn StepOperation>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in operation.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("init_unit", steps::init_unit);
        registry.register("init_subregions", steps::init_subregions);
        registry.register("import_tables", steps::import_tables);
        registry.register("generate_plots", steps::generate_plots);
        registry.register("compute_areas", steps::compute_areas);
        registry.register("import_data", steps::import_data);
        registry.register("height_model", steps::height_model);
        registry.register("compute_indicators", steps::compute_indicators);
        registry.register("export_results", steps::export_results);
        registry
    }

    /// Register an operation, replacing any earlier one with the same id.
    pub fn register(&mut self, id: &str, operation: impl StepOperation + 'static) {
        self.operations.insert(id.to_string(), Box::new(operation));
    }

    pub fn get(&self, id: &str) -> Option<&dyn StepOperation> {
        self.operations.get(id).map(|op| op.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Check that every step names a registered operation.
    pub fn resolve(&self, steps: &[StepDescriptor]) -> Result<(), SpiError> {
        for step in steps {
            if self.get(&step.operation).is_none() {
                return Err(SpiError::UnknownStep(format!(
                    "'{}' of step '{}'",
                    step.operation, step.name
                )));
            }
        }
        Ok(())
    }
}
