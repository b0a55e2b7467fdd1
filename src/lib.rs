pub mod analysis;
pub mod config;
pub mod error;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod validation;
pub mod visualization;

pub use analysis::{select_best, HeightModeler, Indicators};
pub use config::{ConfigSet, RunConfig, UnitConfig};
pub use error::SpiError;
pub use models::{Dataset, HeightFunction, SampleTree, Value};
pub use pipeline::{run_unit, Orchestrator, Registry, RunContext, RunProtocol, StepOutcome};
pub use store::{SqliteStore, Store};
