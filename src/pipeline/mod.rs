//! Step orchestration: the run context, the step registry, the executor and
//! the built-in steps.

mod context;
mod executor;
mod outcome;
mod protocol;
mod registry;
pub mod steps;

use std::path::Path;

pub use context::RunContext;
pub use executor::{Orchestrator, RunSummary};
pub use outcome::StepOutcome;
pub use protocol::{RunProtocol, Severity, PROTOCOL_FILE};
pub use registry::{default_steps, Registry, StepDescriptor, StepOperation};

use crate::config::ConfigSet;
use crate::error::{error_chain, SpiError};
use crate::store::SqliteStore;

/// Run the configured steps of a unit.
///
/// Configuration errors are returned before the protocol exists. Once it is
/// open every error is written to it first.
pub fn run_unit(config_dir: impl AsRef<Path>, unit: &str, debug: bool) -> Result<RunSummary, SpiError> {
    let config = ConfigSet::load(config_dir, unit)?;
    let mut protocol = RunProtocol::open(config.unit.output_dir().join(PROTOCOL_FILE))?
        .with_echo(true)
        .with_debug(debug);
    protocol.log(format!(
        "Run of unit {} ({}), plan valid from {}",
        config.unit.code, config.unit.name, config.unit.plan_valid_from
    ));

    let registry = Registry::with_defaults();
    let steps = match config.steps {
        Some(steps) => steps.into_iter().map(StepDescriptor::from).collect(),
        None => default_steps(),
    };
    let orchestrator = match Orchestrator::new(&registry, steps) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            protocol.error(error_chain(&e));
            protocol.error("processing terminated");
            return Err(e);
        }
    };

    let store = match SqliteStore::open(config.unit.database_path()) {
        Ok(store) => store,
        Err(e) => {
            protocol.error(error_chain(&e));
            protocol.error("processing terminated");
            return Err(e);
        }
    };

    let mut ctx = RunContext::new(config.unit, config.run, Box::new(store), protocol);
    let summary = orchestrator.run(&mut ctx);
    if summary.completed() {
        ctx.protocol.log("Run completed");
    }
    tracing::info!(
        performed = summary.performed.len(),
        skipped = summary.skipped.len(),
        stopped_at = ?summary.stopped_at,
        "run finished"
    );
    Ok(summary)
}
