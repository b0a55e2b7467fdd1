use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use super::context::RunContext;
use super::outcome::StepOutcome;
use super::registry::{Registry, StepDescriptor, StepOperation};
use crate::error::{error_chain, SpiError};

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Record location and backtrace of a panic for the protocol, then hand the
/// panic to the hook that was installed before.
fn install_panic_recorder() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_default();
            let backtrace = std::backtrace::Backtrace::force_capture();
            PANIC_TRACE.with(|trace| {
                *trace.borrow_mut() = Some(format!("at {location}\n{backtrace}"));
            });
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// What happened to the steps of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Steps that were invoked, with their outcome, in run order.
    pub performed: Vec<(String, StepOutcome)>,
    /// Steps whose gating flag was off.
    pub skipped: Vec<String>,
    /// Step that terminated the run.
    pub stopped_at: Option<String>,
}

impl RunSummary {
    pub fn completed(&self) -> bool {
        self.stopped_at.is_none()
    }

    /// Process exit code: 1 when the run was terminated.
    pub fn exit_code(&self) -> i32 {
        if self.completed() {
            0
        } else {
            1
        }
    }

    pub fn outcome_of(&self, step: &str) -> Option<&StepOutcome> {
        self.performed
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, outcome)| outcome)
    }
}

/// Runs an ordered list of steps against a context.
pub struct Orchestrator<'r> {
    registry: &'r Registry,
    steps: Vec<StepDescriptor>,
}

impl<'r> Orchestrator<'r> {
    /// Resolve every step up front so an unknown operation fails before
    /// anything runs.
    pub fn new(registry: &'r Registry, steps: Vec<StepDescriptor>) -> Result<Self, SpiError> {
        registry.resolve(&steps)?;
        Ok(Self { registry, steps })
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn run(&self, ctx: &mut RunContext) -> RunSummary {
        install_panic_recorder();
        let mut summary = RunSummary::default();

        for step in &self.steps {
            if !ctx.run.flag(&step.key) {
                ctx.protocol.log(format!("{} was not performed", step.message));
                summary.skipped.push(step.name.clone());
                continue;
            }
            // Checked in new()
            let Some(operation) = self.registry.get(&step.operation) else {
                continue;
            };

            ctx.protocol.log(format!("{} >>>", step.message));
            tracing::info!(step = %step.name, "step started");
            let outcome = invoke(operation, step, ctx);
            tracing::info!(step = %step.name, code = outcome.code(), "step finished");

            let stop = match &outcome {
                StepOutcome::Success => {
                    ctx.protocol.log(format!("{} completed", step.message));
                    false
                }
                StepOutcome::Warning(detail) => {
                    ctx.protocol
                        .warn(format!("{} completed with warning: {detail}", step.message));
                    if ctx.run.ignore_warnings() {
                        ctx.protocol.log("warning ignored");
                        false
                    } else {
                        ctx.protocol.warn("processing terminated");
                        true
                    }
                }
                StepOutcome::Failure(reason) => {
                    ctx.protocol.error(format!("{} ended with error", step.message));
                    ctx.protocol.error(reason);
                    ctx.protocol.error("processing terminated");
                    true
                }
            };

            summary.performed.push((step.name.clone(), outcome));
            if stop {
                summary.stopped_at = Some(step.name.clone());
                break;
            }
        }
        summary
    }
}

/// Run one operation; errors and panics become failures with their trace
/// written to the protocol.
fn invoke(operation: &dyn StepOperation, step: &StepDescriptor, ctx: &mut RunContext) -> StepOutcome {
    PANIC_TRACE.with(|trace| trace.borrow_mut().take());
    match panic::catch_unwind(AssertUnwindSafe(|| operation.run(ctx))) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            tracing::error!(step = %step.name, "{err}");
            let chain = error_chain(&err);
            ctx.protocol.error(&chain);
            StepOutcome::failure(format!("{}: {err}", step.name))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(step = %step.name, "step panicked: {message}");
            ctx.protocol.error(format!("Unexpected error: {message}"));
            if let Some(trace) = PANIC_TRACE.with(|trace| trace.borrow_mut().take()) {
                ctx.protocol.error(trace);
            }
            StepOutcome::failure(format!("{}: unexpected error: {message}", step.name))
        }
    }
}
