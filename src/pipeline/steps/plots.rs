use crate::error::SpiError;
use crate::pipeline::context::RunContext;
use crate::pipeline::outcome::StepOutcome;
use crate::store::{PROC_GENERATE_GEOMETRY, PROC_GENERATE_SAMPLE_PLOTS};

fn call_procedure(ctx: &mut RunContext, procedure: &str) -> Result<StepOutcome, SpiError> {
    let plan = ctx.plan_id()?;
    let notices = ctx.store.call(procedure, &[("plan", plan.into())])?;
    for notice in &notices {
        ctx.protocol.log(notice);
    }
    Ok(StepOutcome::Success)
}

/// Rebuild the localities from the staged `localities` dataset and create
/// the sample plots of each locality configuration.
pub fn generate_plots(ctx: &mut RunContext) -> Result<StepOutcome, SpiError> {
    call_procedure(ctx, PROC_GENERATE_SAMPLE_PLOTS)
}

/// Plan area from the strata.
pub fn compute_areas(ctx: &mut RunContext) -> Result<StepOutcome, SpiError> {
    call_procedure(ctx, PROC_GENERATE_GEOMETRY)
}
