use crate::analysis::Indicators;
use crate::error::{error_chain, SpiError};
use crate::models::Value;
use crate::pipeline::context::RunContext;
use crate::pipeline::outcome::StepOutcome;
use crate::pipeline::protocol::RunProtocol;
use crate::store::PROC_COMPUTE_LHP;
use crate::visualization::{format_indicator_summary, format_number};

const FORM_FACTOR_KEY: &str = "compute.parameters.form_factor";
const CONFIDENCE_KEY: &str = "compute.parameters.confidence";

/// Compute stock, harvest and increment of the plan and report them with
/// the statutory precision checks.
pub fn compute_indicators(ctx: &mut RunContext) -> Result<StepOutcome, SpiError> {
    let plan = ctx.plan_id()?;
    let mut args: Vec<(&str, Value)> = vec![("plan", plan.into())];

    if let Some(value) = ctx.run.lookup(FORM_FACTOR_KEY) {
        match ctx.run.f64_value(FORM_FACTOR_KEY) {
            Some(f) if f > 0.0 => args.push(("form_factor", f.into())),
            _ => {
                return Ok(StepOutcome::failure(format!(
                    "Form factor must be a positive number, got {value}"
                )))
            }
        }
    }
    if let Some(value) = ctx.run.lookup(CONFIDENCE_KEY) {
        match ctx.run.f64_value(CONFIDENCE_KEY) {
            Some(c) if c > 0.0 && c < 1.0 => args.push(("confidence", c.into())),
            _ => {
                return Ok(StepOutcome::failure(format!(
                    "Confidence level must lie between 0 and 1, got {value}"
                )))
            }
        }
    }

    let notices = match ctx.store.call(PROC_COMPUTE_LHP, &args) {
        Ok(notices) => notices,
        Err(e) => {
            ctx.protocol.error(error_chain(&e));
            return Ok(StepOutcome::failure(format!("Computation of indicators failed: {e}")));
        }
    };
    for notice in &notices {
        ctx.protocol.log(notice);
    }

    let Some(indicators) = ctx.store.indicators(plan)? else {
        return Ok(StepOutcome::failure("No indicators were stored"));
    };
    report(&mut ctx.protocol, &indicators);
    Ok(StepOutcome::Success)
}

fn report(protocol: &mut RunProtocol, indicators: &Indicators) {
    let area = indicators.area_ha;
    protocol.log(format!(
        "Stock: {} m³, {} m³/ha",
        format_number(indicators.stock_total(), 0),
        format_number(indicators.stock.mean, 2)
    ));
    protocol.log(format!(
        "Standard error of stock: {} m³/ha",
        format_number(indicators.stock.std_error, 2)
    ));
    if let Some(prev) = &indicators.stock_prev {
        protocol.log(format!(
            "Previous stock: {} m³, {} m³/ha",
            format_number(prev.mean * area, 0),
            format_number(prev.mean, 2)
        ));
    }
    if let Some(harvest) = &indicators.harvest {
        protocol.log(format!(
            "Harvest: {} m³, {} m³/ha",
            format_number(harvest.mean * area, 0),
            format_number(harvest.mean, 2)
        ));
    }
    if let Some(increment) = &indicators.increment {
        protocol.log(format!(
            "Increment: {} m³/year, {} m³/ha/year",
            format_number(increment.mean * area, 0),
            format_number(increment.mean, 2)
        ));
        protocol.log(format!(
            "Standard error of increment: {} m³/ha/year",
            format_number(increment.std_error, 2)
        ));
    }
    protocol.detail(format_indicator_summary(indicators));

    for check in indicators.compliance() {
        let line = format!(
            "{}: {} ({})",
            check.name,
            format_number(check.value, 2),
            check.requirement
        );
        if check.passed {
            protocol.log(format!("{line} met"));
        } else {
            protocol.warn(format!("{line} NOT met"));
        }
    }
}
