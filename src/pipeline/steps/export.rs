use serde::Serialize;

use crate::analysis::{ComplianceCheck, HeightModelRecord, Indicators};
use crate::error::SpiError;
use crate::io::{write_csv_dataset, write_excel_dataset, write_json};
use crate::models::{sample_trees_to_dataset, Dataset, Value};
use crate::pipeline::context::RunContext;
use crate::pipeline::outcome::StepOutcome;

pub const SAMPLE_TREES_FILE: &str = "sample_trees";
pub const HEIGHT_MODELS_FILE: &str = "height_models.csv";
pub const INDICATORS_FILE: &str = "indicators.json";

#[derive(Serialize)]
struct IndicatorExport<'a> {
    unit: &'a str,
    plan_valid_from: String,
    indicators: &'a Indicators,
    compliance: Vec<ComplianceCheck>,
}

fn height_model_dataset(models: &[HeightModelRecord]) -> Dataset {
    let columns = ["group", "occasion", "function", "a", "b", "r2", "rmse", "sample_size"];
    let mut dataset = Dataset::new("height_models", columns.iter().map(|c| c.to_string()).collect());
    for m in models {
        dataset.push_row(vec![
            Value::from(m.group.as_str()),
            Value::from(m.occasion.label()),
            Value::from(m.function.id()),
            Value::from(m.a),
            Value::from(m.b),
            Value::from(m.r2),
            Value::from(m.rmse),
            Value::Integer(m.sample_size as i64),
        ]);
    }
    dataset
}

/// Write the sample trees, height models and indicators of the plan in the
/// enabled formats.
pub fn export_results(ctx: &mut RunContext) -> Result<StepOutcome, SpiError> {
    let plan = ctx.plan_id()?;
    let csv = ctx.run.flag("export.csv");
    let excel = ctx.run.flag("export.excel");
    let json = ctx.run.flag("export.json");
    if !(csv || excel || json) {
        ctx.protocol.log("No export format enabled");
        return Ok(StepOutcome::Success);
    }

    let dir = ctx.unit.output_dir();
    std::fs::create_dir_all(&dir)?;
    let mut written: Vec<String> = Vec::new();

    if csv || excel {
        let trees = ctx.store.sample_trees(plan)?;
        let dataset = sample_trees_to_dataset(SAMPLE_TREES_FILE, &trees);
        if csv {
            let path = dir.join(format!("{SAMPLE_TREES_FILE}.csv"));
            write_csv_dataset(&dataset, &path)?;
            written.push(path.display().to_string());

            let models = ctx.store.height_models(plan)?;
            let path = dir.join(HEIGHT_MODELS_FILE);
            write_csv_dataset(&height_model_dataset(&models), &path)?;
            written.push(path.display().to_string());
        }
        if excel {
            let path = dir.join(format!("{SAMPLE_TREES_FILE}.xlsx"));
            write_excel_dataset(&dataset, &path)?;
            written.push(path.display().to_string());
        }
    }

    let mut outcome = StepOutcome::Success;
    if json {
        match ctx.store.indicators(plan)? {
            Some(indicators) => {
                let export = IndicatorExport {
                    unit: &ctx.unit.code,
                    plan_valid_from: ctx.unit.plan_valid_from.to_string(),
                    indicators: &indicators,
                    compliance: indicators.compliance(),
                };
                let path = dir.join(INDICATORS_FILE);
                write_json(&export, &path, true)?;
                written.push(path.display().to_string());
            }
            None => {
                outcome = StepOutcome::warning("no indicators to export; enable their computation");
            }
        }
    }

    for path in &written {
        ctx.protocol.log(format!("Written {path}"));
    }
    Ok(outcome)
}
