use std::collections::BTreeSet;

use crate::analysis::{predict_heights, HeightModeler, RECOMMENDED_SAMPLE_SIZE};
use crate::config::UnitConfig;
use crate::error::SpiError;
use crate::models::{HeightFunction, Occasion, PlotKey, SampleTree};
use crate::pipeline::context::RunContext;
use crate::pipeline::outcome::StepOutcome;
use crate::store::{ModelHeight, Table};
use crate::visualization::format_group_model;

/// Measured heights and model heights came with the imported trees.
pub const SOURCE_IMPORT_SAMPLES: &str = "import_samples";
/// Model heights come from the staged `model_heights` datasets.
pub const SOURCE_IMPORT_MODEL: &str = "import_model";
/// Model heights are fitted here.
pub const SOURCE_COMPUTE: &str = "compute";

/// Occasions that need model heights.
fn occasions(unit: &UnitConfig) -> Vec<Occasion> {
    if unit.repeated_inventory {
        vec![Occasion::Current, Occasion::Previous]
    } else {
        vec![Occasion::Current]
    }
}

fn model_heights_dataset(occasion: Occasion) -> (&'static str, &'static str, &'static str) {
    match occasion {
        Occasion::Current => ("model_heights", "stem", "model_height"),
        Occasion::Previous => ("model_heights_prev", "stem_prev", "model_height_prev"),
    }
}

/// Provide model heights for the sample trees from the configured source,
/// then check that every living tree has one.
pub fn height_model(ctx: &mut RunContext) -> Result<StepOutcome, SpiError> {
    let plan = ctx.plan_id()?;
    let occasions = occasions(&ctx.unit);
    let source = ctx
        .run
        .str_value("height_model.source")
        .unwrap_or_default()
        .to_string();

    let outcome = match source.as_str() {
        SOURCE_IMPORT_SAMPLES => {
            ctx.protocol.log("Model heights taken over from the imported sample trees");
            StepOutcome::Success
        }
        SOURCE_IMPORT_MODEL => import_model_heights(ctx, plan, &occasions)?,
        SOURCE_COMPUTE => compute_models(ctx, plan, &occasions)?,
        "" => StepOutcome::failure("No height model source configured"),
        other => StepOutcome::failure(format!("Unknown height model source '{other}'")),
    };
    if outcome.is_failure() {
        return Ok(outcome);
    }
    Ok(outcome.worst(check_model_heights(ctx, plan, &occasions)?))
}

fn import_model_heights(
    ctx: &mut RunContext,
    plan: i64,
    occasions: &[Occasion],
) -> Result<StepOutcome, SpiError> {
    for &occasion in occasions {
        let (name, stem_column, height_column) = model_heights_dataset(occasion);
        let Some(dataset) = ctx.store.staging(name)? else {
            return Ok(StepOutcome::failure(format!(
                "Dataset '{name}' has not been imported"
            )));
        };
        let heights: Vec<ModelHeight> = (0..dataset.len())
            .filter_map(|row| {
                Some(ModelHeight {
                    key: PlotKey {
                        locality: dataset.get_i64(row, "locality")?,
                        plot: dataset.get_i64(row, "plot")?,
                    },
                    stem: dataset.get_i64(row, stem_column)?,
                    height: dataset.get_f64(row, height_column)?,
                })
            })
            .collect();
        let updated = ctx.store.update_model_heights(plan, occasion, &heights)?;
        ctx.protocol.log(format!(
            "{updated} model heights of the {occasion} occasion imported from '{name}'"
        ));
    }
    Ok(StepOutcome::Success)
}

fn compute_models(
    ctx: &mut RunContext,
    plan: i64,
    occasions: &[Occasion],
) -> Result<StepOutcome, SpiError> {
    let forced = match ctx.run.str_value("height_model.function") {
        Some(id) => match id.parse::<HeightFunction>() {
            Ok(function) => Some(function),
            Err(e) => return Ok(StepOutcome::failure(e.to_string())),
        },
        None => None,
    };
    let apply = ctx.run.flag("height_model.apply");
    let modeler = HeightModeler::new().with_function(forced);

    let mut trees = ctx.store.sample_trees(plan)?;
    let groups: Vec<String> = trees
        .iter()
        .map(|t| ctx.unit.species_group(&t.species))
        .collect();

    for &occasion in occasions {
        let names: BTreeSet<String> = trees
            .iter()
            .zip(&groups)
            .filter(|(t, _)| t.in_model_sample(occasion))
            .map(|(_, g)| g.clone())
            .collect();
        if names.is_empty() {
            ctx.protocol
                .warn(format!("No sample trees of the {occasion} occasion to fit a height model to"));
            continue;
        }
        if apply {
            for tree in trees.iter_mut() {
                tree.set_model_height(occasion, Some(0.0));
            }
        }

        for group in &names {
            let members = trees.iter().zip(&groups).filter(|(_, g)| *g == group).map(|(t, _)| t);
            let model = modeler.model_group(group, occasion, members);
            ctx.protocol.detail(format_group_model(&model));
            if !model.is_reliable() {
                ctx.protocol.warn(format!(
                    "Height model of group '{group}' ({occasion}) rests on {} sample trees, at least {RECOMMENDED_SAMPLE_SIZE} are recommended",
                    model.sample_size
                ));
            }
            let Some(fit) = model.chosen else {
                return Ok(StepOutcome::failure(format!(
                    "No usable height model for group '{group}' ({occasion}): every candidate failed"
                )));
            };

            ctx.store.upsert(
                Table::HeightModel,
                &[
                    ("plan_id", plan.into()),
                    ("grp", group.as_str().into()),
                    ("occasion", occasion.label().into()),
                ],
                &[
                    ("function", fit.function.id().into()),
                    ("a", fit.a.into()),
                    ("b", fit.b.into()),
                    ("r2", fit.r2.into()),
                    ("rmse", fit.rmse.into()),
                    ("sample_size", (fit.sample_size as i64).into()),
                ],
            )?;
            ctx.protocol.log(format!(
                "Group '{group}' ({occasion}): {}, a = {:.5}, b = {:.5}, R² = {:.4}, RMSE = {:.3}, n = {}",
                fit.function.display_name(),
                fit.a,
                fit.b,
                fit.r2,
                fit.rmse,
                fit.sample_size
            ));

            if apply {
                let members = trees
                    .iter_mut()
                    .zip(&groups)
                    .filter(|(_, g)| *g == group)
                    .map(|(t, _)| t);
                let predicted = predict_heights(&fit, members, occasion);
                ctx.protocol
                    .detail(format!("{predicted} heights predicted for group '{group}'"));
            }
        }

        if apply {
            let heights = model_heights_of(&trees, occasion);
            let updated = ctx.store.update_model_heights(plan, occasion, &heights)?;
            ctx.protocol
                .log(format!("{updated} model heights of the {occasion} occasion written"));
        }
    }
    Ok(StepOutcome::Success)
}

fn model_heights_of(trees: &[SampleTree], occasion: Occasion) -> Vec<ModelHeight> {
    trees
        .iter()
        .filter(|t| t.stem_on(occasion) > 0)
        .map(|t| ModelHeight {
            key: t.plot_key(),
            stem: t.stem_on(occasion),
            height: t.model_height_on(occasion).unwrap_or(0.0),
        })
        .collect()
}

/// List living trees without a model height; any such tree is a warning.
fn check_model_heights(
    ctx: &mut RunContext,
    plan: i64,
    occasions: &[Occasion],
) -> Result<StepOutcome, SpiError> {
    let trees = ctx.store.sample_trees(plan)?;
    let mut missing_total = 0;
    for &occasion in occasions {
        let missing: Vec<&SampleTree> = trees.iter().filter(|t| t.lacks_model_height(occasion)).collect();
        if missing.is_empty() {
            continue;
        }
        ctx.protocol.warn(format!(
            "{} living trees of the {occasion} occasion have no model height:",
            missing.len()
        ));
        for tree in &missing {
            ctx.protocol.warn(format!(
                "  locality/plot {} stem {} ({})",
                tree.plot_key(),
                tree.stem_on(occasion),
                tree.species
            ));
        }
        missing_total += missing.len();
    }

    if missing_total == 0 {
        ctx.protocol.log("Every living tree has a model height");
        Ok(StepOutcome::Success)
    } else {
        Ok(StepOutcome::warning(format!(
            "{missing_total} living trees without model height"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::korf_sample;
    use crate::config::tests::UNIT_TOML;
    use crate::config::{RunConfig, UnitConfig};
    use crate::pipeline::protocol::RunProtocol;
    use crate::pipeline::steps::init_unit;
    use crate::store::SqliteStore;

    fn tree(stem: i64, species: &str, dbh: f64, height: Option<f64>) -> SampleTree {
        SampleTree {
            locality: 1,
            plot: 1,
            stem,
            stem_prev: 0,
            species: species.to_string(),
            dbh: Some(dbh),
            dbh_prev: None,
            height,
            height_prev: None,
            model_height: None,
            model_height_prev: None,
            status: "100".to_string(),
            status_prev: String::new(),
            distance: Some(3.0),
            azimuth: Some(45.0),
            note: String::new(),
        }
    }

    /// Korf-form sample of one species with every fourth height unmeasured.
    fn korf_trees(species: &str, first_stem: i64) -> Vec<SampleTree> {
        let (d, h) = korf_sample();
        d.into_iter()
            .zip(h)
            .enumerate()
            .map(|(i, (d, h))| tree(first_stem + i as i64, species, d, (i % 4 != 3).then_some(h)))
            .collect()
    }

    fn context(run: &str) -> RunContext {
        let raw = UNIT_TOML.replace("repeated_inventory = true", "repeated_inventory = false");
        let mut ctx = RunContext::new(
            UnitConfig::from_toml_str(&raw).unwrap(),
            RunConfig::from_toml_str(run).unwrap(),
            Box::new(SqliteStore::open_in_memory().unwrap()),
            RunProtocol::in_memory(),
        );
        init_unit(&mut ctx).unwrap();
        ctx
    }

    #[test]
    fn test_compute_and_apply() {
        let mut ctx = context("[height_model]\nsource = \"compute\"\napply = true\n");
        let plan = ctx.plan_id().unwrap();
        let mut trees = korf_trees("SM", 1);
        trees.extend(korf_trees("JD", 101));
        ctx.store.replace_sample_trees(plan, &trees).unwrap();

        let outcome = height_model(&mut ctx).unwrap();
        assert_eq!(outcome, StepOutcome::Success);

        // SM and JD share the conifer group
        let models = ctx.store.height_models(plan).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].group, "conifers");
        assert_eq!(models[0].function, HeightFunction::Korf);
        assert_eq!(models[0].sample_size, 60);

        let stored = ctx.store.sample_trees(plan).unwrap();
        assert!(stored.iter().all(|t| t.model_height.is_some_and(|h| h > 1.3)));
    }

    #[test]
    fn test_without_apply_trees_lack_heights() {
        let mut ctx = context("[height_model]\nsource = \"compute\"\n");
        let plan = ctx.plan_id().unwrap();
        ctx.store.replace_sample_trees(plan, &korf_trees("BK", 1)).unwrap();

        let outcome = height_model(&mut ctx).unwrap();
        assert!(matches!(outcome, StepOutcome::Warning(ref d) if d.starts_with("40 living trees")));
        assert_eq!(ctx.store.height_models(plan).unwrap()[0].group, "BK");
    }

    #[test]
    fn test_unusable_group_fails() {
        let mut ctx = context("[height_model]\nsource = \"compute\"\n");
        let plan = ctx.plan_id().unwrap();
        ctx.store
            .replace_sample_trees(plan, &[tree(1, "SM", 30.0, Some(25.0))])
            .unwrap();
        let outcome = height_model(&mut ctx).unwrap();
        assert!(outcome.is_failure());
        assert!(ctx.protocol.entries().iter().any(|e| e.contains("at least 10 are recommended")));
    }

    #[test]
    fn test_forced_function() {
        let mut ctx = context(
            "[height_model]\nsource = \"compute\"\nfunction = \"petersen\"\napply = true\n",
        );
        let plan = ctx.plan_id().unwrap();
        ctx.store.replace_sample_trees(plan, &korf_trees("SM", 1)).unwrap();
        height_model(&mut ctx).unwrap();
        assert_eq!(
            ctx.store.height_models(plan).unwrap()[0].function,
            HeightFunction::Petersen
        );

        let mut ctx = context("[height_model]\nsource = \"compute\"\nfunction = \"spline\"\n");
        assert!(height_model(&mut ctx).unwrap().is_failure());
    }

    #[test]
    fn test_imported_samples_checked() {
        let mut ctx = context("[height_model]\nsource = \"import_samples\"\n");
        let plan = ctx.plan_id().unwrap();
        let mut with_height = tree(1, "SM", 30.0, Some(25.0));
        with_height.model_height = Some(24.8);
        ctx.store.replace_sample_trees(plan, &[with_height]).unwrap();
        assert_eq!(height_model(&mut ctx).unwrap(), StepOutcome::Success);
    }

    #[test]
    fn test_unknown_source() {
        let mut ctx = context("[height_model]\nsource = \"lidar\"\n");
        let outcome = height_model(&mut ctx).unwrap();
        assert_eq!(outcome, StepOutcome::failure("Unknown height model source 'lidar'"));

        let mut ctx = context("");
        assert!(height_model(&mut ctx).unwrap().is_failure());
    }
}
