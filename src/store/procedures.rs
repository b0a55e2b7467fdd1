//! Named procedures of the SQLite store: sample-plot generation, plan
//! geometry and the per-plot stock computation behind the indicators.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rusqlite::{params, Connection, OptionalExtension};

use super::sqlite::{read_staging, SqliteStore};
use super::{ProcedureArgs, Store};
use crate::analysis::{
    ConfidenceInterval, IndicatorBasis, Indicators, PlotEstimate, Subplot, DEFAULT_CONFIDENCE,
    DEFAULT_FORM_FACTOR,
};
use crate::error::SpiError;
use crate::models::{Occasion, PlotKey, SampleTree, Value};

pub const PROC_GENERATE_SAMPLE_PLOTS: &str = "generate_sample_plots";
pub const PROC_GENERATE_GEOMETRY: &str = "generate_geometry";
pub const PROC_COMPUTE_LHP: &str = "compute_lhp";

type Procedure = fn(&mut SqliteStore, i64, &ProcedureArgs) -> Result<Vec<String>, SpiError>;

fn arg<'a>(args: &'a ProcedureArgs, name: &str) -> Option<&'a Value> {
    args.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
}

pub(super) fn call(
    store: &mut SqliteStore,
    procedure: &str,
    args: &ProcedureArgs,
) -> Result<Vec<String>, SpiError> {
    let run: Procedure = match procedure {
        PROC_GENERATE_SAMPLE_PLOTS => generate_sample_plots,
        PROC_GENERATE_GEOMETRY => generate_geometry,
        PROC_COMPUTE_LHP => compute_lhp,
        other => {
            return Err(SpiError::StoreError(format!("Unknown procedure '{other}'")));
        }
    };
    let plan = arg(args, "plan").and_then(Value::as_i64).ok_or_else(|| {
        SpiError::StoreError(format!("Procedure {procedure} needs an integer 'plan' argument"))
    })?;
    tracing::debug!(procedure, plan, "calling procedure");
    run(store, plan, args)
}

struct LayoutPlot {
    plot: i64,
    azimuth: f64,
    distance: f64,
}

const COMPANY_OF_PLAN: &str =
    "(SELECT u.company_id FROM plan p JOIN unit u ON u.id = p.unit_id WHERE p.id = ?1)";

/// Plots of every locality configuration of the plan's company.
fn plot_layouts(conn: &Connection, plan: i64) -> Result<HashMap<String, Vec<LayoutPlot>>, SpiError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT lc.code, lp.plot, lp.azimuth, lp.distance
         FROM locality_config lc JOIN locality_plot lp ON lp.locality_config_id = lc.id
         WHERE lc.company_id = {COMPANY_OF_PLAN}
         ORDER BY lc.code, lp.plot"
    ))?;
    let mut layouts: HashMap<String, Vec<LayoutPlot>> = HashMap::new();
    let rows = stmt.query_map([plan], |row| {
        Ok((
            row.get::<_, String>(0)?,
            LayoutPlot {
                plot: row.get(1)?,
                azimuth: row.get(2)?,
                distance: row.get(3)?,
            },
        ))
    })?;
    for row in rows {
        let (code, plot) = row?;
        layouts.entry(code).or_default().push(plot);
    }
    Ok(layouts)
}

/// Subplots keyed by locality configuration and plot number.
fn subplot_layouts(
    conn: &Connection,
    plan: i64,
) -> Result<HashMap<(String, i64), Vec<Subplot>>, SpiError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT lc.code, lp.plot, ls.radius_m, ls.min_dbh_cm
         FROM locality_config lc
         JOIN locality_plot lp ON lp.locality_config_id = lc.id
         JOIN locality_subplot ls ON ls.locality_plot_id = lp.id
         WHERE lc.company_id = {COMPANY_OF_PLAN}
         ORDER BY lc.code, lp.plot, ls.subplot"
    ))?;
    let mut layouts: HashMap<(String, i64), Vec<Subplot>> = HashMap::new();
    let rows = stmt.query_map([plan], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            Subplot {
                radius_m: row.get(2)?,
                min_dbh_cm: row.get(3)?,
            },
        ))
    })?;
    for row in rows {
        let (code, plot, subplot) = row?;
        layouts.entry((code, plot)).or_default().push(subplot);
    }
    Ok(layouts)
}

/// Rebuild the plan's localities from the staged `localities` dataset and
/// create the plots of each locality's configuration. A locality without a
/// configuration of its own uses its stratum's.
fn generate_sample_plots(
    store: &mut SqliteStore,
    plan: i64,
    _args: &ProcedureArgs,
) -> Result<Vec<String>, SpiError> {
    let conn = store.connection_mut();
    let localities = read_staging(conn, "localities")?.ok_or_else(|| {
        SpiError::StoreError("Dataset 'localities' has not been imported".to_string())
    })?;
    let strata: HashMap<String, String> = {
        let mut stmt = conn.prepare("SELECT code, config FROM stratum WHERE plan_id = ?1")?;
        let rows = stmt.query_map([plan], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<Result<_, _>>()?
    };
    let layouts = plot_layouts(conn, plan)?;

    let mut notices = Vec::new();
    let mut unknown_strata = BTreeSet::new();
    let mut plots = 0;

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM plot WHERE plan_id = ?1", [plan])?;
    tx.execute("DELETE FROM locality WHERE plan_id = ?1", [plan])?;
    {
        let mut insert_locality = tx.prepare(
            "INSERT INTO locality (plan_id, locality, stratum, config) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut insert_plot = tx.prepare(
            "INSERT INTO plot (plan_id, locality, plot, stratum, config, azimuth, distance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for row in 0..localities.len() {
            let locality = localities.get_i64(row, "locality").ok_or_else(|| {
                SpiError::StoreError(format!("localities: row {row} has no locality number"))
            })?;
            let stratum = localities.get_text(row, "stratum");
            if !stratum.is_empty() && !strata.contains_key(&stratum) {
                unknown_strata.insert(stratum.clone());
            }
            let mut config = localities.get_text(row, "config");
            if config.is_empty() {
                config = strata.get(&stratum).cloned().unwrap_or_default();
            }
            let layout = layouts.get(&config).ok_or_else(|| {
                SpiError::StoreError(format!(
                    "Locality {locality}: unknown locality configuration '{config}' (stratum '{stratum}')"
                ))
            })?;

            insert_locality.execute(params![plan, locality, stratum, config])?;
            for p in layout {
                insert_plot.execute(params![
                    plan, locality, p.plot, stratum, config, p.azimuth, p.distance
                ])?;
                plots += 1;
            }
        }
    }
    tx.commit()?;

    for stratum in unknown_strata {
        notices.push(format!("Stratum '{stratum}' is not configured for the plan"));
    }
    notices.push(format!(
        "{} localities and {plots} sample plots generated",
        localities.len()
    ));
    Ok(notices)
}

/// Plan area as the sum of its strata.
fn generate_geometry(
    store: &mut SqliteStore,
    plan: i64,
    _args: &ProcedureArgs,
) -> Result<Vec<String>, SpiError> {
    let conn = store.connection_mut();
    let (strata, area): (i64, f64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(area_ha), 0) FROM stratum WHERE plan_id = ?1",
        [plan],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let changed = conn.execute(
        "UPDATE plan SET area_ha = ?1 WHERE id = ?2",
        params![area, plan],
    )?;
    if changed == 0 {
        return Err(SpiError::StoreError(format!("Plan {plan} does not exist")));
    }
    Ok(vec![format!("Plan area {area:.2} ha from {strata} strata")])
}

struct PlanRow {
    area_ha: f64,
    form_factor: Option<f64>,
    repeated_inventory: bool,
    interval_years: Option<f64>,
}

fn plan_row(conn: &Connection, plan: i64) -> Result<PlanRow, SpiError> {
    conn.query_row(
        "SELECT area_ha, form_factor, repeated_inventory, interval_years FROM plan WHERE id = ?1",
        [plan],
        |row| {
            Ok(PlanRow {
                area_ha: row.get(0)?,
                form_factor: row.get(1)?,
                repeated_inventory: row.get(2)?,
                interval_years: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| SpiError::StoreError(format!("Plan {plan} does not exist")))
}

/// Per-plot stock, previous stock and harvest from the sample trees, then
/// the plan's indicators. Replaces the plan's stored indicators.
fn compute_lhp(
    store: &mut SqliteStore,
    plan: i64,
    args: &ProcedureArgs,
) -> Result<Vec<String>, SpiError> {
    let plots = store.plots(plan)?;
    if plots.is_empty() {
        return Err(SpiError::InsufficientData(
            "The plan has no sample plots".to_string(),
        ));
    }
    let trees = store.sample_trees(plan)?;

    let conn = store.connection_mut();
    let row = plan_row(conn, plan)?;
    let form_factor = arg(args, "form_factor")
        .and_then(Value::as_f64)
        .or(row.form_factor)
        .unwrap_or(DEFAULT_FORM_FACTOR);
    let confidence = arg(args, "confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE);
    let interval_years = if row.repeated_inventory {
        Some(row.interval_years.ok_or_else(|| {
            SpiError::StoreError("Repeated inventory without an inventory interval".to_string())
        })?)
    } else {
        None
    };
    let localities: i64 =
        conn.query_row("SELECT COUNT(*) FROM locality WHERE plan_id = ?1", [plan], |r| r.get(0))?;
    let subplots = subplot_layouts(conn, plan)?;

    let mut by_plot: BTreeMap<PlotKey, Vec<&SampleTree>> = BTreeMap::new();
    for tree in &trees {
        by_plot.entry(tree.plot_key()).or_default().push(tree);
    }

    let mut notices = Vec::new();
    let mut estimates = Vec::with_capacity(plots.len());
    for plot in &plots {
        let layout = subplots
            .get(&(plot.config.clone(), plot.key.plot))
            .ok_or_else(|| {
                SpiError::StoreError(format!(
                    "Plot {}: configuration '{}' has no subplots for plot {}",
                    plot.key, plot.config, plot.key.plot
                ))
            })?;
        let plot_trees = by_plot.remove(&plot.key).unwrap_or_default();
        estimates.push(PlotEstimate::from_trees(
            plot.key,
            plot_trees,
            layout,
            form_factor,
        ));
    }
    let outside: usize = by_plot.values().map(Vec::len).sum();
    if outside > 0 {
        notices.push(format!("{outside} sample trees lie outside the generated plots"));
    }
    let missing_heights = trees
        .iter()
        .filter(|t| t.lacks_model_height(Occasion::Current))
        .count();
    if missing_heights > 0 {
        notices.push(format!(
            "{missing_heights} living trees have no model height and were counted by measured height only"
        ));
    }

    let height_trees = trees
        .iter()
        .filter(|t| t.in_model_sample(Occasion::Current) && t.height.is_some_and(|h| h > 0.0))
        .count();
    let indicators = Indicators::compute(
        &estimates,
        &IndicatorBasis {
            area_ha: row.area_ha,
            localities: localities as usize,
            height_trees,
            form_factor,
            interval_years,
            confidence,
        },
    )?;
    save_indicators(conn, plan, &indicators)?;

    notices.push(format!(
        "Indicators computed from {} plots with form factor {form_factor}",
        indicators.plots
    ));
    Ok(notices)
}

const INTERVAL_ROWS: [&str; 4] = ["stock", "stock_prev", "harvest", "increment"];

fn save_indicators(conn: &mut Connection, plan: i64, indicators: &Indicators) -> Result<(), SpiError> {
    let intervals = [
        Some(&indicators.stock),
        indicators.stock_prev.as_ref(),
        indicators.harvest.as_ref(),
        indicators.increment.as_ref(),
    ];
    let scalars = [
        ("area_ha", Some(indicators.area_ha)),
        ("localities", Some(indicators.localities as f64)),
        ("plots", Some(indicators.plots as f64)),
        ("height_trees", Some(indicators.height_trees as f64)),
        ("form_factor", Some(indicators.form_factor)),
        ("interval_years", indicators.interval_years),
    ];

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM indicator WHERE plan_id = ?1", [plan])?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO indicator
                (plan_id, name, mean, std_error, lower, upper, confidence, sample_size, sampling_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for (name, ci) in INTERVAL_ROWS.iter().zip(intervals) {
            if let Some(ci) = ci {
                insert.execute(params![
                    plan,
                    name,
                    ci.mean,
                    ci.std_error,
                    ci.lower,
                    ci.upper,
                    ci.confidence_level,
                    ci.sample_size as i64,
                    ci.sampling_error_percent,
                ])?;
            }
        }
        for (name, value) in scalars {
            if let Some(value) = value {
                insert.execute(params![
                    plan,
                    name,
                    value,
                    None::<f64>,
                    None::<f64>,
                    None::<f64>,
                    None::<f64>,
                    None::<i64>,
                    None::<f64>,
                ])?;
            }
        }
    }
    tx.commit()?;
    Ok(())
}

struct IndicatorRow {
    mean: f64,
    std_error: Option<f64>,
    lower: Option<f64>,
    upper: Option<f64>,
    confidence: Option<f64>,
    sample_size: Option<i64>,
    sampling_error: Option<f64>,
}

impl IndicatorRow {
    fn interval(&self) -> ConfidenceInterval {
        ConfidenceInterval {
            mean: self.mean,
            std_error: self.std_error.unwrap_or(0.0),
            lower: self.lower.unwrap_or(self.mean),
            upper: self.upper.unwrap_or(self.mean),
            confidence_level: self.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            sample_size: self.sample_size.unwrap_or(0) as usize,
            sampling_error_percent: self.sampling_error.unwrap_or(0.0),
        }
    }
}

/// Indicators stored by the last `compute_lhp` of the plan.
pub(super) fn load_indicators(conn: &Connection, plan: i64) -> Result<Option<Indicators>, SpiError> {
    let mut stmt = conn.prepare(
        "SELECT name, mean, std_error, lower, upper, confidence, sample_size, sampling_error
         FROM indicator WHERE plan_id = ?1",
    )?;
    let rows: HashMap<String, IndicatorRow> = stmt
        .query_map([plan], |row| {
            Ok((
                row.get::<_, String>(0)?,
                IndicatorRow {
                    mean: row.get(1)?,
                    std_error: row.get(2)?,
                    lower: row.get(3)?,
                    upper: row.get(4)?,
                    confidence: row.get(5)?,
                    sample_size: row.get(6)?,
                    sampling_error: row.get(7)?,
                },
            ))
        })?
        .collect::<Result<_, _>>()?;

    let Some(stock) = rows.get("stock").map(IndicatorRow::interval) else {
        return Ok(None);
    };
    let scalar = |name: &str| rows.get(name).map(|r| r.mean);
    let count = |name: &str| scalar(name).unwrap_or(0.0) as usize;

    Ok(Some(Indicators {
        area_ha: scalar("area_ha").unwrap_or(0.0),
        localities: count("localities"),
        plots: count("plots"),
        height_trees: count("height_trees"),
        form_factor: scalar("form_factor").unwrap_or(DEFAULT_FORM_FACTOR),
        interval_years: scalar("interval_years"),
        stock,
        stock_prev: rows.get("stock_prev").map(IndicatorRow::interval),
        harvest: rows.get("harvest").map(IndicatorRow::interval),
        increment: rows.get("increment").map(IndicatorRow::interval),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dataset;
    use crate::store::sqlite::tests::{seed_plan, tree};
    use crate::store::Table;
    use assert_approx_eq::assert_approx_eq;

    fn stage_localities(store: &mut SqliteStore, rows: &[(i64, &str, &str)]) {
        let mut ds = Dataset::new(
            "localities",
            vec!["locality".into(), "stratum".into(), "config".into()],
        );
        for (locality, stratum, config) in rows {
            ds.push_row(vec![
                Value::Integer(*locality),
                Value::from(*stratum),
                Value::from(*config),
            ]);
        }
        store.replace_staging(&ds).unwrap();
    }

    fn plan_args(plan: i64) -> Vec<(&'static str, Value)> {
        vec![("plan", Value::Integer(plan))]
    }

    #[test]
    fn test_unknown_procedure() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let err = store.call("compute_gsi", &plan_args(1)).unwrap_err();
        assert!(err.to_string().contains("Unknown procedure 'compute_gsi'"));
    }

    #[test]
    fn test_plan_argument_required() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(store.call(PROC_GENERATE_GEOMETRY, &[]).is_err());
    }

    #[test]
    fn test_generate_sample_plots_uses_stratum_config() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let plan = seed_plan(&mut store);
        stage_localities(&mut store, &[(101, "S1", ""), (102, "S1", "K1")]);

        let notices = store.call(PROC_GENERATE_SAMPLE_PLOTS, &plan_args(plan)).unwrap();
        assert_eq!(notices, vec!["2 localities and 4 sample plots generated"]);
        let plots = store.plots(plan).unwrap();
        assert_eq!(plots.len(), 4);
        assert_eq!(plots[0].config, "K1");
        assert_eq!(plots[1].azimuth, 180.0);

        // Regenerating replaces rather than duplicates.
        store.call(PROC_GENERATE_SAMPLE_PLOTS, &plan_args(plan)).unwrap();
        assert_eq!(store.count(Table::Plot).unwrap(), 4);
        assert_eq!(store.count(Table::Locality).unwrap(), 2);
    }

    #[test]
    fn test_generate_sample_plots_unknown_config_rolls_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let plan = seed_plan(&mut store);
        stage_localities(&mut store, &[(101, "S1", "")]);
        store.call(PROC_GENERATE_SAMPLE_PLOTS, &plan_args(plan)).unwrap();

        stage_localities(&mut store, &[(101, "S1", ""), (102, "S7", "")]);
        let err = store.call(PROC_GENERATE_SAMPLE_PLOTS, &plan_args(plan)).unwrap_err();
        assert!(err.to_string().contains("Locality 102"));
        assert_eq!(store.count(Table::Plot).unwrap(), 2);
    }

    #[test]
    fn test_generate_sample_plots_needs_staged_localities() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let plan = seed_plan(&mut store);
        let err = store.call(PROC_GENERATE_SAMPLE_PLOTS, &plan_args(plan)).unwrap_err();
        assert!(err.to_string().contains("'localities' has not been imported"));
    }

    #[test]
    fn test_generate_geometry_sums_strata() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let plan = seed_plan(&mut store);
        store
            .upsert(
                Table::Stratum,
                &[("plan_id", plan.into()), ("code", "S2".into())],
                &[("area_ha", 49.5.into()), ("config", "K1".into())],
            )
            .unwrap();
        let notices = store.call(PROC_GENERATE_GEOMETRY, &plan_args(plan)).unwrap();
        assert_eq!(notices, vec!["Plan area 900.00 ha from 2 strata"]);
        let area = plan_row(store.connection(), plan).unwrap().area_ha;
        assert_approx_eq!(area, 900.0, 1e-9);
    }

    #[test]
    fn test_compute_lhp_stores_indicators() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let plan = seed_plan(&mut store);
        stage_localities(&mut store, &[(101, "S1", ""), (102, "S1", "")]);
        store.call(PROC_GENERATE_SAMPLE_PLOTS, &plan_args(plan)).unwrap();

        let mut trees = Vec::new();
        for (locality, plot, dbh) in [(101, 1, 30.0), (101, 2, 40.0), (102, 1, 20.0), (102, 2, 35.0)] {
            let mut t = tree(locality, plot, 1, dbh, Some(25.0));
            t.model_height = Some(25.0);
            t.model_height_prev = Some(23.0);
            trees.push(t);
        }
        store.replace_sample_trees(plan, &trees).unwrap();

        let notices = store.call(PROC_COMPUTE_LHP, &plan_args(plan)).unwrap();
        assert!(notices.last().unwrap().contains("from 4 plots"));

        let ind = store.indicators(plan).unwrap().unwrap();
        assert_eq!(ind.plots, 4);
        assert_eq!(ind.localities, 2);
        assert_eq!(ind.height_trees, 4);
        assert_eq!(ind.interval_years, Some(10.0));
        assert!(ind.stock.mean > 0.0);
        assert!(ind.increment.is_some());
        assert_eq!(ind.stock.sample_size, 4);
    }

    #[test]
    fn test_compute_lhp_without_plots() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let plan = seed_plan(&mut store);
        let err = store.call(PROC_COMPUTE_LHP, &plan_args(plan)).unwrap_err();
        assert!(matches!(err, SpiError::InsufficientData(_)));
        assert!(store.indicators(plan).unwrap().is_none());
    }
}
