use crate::config::parse_number_key;
use crate::error::SpiError;
use crate::pipeline::context::RunContext;
use crate::pipeline::outcome::StepOutcome;
use crate::store::Table;

/// Code of the thickness-class type the unit's classes are filed under.
pub const THICKNESS_CLASS_TYPE: &str = "TLT";

/// Write the unit's reference data: company, unit, plan, management groups,
/// thickness classes, locality configurations and strata. Every row is
/// written by natural key, so a re-run updates in place.
pub fn init_unit(ctx: &mut RunContext) -> Result<StepOutcome, SpiError> {
    let unit = &ctx.unit;
    let store = ctx.store.as_mut();
    let protocol = &mut ctx.protocol;

    let company = store.upsert(
        Table::Company,
        &[("registration", unit.company_id.as_str().into())],
        &[
            ("name", unit.company_name.as_str().into()),
            ("legal", unit.legal.as_str().into()),
        ],
    )?;
    let unit_id = store.upsert(
        Table::Unit,
        &[("company_id", company.into()), ("code", unit.code.as_str().into())],
        &[("name", unit.name.as_str().into()), ("legal", unit.legal.as_str().into())],
    )?;
    let plan = store.upsert(
        Table::Plan,
        &[
            ("unit_id", unit_id.into()),
            ("valid_from", unit.plan_valid_from.to_string().into()),
        ],
        &[
            ("years", i64::from(unit.plan_years).into()),
            ("repeated_inventory", unit.repeated_inventory.into()),
            ("interval_years", unit.interval_years().into()),
        ],
    )?;
    protocol.detail(format!("company id {company}, unit id {unit_id}, plan id {plan}"));

    for (code, group) in &unit.management_groups {
        let id = store.upsert(
            Table::ManagementGroup,
            &[("plan_id", plan.into()), ("code", code.as_str().into())],
            &[
                ("name", group.name.as_str().into()),
                ("description", group.description.as_str().into()),
            ],
        )?;
        protocol.detail(format!("management group {code}: id {id}"));
    }

    let class_type = store.upsert(
        Table::ThicknessClassType,
        &[("company_id", company.into()), ("code", THICKNESS_CLASS_TYPE.into())],
        &[("description", "Thickness classes".into())],
    )?;
    let classes = unit.thickness_classes.classes();
    for class in &classes {
        store.upsert(
            Table::ThicknessClass,
            &[("class_type_id", class_type.into()), ("class", class.class.into())],
            &[("min_dbh", class.min_dbh.into()), ("max_dbh", class.max_dbh.into())],
        )?;
    }

    for (code, config) in &unit.locality_configs {
        let config_id = store.upsert(
            Table::LocalityConfig,
            &[("company_id", company.into()), ("code", code.as_str().into())],
            &[("name", config.name.as_str().into())],
        )?;
        for (plot_key, layout) in &config.plots {
            let plot = parse_number_key("Plot", plot_key)?;
            let plot_id = store.upsert(
                Table::LocalityPlot,
                &[("locality_config_id", config_id.into()), ("plot", plot.into())],
                &[("azimuth", layout.azimuth.into()), ("distance", layout.distance.into())],
            )?;
            for (subplot_key, subplot) in &layout.subplots {
                let number = parse_number_key("Subplot", subplot_key)?;
                store.upsert(
                    Table::LocalitySubplot,
                    &[("locality_plot_id", plot_id.into()), ("subplot", number.into())],
                    &[
                        ("radius_m", subplot.radius_m.into()),
                        ("min_dbh_cm", subplot.min_dbh_cm.into()),
                    ],
                )?;
            }
        }
        protocol.detail(format!(
            "locality configuration {code}: id {config_id}, {} plots",
            config.plots.len()
        ));
    }

    for (code, stratum) in &unit.strata {
        store.upsert(
            Table::Stratum,
            &[("plan_id", plan.into()), ("code", code.as_str().into())],
            &[
                ("description", stratum.description.as_str().into()),
                ("area_ha", stratum.area_ha.into()),
                ("config", stratum.config.as_str().into()),
            ],
        )?;
    }

    protocol.log(format!(
        "Unit {} plan {}: {} management groups, {} thickness classes, {} locality configurations, {} strata",
        unit.code,
        unit.plan_valid_from,
        unit.management_groups.len(),
        classes.len(),
        unit.locality_configs.len(),
        unit.strata.len()
    ));
    ctx.set_plan_id(plan);
    Ok(StepOutcome::Success)
}

pub fn init_subregions(ctx: &mut RunContext) -> Result<StepOutcome, SpiError> {
    let plan = ctx.plan_id()?;
    if ctx.unit.subregions.is_empty() {
        ctx.protocol.log("No subregions configured");
        return Ok(StepOutcome::Success);
    }

    let mut areas = 0;
    for (code, kind) in &ctx.unit.subregions {
        let type_id = ctx.store.upsert(
            Table::SubregionType,
            &[("plan_id", plan.into()), ("code", code.as_str().into())],
            &[
                ("name", kind.name.as_str().into()),
                ("description", kind.description.as_str().into()),
            ],
        )?;
        for (area_code, area) in &kind.areas {
            ctx.store.upsert(
                Table::Subregion,
                &[("subregion_type_id", type_id.into()), ("code", area_code.as_str().into())],
                &[
                    ("name", area.name.as_str().into()),
                    ("description", area.description.as_str().into()),
                ],
            )?;
            areas += 1;
        }
    }
    ctx.protocol.log(format!(
        "{} subregion types with {areas} subregions",
        ctx.unit.subregions.len()
    ));
    Ok(StepOutcome::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::UNIT_TOML;
    use crate::config::{RunConfig, UnitConfig};
    use crate::pipeline::protocol::RunProtocol;
    use crate::store::SqliteStore;

    fn context() -> RunContext {
        RunContext::new(
            UnitConfig::from_toml_str(UNIT_TOML).unwrap(),
            RunConfig::default(),
            Box::new(SqliteStore::open_in_memory().unwrap()),
            RunProtocol::in_memory(),
        )
    }

    #[test]
    fn test_init_unit_is_idempotent() {
        let mut ctx = context();
        assert_eq!(init_unit(&mut ctx).unwrap(), StepOutcome::Success);
        let plan = ctx.plan_id().unwrap();
        let counts: Vec<usize> = [Table::ThicknessClass, Table::LocalitySubplot, Table::Stratum]
            .iter()
            .map(|t| ctx.store.count(*t).unwrap())
            .collect();
        assert_eq!(counts, vec![3, 2, 1]);

        init_unit(&mut ctx).unwrap();
        let again: Vec<usize> = [Table::ThicknessClass, Table::LocalitySubplot, Table::Stratum]
            .iter()
            .map(|t| ctx.store.count(*t).unwrap())
            .collect();
        assert_eq!(again, counts);
        assert_eq!(ctx.store.count(Table::Plan).unwrap(), 1);
        assert_eq!(ctx.plan_id().unwrap(), plan);
    }

    #[test]
    fn test_plan_found_by_natural_key() {
        let mut ctx = context();
        init_unit(&mut ctx).unwrap();
        let plan = ctx.plan_id().unwrap();

        let store = std::mem::replace(&mut ctx.store, Box::new(SqliteStore::open_in_memory().unwrap()));
        let mut fresh = context();
        fresh.store = store;
        assert_eq!(fresh.plan_id().unwrap(), plan);
    }

    #[test]
    fn test_subregions_need_plan() {
        let mut ctx = context();
        let err = init_subregions(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("not initialized"));

        init_unit(&mut ctx).unwrap();
        init_subregions(&mut ctx).unwrap();
        init_subregions(&mut ctx).unwrap();
        assert_eq!(ctx.store.count(Table::SubregionType).unwrap(), 1);
        assert_eq!(ctx.store.count(Table::Subregion).unwrap(), 1);
    }
}
