use std::path::{Path, PathBuf};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};

use super::procedures;
use super::schema::{PLOT_ATTRIBUTES, SCHEMA};
use super::{ModelHeight, NavigationPoint, PlotRecord, ProcedureArgs, Store, Table};
use crate::analysis::{HeightModelRecord, Indicators};
use crate::error::SpiError;
use crate::models::{Dataset, Occasion, PlotKey, SampleTree, Value};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Boolean(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => Ok(Value::Integer(i)),
            ValueRef::Real(f) => Ok(Value::Float(f)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| Value::Text(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// [`Store`] backed by a single SQLite database file.
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database and bring its schema up.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SpiError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::init(Connection::open(path)?, Some(path.to_path_buf()))?;
        tracing::info!(path = %path.display(), "store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, SpiError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, SpiError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(super) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(super) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

fn check_columns<'a>(table: Table, columns: impl IntoIterator<Item = &'a str>) -> Result<(), SpiError> {
    for column in columns {
        if !table.columns().iter().any(|c| *c == column) {
            return Err(SpiError::StoreError(format!(
                "Table {table} has no writable column '{column}'"
            )));
        }
    }
    Ok(())
}

fn key_condition(key: &[(&str, Value)]) -> String {
    key.iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Staged dataset stored under `name`.
pub(super) fn read_staging(conn: &Connection, name: &str) -> Result<Option<Dataset>, SpiError> {
    let stored: Option<(String, String)> = conn
        .query_row(
            "SELECT columns, rows FROM staging WHERE dataset = ?1",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((columns, rows)) = stored else {
        return Ok(None);
    };
    Ok(Some(Dataset {
        name: name.to_string(),
        columns: serde_json::from_str(&columns)?,
        rows: serde_json::from_str(&rows)?,
    }))
}

impl Store for SqliteStore {
    fn upsert(
        &mut self,
        table: Table,
        key: &[(&str, Value)],
        values: &[(&str, Value)],
    ) -> Result<i64, SpiError> {
        if key.is_empty() {
            return Err(SpiError::StoreError(format!(
                "Upsert into {table} needs a natural key"
            )));
        }
        let columns: Vec<&str> = key.iter().chain(values).map(|(c, _)| *c).collect();
        check_columns(table, columns.iter().copied())?;

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let key_columns: Vec<&str> = key.iter().map(|(c, _)| *c).collect();
        let updates: Vec<String> = if values.is_empty() {
            vec![format!("{k} = excluded.{k}", k = key_columns[0])]
        } else {
            values
                .iter()
                .map(|(c, _)| format!("{c} = excluded.{c}"))
                .collect()
        };
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {} RETURNING id",
            columns.join(", "),
            placeholders.join(", "),
            key_columns.join(", "),
            updates.join(", "),
        );

        let id = self.conn.query_row(
            &sql,
            params_from_iter(key.iter().chain(values).map(|(_, v)| v)),
            |row| row.get(0),
        )?;
        tracing::trace!(%table, id, "upserted");
        Ok(id)
    }

    fn find(&self, table: Table, key: &[(&str, Value)]) -> Result<Option<i64>, SpiError> {
        if key.is_empty() {
            return Err(SpiError::StoreError(format!("Lookup in {table} needs a key")));
        }
        check_columns(table, key.iter().map(|(c, _)| *c))?;
        let sql = format!("SELECT id FROM {table} WHERE {}", key_condition(key));
        let id = self
            .conn
            .query_row(&sql, params_from_iter(key.iter().map(|(_, v)| v)), |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id)
    }

    fn count(&self, table: Table) -> Result<usize, SpiError> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn replace_staging(&mut self, dataset: &Dataset) -> Result<(), SpiError> {
        self.conn.execute(
            "INSERT INTO staging (dataset, columns, rows, imported_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (dataset) DO UPDATE SET
                columns = excluded.columns, rows = excluded.rows, imported_at = excluded.imported_at",
            params![
                dataset.name,
                serde_json::to_string(&dataset.columns)?,
                serde_json::to_string(&dataset.rows)?,
                chrono::Local::now().to_rfc3339(),
            ],
        )?;
        tracing::debug!(dataset = %dataset.name, rows = dataset.len(), "dataset staged");
        Ok(())
    }

    fn staging(&self, name: &str) -> Result<Option<Dataset>, SpiError> {
        read_staging(&self.conn, name)
    }

    fn call(&mut self, procedure: &str, args: &ProcedureArgs) -> Result<Vec<String>, SpiError> {
        procedures::call(self, procedure, args)
    }

    fn plots(&self, plan: i64) -> Result<Vec<PlotRecord>, SpiError> {
        let mut stmt = self.conn.prepare(
            "SELECT locality, plot, stratum, config, azimuth, distance
             FROM plot WHERE plan_id = ?1 ORDER BY locality, plot",
        )?;
        let plots = stmt
            .query_map([plan], |row| {
                Ok(PlotRecord {
                    key: PlotKey {
                        locality: row.get(0)?,
                        plot: row.get(1)?,
                    },
                    stratum: row.get(2)?,
                    config: row.get(3)?,
                    azimuth: row.get(4)?,
                    distance: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plots)
    }

    fn update_plot_attributes(&mut self, plan: i64, plots: &Dataset) -> Result<usize, SpiError> {
        let columns: Vec<&str> = PLOT_ATTRIBUTES
            .iter()
            .copied()
            .filter(|c| plots.has_column(c))
            .collect();
        if columns.is_empty() {
            return Ok(0);
        }
        let n = columns.len();
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE plot SET {} WHERE plan_id = ?{} AND locality = ?{} AND plot = ?{}",
            assignments.join(", "),
            n + 1,
            n + 2,
            n + 3
        );

        let tx = self.conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in 0..plots.len() {
                let (Some(locality), Some(plot)) =
                    (plots.get_i64(row, "locality"), plots.get_i64(row, "plot"))
                else {
                    continue;
                };
                let mut values: Vec<Value> = columns
                    .iter()
                    .map(|c| plots.get(row, c).cloned().unwrap_or(Value::Null))
                    .collect();
                values.extend([Value::Integer(plan), Value::Integer(locality), Value::Integer(plot)]);
                let changed = stmt.execute(params_from_iter(values.iter()))?;
                if changed == 0 {
                    tracing::warn!(locality, plot, "imported plot matches no generated sample plot");
                }
                updated += changed;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    fn replace_sample_trees(&mut self, plan: i64, trees: &[SampleTree]) -> Result<usize, SpiError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM sample_tree WHERE plan_id = ?1", [plan])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sample_tree (
                    plan_id, locality, plot, stem, stem_prev, species, dbh, dbh_prev,
                    height, height_prev, model_height, model_height_prev,
                    status, status_prev, distance, azimuth, note
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )?;
            for t in trees {
                stmt.execute(params![
                    plan,
                    t.locality,
                    t.plot,
                    t.stem,
                    t.stem_prev,
                    t.species,
                    t.dbh,
                    t.dbh_prev,
                    t.height,
                    t.height_prev,
                    t.model_height,
                    t.model_height_prev,
                    t.status,
                    t.status_prev,
                    t.distance,
                    t.azimuth,
                    t.note,
                ])?;
            }
        }
        tx.commit()?;
        Ok(trees.len())
    }

    fn sample_trees(&self, plan: i64) -> Result<Vec<SampleTree>, SpiError> {
        let mut stmt = self.conn.prepare(
            "SELECT locality, plot, stem, stem_prev, species, dbh, dbh_prev,
                    height, height_prev, model_height, model_height_prev,
                    status, status_prev, distance, azimuth, note
             FROM sample_tree WHERE plan_id = ?1 ORDER BY locality, plot, id",
        )?;
        let trees = stmt
            .query_map([plan], |row| {
                Ok(SampleTree {
                    locality: row.get(0)?,
                    plot: row.get(1)?,
                    stem: row.get(2)?,
                    stem_prev: row.get(3)?,
                    species: row.get(4)?,
                    dbh: row.get(5)?,
                    dbh_prev: row.get(6)?,
                    height: row.get(7)?,
                    height_prev: row.get(8)?,
                    model_height: row.get(9)?,
                    model_height_prev: row.get(10)?,
                    status: row.get(11)?,
                    status_prev: row.get(12)?,
                    distance: row.get(13)?,
                    azimuth: row.get(14)?,
                    note: row.get(15)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(trees)
    }

    fn update_model_heights(
        &mut self,
        plan: i64,
        occasion: Occasion,
        heights: &[ModelHeight],
    ) -> Result<usize, SpiError> {
        let (height_column, stem_column) = match occasion {
            Occasion::Current => ("model_height", "stem"),
            Occasion::Previous => ("model_height_prev", "stem_prev"),
        };
        let sql = format!(
            "UPDATE sample_tree SET {height_column} = ?1
             WHERE plan_id = ?2 AND locality = ?3 AND plot = ?4 AND {stem_column} = ?5"
        );

        let tx = self.conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for m in heights.iter().filter(|m| m.stem > 0) {
                updated += stmt.execute(params![m.height, plan, m.key.locality, m.key.plot, m.stem])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    fn replace_navigation_points(
        &mut self,
        plan: i64,
        points: &[NavigationPoint],
    ) -> Result<usize, SpiError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM navigation_point WHERE plan_id = ?1", [plan])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO navigation_point (plan_id, locality, plot, point, x_m, y_m, description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for p in points {
                stmt.execute(params![
                    plan,
                    p.key.locality,
                    p.key.plot,
                    p.point,
                    p.x_m,
                    p.y_m,
                    p.description,
                ])?;
            }
        }
        tx.commit()?;
        Ok(points.len())
    }

    fn height_models(&self, plan: i64) -> Result<Vec<HeightModelRecord>, SpiError> {
        let mut stmt = self.conn.prepare(
            "SELECT grp, occasion, function, a, b, r2, rmse, sample_size
             FROM height_model WHERE plan_id = ?1 ORDER BY grp, occasion",
        )?;
        let rows = stmt
            .query_map([plan], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(group, occasion, function, a, b, r2, rmse, n)| -> Result<_, SpiError> {
                Ok(HeightModelRecord {
                    group,
                    occasion: occasion.parse()?,
                    function: function.parse()?,
                    a,
                    b,
                    r2,
                    rmse,
                    sample_size: n as usize,
                })
            })
            .collect()
    }

    fn indicators(&self, plan: i64) -> Result<Option<Indicators>, SpiError> {
        procedures::load_indicators(self.connection(), plan)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::HeightFunction;

    /// Company, unit and plan with locality configuration `K1` (plots 1 and
    /// 2, two subplots each) and stratum `S1` using it.
    pub(crate) fn seed_plan(store: &mut SqliteStore) -> i64 {
        let company = store
            .upsert(
                Table::Company,
                &[("registration", "12345678".into())],
                &[("name", "Lesy Hlinsko".into())],
            )
            .unwrap();
        let unit = store
            .upsert(
                Table::Unit,
                &[("company_id", company.into()), ("code", "LHC01".into())],
                &[("name", "Hlinsko".into())],
            )
            .unwrap();
        let plan = store
            .upsert(
                Table::Plan,
                &[("unit_id", unit.into()), ("valid_from", "2025-01-01".into())],
                &[
                    ("years", 10i64.into()),
                    ("repeated_inventory", true.into()),
                    ("interval_years", 10.0.into()),
                    ("area_ha", 850.5.into()),
                ],
            )
            .unwrap();
        let config = store
            .upsert(
                Table::LocalityConfig,
                &[("company_id", company.into()), ("code", "K1".into())],
                &[("name", "Two plots".into())],
            )
            .unwrap();
        for (plot, azimuth) in [(1i64, 0.0), (2, 180.0)] {
            let plot_id = store
                .upsert(
                    Table::LocalityPlot,
                    &[("locality_config_id", config.into()), ("plot", plot.into())],
                    &[("azimuth", azimuth.into()), ("distance", 50.0.into())],
                )
                .unwrap();
            for (subplot, radius, min_dbh) in [(1i64, 3.0, 7.0), (2, 12.62, 12.0)] {
                store
                    .upsert(
                        Table::LocalitySubplot,
                        &[("locality_plot_id", plot_id.into()), ("subplot", subplot.into())],
                        &[("radius_m", radius.into()), ("min_dbh_cm", min_dbh.into())],
                    )
                    .unwrap();
            }
        }
        store
            .upsert(
                Table::Stratum,
                &[("plan_id", plan.into()), ("code", "S1".into())],
                &[("area_ha", 850.5.into()), ("config", "K1".into())],
            )
            .unwrap();
        plan
    }

    pub(crate) fn tree(locality: i64, plot: i64, stem: i64, dbh: f64, height: Option<f64>) -> SampleTree {
        SampleTree {
            locality,
            plot,
            stem,
            stem_prev: stem,
            species: "SM".to_string(),
            dbh: Some(dbh),
            dbh_prev: Some(dbh - 3.0),
            height,
            height_prev: None,
            model_height: None,
            model_height_prev: None,
            status: "100".to_string(),
            status_prev: "100".to_string(),
            distance: Some(4.0),
            azimuth: Some(90.0),
            note: String::new(),
        }
    }

    #[test]
    fn test_upsert_returns_same_id() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let key = [("registration", Value::from("1"))];
        let first = store.upsert(Table::Company, &key, &[("name", "A".into())]).unwrap();
        let second = store.upsert(Table::Company, &key, &[("name", "B".into())]).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.count(Table::Company).unwrap(), 1);

        let name: String = store
            .connection()
            .query_row("SELECT name FROM company WHERE id = ?1", [first], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "B");
    }

    #[test]
    fn test_upsert_key_only() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let key = [("registration", Value::from("1"))];
        let first = store.upsert(Table::Company, &key, &[]).unwrap();
        assert_eq!(store.upsert(Table::Company, &key, &[]).unwrap(), first);
    }

    #[test]
    fn test_upsert_rejects_unknown_column() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .upsert(Table::Company, &[("registration", "1".into())], &[("name; DROP", "x".into())])
            .unwrap_err();
        assert!(matches!(err, SpiError::StoreError(_)));
    }

    #[test]
    fn test_find() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let plan = seed_plan(&mut store);
        let found = store
            .find(Table::Stratum, &[("plan_id", plan.into()), ("code", "S1".into())])
            .unwrap();
        assert!(found.is_some());
        let missing = store
            .find(Table::Stratum, &[("plan_id", plan.into()), ("code", "S9".into())])
            .unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_staging_replaced() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut ds = Dataset::new("localities", vec!["locality".into(), "stratum".into()]);
        ds.push_row(vec![Value::Integer(1), Value::from("S1")]);
        store.replace_staging(&ds).unwrap();
        ds.push_row(vec![Value::Integer(2), Value::Null]);
        store.replace_staging(&ds).unwrap();

        let staged = store.staging("localities").unwrap().unwrap();
        assert_eq!(staged, ds);
        assert!(store.staging("plots").unwrap().is_none());
    }

    #[test]
    fn test_sample_trees_replaced_atomically() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let plan = seed_plan(&mut store);
        let trees = vec![tree(1, 1, 1, 30.0, Some(25.0)), tree(1, 1, 2, 18.0, None)];
        store.replace_sample_trees(plan, &trees).unwrap();
        store.replace_sample_trees(plan, &trees).unwrap();
        assert_eq!(store.count(Table::SampleTree).unwrap(), 2);
        assert_eq!(store.sample_trees(plan).unwrap(), trees);
    }

    #[test]
    fn test_model_heights_updated_by_stem() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let plan = seed_plan(&mut store);
        store
            .replace_sample_trees(plan, &[tree(1, 1, 1, 30.0, None), tree(1, 1, 2, 18.0, None)])
            .unwrap();
        let key = PlotKey { locality: 1, plot: 1 };
        let updated = store
            .update_model_heights(
                plan,
                Occasion::Current,
                &[
                    ModelHeight { key, stem: 2, height: 17.5 },
                    ModelHeight { key, stem: 0, height: 9.0 },
                ],
            )
            .unwrap();
        assert_eq!(updated, 1);
        let trees = store.sample_trees(plan).unwrap();
        assert_eq!(trees[0].model_height, None);
        assert_eq!(trees[1].model_height, Some(17.5));
    }

    #[test]
    fn test_height_models_roundtrip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let plan = seed_plan(&mut store);
        store
            .upsert(
                Table::HeightModel,
                &[
                    ("plan_id", plan.into()),
                    ("grp", "conifers".into()),
                    ("occasion", "current".into()),
                ],
                &[
                    ("function", "korf".into()),
                    ("a", 4.98.into()),
                    ("b", 0.2.into()),
                    ("r2", 0.99.into()),
                    ("rmse", 0.03.into()),
                    ("sample_size", 40i64.into()),
                ],
            )
            .unwrap();
        let models = store.height_models(plan).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].function, HeightFunction::Korf);
        assert_eq!(models[0].occasion, Occasion::Current);
        assert_eq!(models[0].sample_size, 40);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("spi.db");
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(path.exists());
    }
}
