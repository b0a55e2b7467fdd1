/// Schema of the SQLite store. Natural keys carry `UNIQUE` constraints so
/// that upserts can target them.
pub(super) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS company (
    id INTEGER PRIMARY KEY,
    registration TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL DEFAULT '',
    legal TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS unit (
    id INTEGER PRIMARY KEY,
    company_id INTEGER NOT NULL REFERENCES company(id),
    code TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    legal TEXT NOT NULL DEFAULT '',
    UNIQUE (company_id, code)
);

CREATE TABLE IF NOT EXISTS plan (
    id INTEGER PRIMARY KEY,
    unit_id INTEGER NOT NULL REFERENCES unit(id),
    valid_from TEXT NOT NULL,
    years INTEGER NOT NULL,
    repeated_inventory INTEGER NOT NULL DEFAULT 0,
    interval_years REAL,
    area_ha REAL NOT NULL DEFAULT 0,
    form_factor REAL,
    UNIQUE (unit_id, valid_from)
);

CREATE TABLE IF NOT EXISTS management_group (
    id INTEGER PRIMARY KEY,
    plan_id INTEGER NOT NULL REFERENCES plan(id),
    code TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    UNIQUE (plan_id, code)
);

CREATE TABLE IF NOT EXISTS thickness_class_type (
    id INTEGER PRIMARY KEY,
    company_id INTEGER NOT NULL REFERENCES company(id),
    code TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    UNIQUE (company_id, code)
);

CREATE TABLE IF NOT EXISTS thickness_class (
    id INTEGER PRIMARY KEY,
    class_type_id INTEGER NOT NULL REFERENCES thickness_class_type(id),
    class INTEGER NOT NULL,
    min_dbh REAL NOT NULL,
    max_dbh REAL NOT NULL,
    UNIQUE (class_type_id, class)
);

CREATE TABLE IF NOT EXISTS locality_config (
    id INTEGER PRIMARY KEY,
    company_id INTEGER NOT NULL REFERENCES company(id),
    code TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    UNIQUE (company_id, code)
);

CREATE TABLE IF NOT EXISTS locality_plot (
    id INTEGER PRIMARY KEY,
    locality_config_id INTEGER NOT NULL REFERENCES locality_config(id),
    plot INTEGER NOT NULL,
    azimuth REAL NOT NULL DEFAULT 0,
    distance REAL NOT NULL DEFAULT 0,
    UNIQUE (locality_config_id, plot)
);

CREATE TABLE IF NOT EXISTS locality_subplot (
    id INTEGER PRIMARY KEY,
    locality_plot_id INTEGER NOT NULL REFERENCES locality_plot(id),
    subplot INTEGER NOT NULL,
    radius_m REAL NOT NULL,
    min_dbh_cm REAL NOT NULL,
    UNIQUE (locality_plot_id, subplot)
);

CREATE TABLE IF NOT EXISTS stratum (
    id INTEGER PRIMARY KEY,
    plan_id INTEGER NOT NULL REFERENCES plan(id),
    code TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    area_ha REAL NOT NULL DEFAULT 0,
    config TEXT NOT NULL DEFAULT '',
    UNIQUE (plan_id, code)
);

CREATE TABLE IF NOT EXISTS subregion_type (
    id INTEGER PRIMARY KEY,
    plan_id INTEGER NOT NULL REFERENCES plan(id),
    code TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    UNIQUE (plan_id, code)
);

CREATE TABLE IF NOT EXISTS subregion (
    id INTEGER PRIMARY KEY,
    subregion_type_id INTEGER NOT NULL REFERENCES subregion_type(id),
    code TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    UNIQUE (subregion_type_id, code)
);

CREATE TABLE IF NOT EXISTS staging (
    dataset TEXT PRIMARY KEY,
    columns TEXT NOT NULL,
    rows TEXT NOT NULL,
    imported_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS locality (
    id INTEGER PRIMARY KEY,
    plan_id INTEGER NOT NULL REFERENCES plan(id),
    locality INTEGER NOT NULL,
    stratum TEXT NOT NULL DEFAULT '',
    config TEXT NOT NULL DEFAULT '',
    UNIQUE (plan_id, locality)
);

CREATE TABLE IF NOT EXISTS plot (
    id INTEGER PRIMARY KEY,
    plan_id INTEGER NOT NULL REFERENCES plan(id),
    locality INTEGER NOT NULL,
    plot INTEGER NOT NULL,
    stratum TEXT NOT NULL DEFAULT '',
    config TEXT NOT NULL DEFAULT '',
    azimuth REAL NOT NULL DEFAULT 0,
    distance REAL NOT NULL DEFAULT 0,
    stab_azimuth REAL,
    stab_distance REAL,
    target_stock INTEGER,
    max_stock REAL,
    regeneration_period REAL,
    surveyor TEXT,
    note TEXT,
    status TEXT,
    accessible TEXT,
    stabilized TEXT,
    land_category TEXT,
    forest TEXT,
    UNIQUE (plan_id, locality, plot)
);

CREATE TABLE IF NOT EXISTS sample_tree (
    id INTEGER PRIMARY KEY,
    plan_id INTEGER NOT NULL REFERENCES plan(id),
    locality INTEGER NOT NULL,
    plot INTEGER NOT NULL,
    stem INTEGER NOT NULL DEFAULT 0,
    stem_prev INTEGER NOT NULL DEFAULT 0,
    species TEXT NOT NULL DEFAULT '',
    dbh REAL,
    dbh_prev REAL,
    height REAL,
    height_prev REAL,
    model_height REAL,
    model_height_prev REAL,
    status TEXT NOT NULL DEFAULT '',
    status_prev TEXT NOT NULL DEFAULT '',
    distance REAL,
    azimuth REAL,
    note TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS sample_tree_plot ON sample_tree (plan_id, locality, plot);

CREATE TABLE IF NOT EXISTS navigation_point (
    id INTEGER PRIMARY KEY,
    plan_id INTEGER NOT NULL REFERENCES plan(id),
    locality INTEGER NOT NULL,
    plot INTEGER NOT NULL,
    point INTEGER NOT NULL DEFAULT 0,
    x_m REAL,
    y_m REAL,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS height_model (
    id INTEGER PRIMARY KEY,
    plan_id INTEGER NOT NULL REFERENCES plan(id),
    grp TEXT NOT NULL,
    occasion TEXT NOT NULL,
    function TEXT NOT NULL,
    a REAL NOT NULL,
    b REAL NOT NULL,
    r2 REAL NOT NULL,
    rmse REAL NOT NULL,
    sample_size INTEGER NOT NULL,
    UNIQUE (plan_id, grp, occasion)
);

CREATE TABLE IF NOT EXISTS indicator (
    id INTEGER PRIMARY KEY,
    plan_id INTEGER NOT NULL REFERENCES plan(id),
    name TEXT NOT NULL,
    mean REAL NOT NULL,
    std_error REAL,
    lower REAL,
    upper REAL,
    confidence REAL,
    sample_size INTEGER,
    sampling_error REAL,
    UNIQUE (plan_id, name)
);
";

/// Plot attributes an imported `plots` dataset may carry.
pub(super) const PLOT_ATTRIBUTES: &[&str] = &[
    "stab_azimuth",
    "stab_distance",
    "target_stock",
    "max_stock",
    "regeneration_period",
    "surveyor",
    "note",
    "status",
    "accessible",
    "stabilized",
    "land_category",
    "forest",
];
