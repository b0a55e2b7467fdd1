//! Built-in step operations.

mod export;
mod height;
mod import;
mod indicators;
mod init;
mod plots;

pub use export::{export_results, HEIGHT_MODELS_FILE, INDICATORS_FILE, SAMPLE_TREES_FILE};
pub use height::{height_model, SOURCE_COMPUTE, SOURCE_IMPORT_MODEL, SOURCE_IMPORT_SAMPLES};
pub use import::{import_data, import_tables, INVENTORY_DATASETS};
pub use indicators::compute_indicators;
pub use init::{init_subregions, init_unit, THICKNESS_CLASS_TYPE};
pub use plots::{compute_areas, generate_plots};
