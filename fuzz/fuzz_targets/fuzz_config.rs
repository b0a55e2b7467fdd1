#![no_main]

use forest_spi::config::{RunConfig, UnitConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(unit) = UnitConfig::from_toml_str(raw) {
        let _ = unit.thickness_classes.classes();
    }
    if let Ok(run) = RunConfig::from_toml_str(raw) {
        let _ = run.enabled_keys("import_csv.data");
        let _ = run.ignore_warnings();
    }
});
