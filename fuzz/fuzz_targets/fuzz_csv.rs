#![no_main]

use forest_spi::io::read_csv_dataset_from_bytes;
use forest_spi::validation::{coerce, rule_set, validate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut dataset) = read_csv_dataset_from_bytes(data, "trees") else {
        return;
    };
    if let Some(rules) = rule_set("trees") {
        coerce(&mut dataset, &rules);
        let report = validate(&dataset, &rules);
        assert!(report.checked_rows == dataset.len());
    }
});
