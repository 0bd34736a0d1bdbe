#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 16384 { return; }
    let col = booklite::collection::Collection::new("fuzz");
    let opts = booklite::import::ImportOptions {
        format: booklite::import::ImportFormat::Auto,
        skip_errors: true,
        progress_every: None,
    };
    if let Ok(report) = booklite::import::import_books(&col, data, &opts) {
        assert_eq!(report.inserted as usize, col.len());
    }
});
