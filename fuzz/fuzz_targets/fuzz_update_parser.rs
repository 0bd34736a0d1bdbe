#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(update) = booklite::query::parse_update_json(s)
    {
        let _ = booklite::book::validate_update(&update);
        let mut doc = bson::doc! {"title": "1984", "price": 10.99, "published_year": 1949};
        let _ = booklite::query::apply_update(&mut doc, &update);
    }
});
