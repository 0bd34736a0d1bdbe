#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(filter) = booklite::query::parse_filter_json(s)
    {
        let docs = [
            bson::doc! {"title": "1984", "author": "George Orwell", "published_year": 1949, "price": 10.99},
            bson::doc! {"title": "x", "price": -5, "tags": ["a", "b"], "nested": {"z": 3}},
            bson::doc! {"in_stock": true},
        ];
        for d in &docs {
            let _ = booklite::query::eval_filter(d, &filter);
        }
    }
});
