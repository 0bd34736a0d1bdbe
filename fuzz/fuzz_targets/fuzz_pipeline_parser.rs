#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(pipeline) = booklite::aggregate::parse_pipeline_json(s)
    {
        let docs = vec![
            bson::doc! {"genre": "Fiction", "price": 12.99, "published_year": 1960},
            bson::doc! {"genre": "Fiction", "price": 9, "published_year": 1925},
            bson::doc! {"genre": "Fantasy", "author": "J.R.R. Tolkien"},
        ];
        let _ = booklite::aggregate::run_stages(docs, &pipeline.stages);
    }
});
