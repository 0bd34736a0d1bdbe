#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(doc) = booklite::query::json_to_document(s)
    {
        // book-aware parsing must agree with generic parsing on what is malformed syntax
        let generic = booklite::query::parse_filter(&doc);
        let typed = booklite::book::parse_book_filter(&doc);
        if generic.is_err() {
            assert!(typed.is_err());
        }
    }
});
