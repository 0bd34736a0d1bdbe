use booklite::Database;
use booklite::collection::Collection;
use booklite::errors::DbError;
use booklite::import::{ImportFormat, ImportOptions, import_books, import_file, read_books};
use std::fs;
use tempfile::tempdir;

const GOOD: &str = r#"{"title":"Dune","author":"Frank Herbert","genre":"Science Fiction","published_year":1965,"price":9.99,"in_stock":true}"#;
const NEGATIVE_PRICE: &str = r#"{"title":"Bad","author":"Nobody","genre":"Fiction","published_year":2000,"price":-1,"in_stock":true}"#;

#[test]
fn test_json_array_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("books.json");
    fs::write(&path, format!("[{GOOD}, {GOOD}]")).unwrap();
    let col = Collection::new("books");
    let report = import_file(&col, &path, &ImportOptions::default()).unwrap();
    assert_eq!((report.inserted, report.skipped), (2, 0));
    assert_eq!(col.len(), 2);
}

#[test]
fn test_content_detection_for_unknown_extension() {
    let dir = tempdir().unwrap();
    let array = dir.path().join("a.txt");
    fs::write(&array, format!("  \n[{GOOD}]")).unwrap();
    let lines = dir.path().join("b.txt");
    fs::write(&lines, format!("{GOOD}\n\n{GOOD}\n")).unwrap();
    let col = Collection::new("books");
    assert_eq!(import_file(&col, &array, &ImportOptions::default()).unwrap().inserted, 1);
    assert_eq!(import_file(&col, &lines, &ImportOptions::default()).unwrap().inserted, 2);
}

#[test]
fn test_invalid_record_aborts_without_inserting() {
    let col = Collection::new("books");
    let input = format!("{GOOD}\n{NEGATIVE_PRICE}\n");
    let err = import_books(&col, input.as_bytes(), &ImportOptions::default()).unwrap_err();
    assert!(matches!(err, DbError::InvalidDocument(ref m) if m.starts_with("line 2")));
    assert!(col.is_empty());
}

#[test]
fn test_skip_errors_keeps_going() {
    let opts = ImportOptions { format: ImportFormat::Ndjson, skip_errors: true, progress_every: None };
    let input = format!("{GOOD}\nnot json\n{NEGATIVE_PRICE}\n{GOOD}\n");
    let (books, skipped) = read_books(input.as_bytes(), &opts).unwrap();
    assert_eq!(books.len(), 2);
    assert_eq!(skipped, 2);
}

#[test]
fn test_missing_fields_are_invalid() {
    let input = r#"[{"title":"No Author","genre":"Fiction","published_year":2000,"price":1,"in_stock":true}]"#;
    let opts = ImportOptions { format: ImportFormat::JsonArray, ..ImportOptions::default() };
    assert!(matches!(read_books(input.as_bytes(), &opts), Err(DbError::InvalidDocument(_))));
}

#[test]
fn test_imported_books_are_queryable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("more.ndjson");
    fs::write(&path, format!("{GOOD}\n")).unwrap();
    let db = Database::new();
    db.import_file(&path, &ImportOptions::default()).unwrap();
    let (_, response) = db.run_entry("books-published-after").unwrap();
    let docs = response.into_documents().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get_str("title").unwrap(), "Dune");
}
