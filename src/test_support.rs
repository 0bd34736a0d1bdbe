#![cfg(test)]

// Small helpers shared by unit tests
use crate::Database;
use crate::fixtures::sample_books;
use bson::Document as BsonDocument;

/// A database holding the twelve sample books.
pub fn sample_db() -> Database {
    let db = Database::new();
    db.seed_books(&sample_books()).expect("sample books are valid");
    db
}

/// The `title` of each document, in order. Documents without one are skipped.
pub fn titles(docs: &[BsonDocument]) -> Vec<String> {
    docs.iter().filter_map(|d| d.get_str("title").ok().map(str::to_owned)).collect()
}
