//! Loading book records from JSON files: either one JSON array or one object per line.

use crate::book::Book;
use crate::collection::Collection;
use crate::errors::DbError;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportFormat {
    #[default]
    Auto,
    /// A single JSON array of records.
    JsonArray,
    /// One JSON record per line; blank lines are ignored.
    Ndjson,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub format: ImportFormat,
    /// Skip records that fail to parse or validate instead of aborting.
    pub skip_errors: bool,
    pub progress_every: Option<usize>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { format: ImportFormat::Auto, skip_errors: false, progress_every: Some(1000) }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: u64,
    pub skipped: u64,
}

fn detect_from_path(path: &Path) -> ImportFormat {
    match path.extension().and_then(|s| s.to_str()).map(str::to_lowercase).as_deref() {
        Some("jsonl" | "ndjson") => ImportFormat::Ndjson,
        Some("json") => ImportFormat::JsonArray,
        _ => ImportFormat::Auto,
    }
}

/// Peeks at the buffered head without consuming it.
fn detect_from_content<R: BufRead>(reader: &mut R) -> Result<ImportFormat, DbError> {
    let head = reader.fill_buf()?;
    let first = head.iter().find(|b| !b.is_ascii_whitespace());
    Ok(if first == Some(&b'[') { ImportFormat::JsonArray } else { ImportFormat::Ndjson })
}

fn parse_record(value: serde_json::Value, at: &str) -> Result<Book, DbError> {
    let book: Book = serde_json::from_value(value)
        .map_err(|e| DbError::InvalidDocument(format!("{at}: {e}")))?;
    book.validate().map_err(|e| DbError::InvalidDocument(format!("{at}: {e}")))?;
    Ok(book)
}

/// Reads and validates books without storing them.
///
/// # Errors
/// I/O and JSON syntax errors, or `InvalidDocument` for the first bad record when
/// `skip_errors` is off.
pub fn read_books<R: Read>(reader: R, opts: &ImportOptions) -> Result<(Vec<Book>, u64), DbError> {
    let mut reader = BufReader::new(reader);
    let format = match opts.format {
        ImportFormat::Auto => detect_from_content(&mut reader)?,
        f => f,
    };
    let mut books = Vec::new();
    let mut skipped = 0u64;
    let mut keep = |result: Result<Book, DbError>| -> Result<(), DbError> {
        match result {
            Ok(b) => books.push(b),
            Err(e) if opts.skip_errors => {
                log::warn!("skipping record: {e}");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    };
    if format == ImportFormat::JsonArray {
        let values: Vec<serde_json::Value> = serde_json::from_reader(reader)?;
        for (i, v) in values.into_iter().enumerate() {
            keep(parse_record(v, &format!("record {}", i + 1)))?;
        }
    } else {
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let at = format!("line {}", i + 1);
            let parsed = serde_json::from_str::<serde_json::Value>(line)
                .map_err(|e| DbError::InvalidDocument(format!("{at}: {e}")))
                .and_then(|v| parse_record(v, &at));
            keep(parsed)?;
        }
    }
    Ok((books, skipped))
}

/// Reads books from `reader` and appends them to `col` in input order.
///
/// # Errors
/// Same as [`read_books`]. Nothing is inserted when an error aborts the import.
pub fn import_books<R: Read>(col: &Collection, reader: R, opts: &ImportOptions) -> Result<ImportReport, DbError> {
    let (books, skipped) = read_books(reader, opts)?;
    let mut report = ImportReport { inserted: 0, skipped };
    for book in &books {
        col.insert_document(book.to_document());
        report.inserted += 1;
        if let Some(n) = opts.progress_every
            && n > 0
            && report.inserted % n as u64 == 0
        {
            log::info!("imported {} books into {}", report.inserted, col.name());
        }
    }
    log::info!("import into {} done: inserted={} skipped={}", col.name(), report.inserted, report.skipped);
    Ok(report)
}

/// Imports from a file. The extension (`.json`, `.jsonl`, `.ndjson`) picks the format
/// when `opts.format` is `Auto`.
///
/// # Errors
/// Same as [`import_books`], plus failure to open `path`.
pub fn import_file<P: AsRef<Path>>(col: &Collection, path: P, opts: &ImportOptions) -> Result<ImportReport, DbError> {
    let path = path.as_ref();
    log::info!("import: path={}, collection={}", path.display(), col.name());
    let mut opts = opts.clone();
    if opts.format == ImportFormat::Auto {
        opts.format = detect_from_path(path);
    }
    import_books(col, File::open(path)?, &opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REC: &str = r#"{"title":"Dune","author":"Frank Herbert","genre":"Science Fiction","published_year":1965,"price":9.99,"in_stock":true}"#;

    #[test]
    fn reads_arrays_and_lines() {
        let array = format!("  [{REC}, {REC}]");
        let (books, skipped) = read_books(array.as_bytes(), &ImportOptions::default()).unwrap();
        assert_eq!((books.len(), skipped), (2, 0));
        let lines = format!("{REC}\n\n{REC}\n");
        let (books, _) = read_books(lines.as_bytes(), &ImportOptions::default()).unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].published_year, 1965);
    }

    #[test]
    fn alias_year_is_accepted() {
        let rec = REC.replace("published_year", "publishedYear");
        let (books, _) = read_books(rec.as_bytes(), &ImportOptions::default()).unwrap();
        assert_eq!(books[0].published_year, 1965);
    }

    #[test]
    fn bad_records_abort_or_skip() {
        let input = format!("{REC}\nnot json\n{}\n", REC.replace("9.99", "-1"));
        assert!(read_books(input.as_bytes(), &ImportOptions::default()).is_err());
        let opts = ImportOptions { skip_errors: true, ..ImportOptions::default() };
        let (books, skipped) = read_books(input.as_bytes(), &opts).unwrap();
        assert_eq!((books.len(), skipped), (1, 2));
    }
}
