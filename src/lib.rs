pub mod aggregate;
pub mod book;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod document;
pub mod engine;
pub mod errors;
pub mod fixtures;
pub mod import;
pub mod index;
pub mod logger;
pub mod query;
pub mod querylog;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

use crate::book::Book;
use crate::catalog::{CatalogEntry, Request, Response, find_entry};
use crate::collection::Collection;
use crate::config::AppConfig;
use crate::engine::Engine;
use crate::errors::DbError;
use crate::import::{ImportOptions, ImportReport};
use crate::store::DocumentStore;
use crate::types::{BOOKS_COLLECTION, CollectionName};
use std::path::Path;
use std::sync::Arc;

const DEFAULT_RANDOM_SEED: u64 = 42;

/// An in-memory books database that catalog requests run against.
#[derive(Debug)]
pub struct Database {
    engine: Arc<Engine>,
    collection: CollectionName,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// An empty database whose books live in the `books` collection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_collection(BOOKS_COLLECTION)
    }

    #[must_use]
    pub fn with_collection(name: impl Into<CollectionName>) -> Self {
        let engine = Arc::new(Engine::new());
        let collection = name.into();
        engine.create_collection(collection.clone());
        Self { engine, collection }
    }

    /// Builds and seeds a database as `cfg` describes: the seed file (or the built-in
    /// sample shelf), then `random_count` generated books.
    ///
    /// # Errors
    /// Propagates import failures from the seed file.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, DbError> {
        let db = Self::with_collection(cfg.collection());
        match &cfg.seed_file {
            Some(path) => {
                db.import_file(path, &ImportOptions::default())?;
            }
            None => {
                db.seed_books(&fixtures::sample_books())?;
            }
        }
        if let Some(n) = cfg.random_count.filter(|n| *n > 0) {
            let seed = cfg.random_seed.unwrap_or(DEFAULT_RANDOM_SEED);
            db.seed_books(&fixtures::random_books(n, seed))?;
        }
        log::info!("database ready: {} books in {}", db.books().len(), db.collection);
        Ok(db)
    }

    #[must_use]
    pub const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// The collection catalog requests are directed to.
    #[must_use]
    pub fn books(&self) -> Arc<Collection> {
        self.engine.create_collection(self.collection.clone())
    }

    /// Validates and appends `books` in order. Nothing is inserted if any book is invalid.
    ///
    /// # Errors
    /// Returns `InvalidDocument` for the first invalid book.
    pub fn seed_books(&self, books: &[Book]) -> Result<usize, DbError> {
        books.iter().try_for_each(Book::validate)?;
        let col = self.books();
        col.insert_many(books.iter().map(Book::to_document));
        Ok(books.len())
    }

    /// # Errors
    /// See [`import::import_file`].
    pub fn import_file<P: AsRef<Path>>(&self, path: P, opts: &ImportOptions) -> Result<ImportReport, DbError> {
        import::import_file(&self.books(), path, opts)
    }

    /// Every stored book in natural order.
    ///
    /// # Errors
    /// Returns `InvalidDocument` if a stored document is not a valid book record.
    pub fn all_books(&self) -> Result<Vec<Book>, DbError> {
        self.books().get_all_documents().iter().map(|d| Book::from_document(&d.data)).collect()
    }

    /// Runs a catalog entry by name against this database's collection.
    ///
    /// # Errors
    /// `MalformedQuery` for unknown names, otherwise as [`Database::run`].
    pub fn run_entry(&self, name: &str) -> Result<(CatalogEntry, Response), DbError> {
        let entry = find_entry(name)?;
        let response = self.run(&entry.request)?;
        Ok((entry, response))
    }

    /// Executes `request`. Requests aimed at the default `books` collection are redirected
    /// to the configured collection.
    ///
    /// # Errors
    /// See [`DocumentStore::execute`].
    pub fn run(&self, request: &Request) -> Result<Response, DbError> {
        if request.collection() == BOOKS_COLLECTION && self.collection != BOOKS_COLLECTION {
            return self.engine.execute(&request.clone().on(self.collection.clone()));
        }
        self.engine.execute(request)
    }
}

impl DocumentStore for Database {
    fn execute(&self, request: &Request) -> Result<Response, DbError> {
        self.run(request)
    }
}

/// Console logging at INFO, for binaries and examples that do not load a config.
///
/// # Errors
/// Returns `Config` if the logger cannot be set up.
pub fn init() -> Result<(), DbError> {
    logger::init_console(log::LevelFilter::Info)
}
