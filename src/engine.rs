use crate::aggregate::run_pipeline;
use crate::book::{check_updated_record, validate_update};
use crate::catalog::{Operation, Request, Response};
use crate::collection::Collection;
use crate::errors::DbError;
use crate::query::{DeleteReport, UpdateReport, delete_one, explain_find, find_docs, update_one_checked};
use crate::store::DocumentStore;
use crate::types::CollectionName;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The in-memory store. Collections live behind one map lock; each collection
/// carries its own document and index locks.
#[derive(Default)]
pub struct Engine {
    pub(crate) collections: RwLock<HashMap<CollectionName, Arc<Collection>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("collections", &self.list_collection_names()).finish()
    }
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named collection, creating it if needed.
    pub fn create_collection(&self, name: impl Into<CollectionName>) -> Arc<Collection> {
        let name = name.into();
        if let Some(existing) = self.collections.read().get(&name) {
            return Arc::clone(existing);
        }
        let mut map = self.collections.write();
        Arc::clone(map.entry(name.clone()).or_insert_with(|| {
            log::info!("created collection {name}");
            Arc::new(Collection::new(name))
        }))
    }

    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    pub fn delete_collection(&self, name: &str) -> bool {
        let removed = self.collections.write().remove(name).is_some();
        if removed {
            log::info!("dropped collection {name}");
        }
        removed
    }

    /// Sorted collection names.
    #[must_use]
    pub fn list_collection_names(&self) -> Vec<CollectionName> {
        let mut names: Vec<_> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// A missing collection reads as an empty one.
    fn collection_or_empty(&self, name: &str) -> Arc<Collection> {
        self.get_collection(name).unwrap_or_else(|| Arc::new(Collection::new(name)))
    }
}

impl DocumentStore for Engine {
    fn execute(&self, request: &Request) -> Result<Response, DbError> {
        log::debug!("executing {} on {}", request.kind(), request.collection());
        let name = request.collection();
        Ok(match request.operation() {
            Operation::Find { filter, options } => {
                let col = self.collection_or_empty(name);
                Response::Documents(find_docs(&col, filter, options).to_vec())
            }
            Operation::UpdateOne { filter, update } => {
                validate_update(update)?;
                Response::Updated(match self.get_collection(name) {
                    Some(col) => update_one_checked(&col, filter, update, check_updated_record)?,
                    None => UpdateReport::default(),
                })
            }
            Operation::DeleteOne { filter } => Response::Deleted(match self.get_collection(name) {
                Some(col) => delete_one(&col, filter),
                None => DeleteReport::default(),
            }),
            Operation::Aggregate { pipeline } => {
                let col = self.collection_or_empty(name);
                Response::Documents(run_pipeline(&col, pipeline)?)
            }
            Operation::CreateIndex { spec } => {
                let (name, created) = self.create_collection(name).create_index(spec.clone());
                Response::IndexCreated { name, created }
            }
            Operation::Explain { filter, options, verbosity } => {
                let col = self.collection_or_empty(name);
                Response::Explain(explain_find(&col, filter, options, *verbosity))
            }
        })
    }
}
