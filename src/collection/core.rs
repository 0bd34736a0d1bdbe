use crate::document::Document;
use crate::index::IndexManager;
use crate::types::CollectionName;
use parking_lot::RwLock;

/// Documents are kept in insertion order; "first match" always means first in this order.
///
/// Lock order is `docs` before `indexes` everywhere.
pub struct Collection {
    name: CollectionName,
    pub(crate) docs: RwLock<Vec<Document>>,
    pub(crate) indexes: RwLock<IndexManager>,
}

impl Collection {
    #[must_use]
    pub fn new(name: impl Into<CollectionName>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(Vec::new()),
            indexes: RwLock::new(IndexManager::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("name", &self.name).field("len", &self.len()).finish()
    }
}
