use crate::types::{DocumentId, ID_FIELD};
use bson::{Bson, Document as BsonDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self { created_at: now, updated_at: now }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A stored document. `data` always starts with the `_id` field holding `id` as a string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: BsonDocument,
    pub metadata: Metadata,
}

impl Document {
    /// Wraps `body` with a fresh identifier. Any `_id` already present in `body` is replaced.
    #[must_use]
    pub fn new(body: BsonDocument) -> Self {
        let id = DocumentId::new();
        let mut data = BsonDocument::new();
        data.insert(ID_FIELD, Bson::String(id.to_string()));
        for (k, v) in body {
            if k != ID_FIELD {
                data.insert(k, v);
            }
        }
        Self { id, data, metadata: Metadata::new() }
    }

    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }
}
