use super::core::Collection;
use crate::document::Document;
use crate::types::DocumentId;
use bson::Document as BsonDocument;

impl Collection {
    /// Appends `body` as a new document and returns its generated id.
    pub fn insert_document(&self, body: BsonDocument) -> DocumentId {
        let document = Document::new(body);
        let id = document.id.clone();
        let mut docs = self.docs.write();
        self.indexes.write().insert_all(&document.data, &id);
        docs.push(document);
        log::trace!("insert {} into {}", id, self.name());
        id
    }

    pub fn insert_many<I: IntoIterator<Item = BsonDocument>>(&self, bodies: I) -> Vec<DocumentId> {
        bodies.into_iter().map(|b| self.insert_document(b)).collect()
    }

    #[must_use]
    pub fn find_document(&self, id: &DocumentId) -> Option<Document> {
        self.docs.read().iter().find(|d| &d.id == id).cloned()
    }

    /// Replaces the body of `id`, keeping its identifier. Returns false when `id` is unknown.
    pub fn update_document(&self, id: &DocumentId, body: BsonDocument) -> bool {
        let mut docs = self.docs.write();
        let Some(slot) = docs.iter_mut().find(|d| &d.id == id) else {
            return false;
        };
        let mut replacement = Document::new(body);
        replacement.id = id.clone();
        replacement.data.insert(crate::types::ID_FIELD, id.to_string());
        replacement.metadata.created_at = slot.metadata.created_at;
        let mut indexes = self.indexes.write();
        indexes.remove_all(&slot.data, id);
        indexes.insert_all(&replacement.data, id);
        *slot = replacement;
        true
    }

    pub fn delete_document(&self, id: &DocumentId) -> bool {
        let mut docs = self.docs.write();
        let Some(pos) = docs.iter().position(|d| &d.id == id) else {
            return false;
        };
        let removed = docs.remove(pos);
        self.indexes.write().remove_all(&removed.data, id);
        true
    }

    /// Snapshot of every document in natural order.
    #[must_use]
    pub fn get_all_documents(&self) -> Vec<Document> {
        self.docs.read().clone()
    }

    #[must_use]
    pub fn list_ids(&self) -> Vec<DocumentId> {
        self.docs.read().iter().map(|d| d.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::collection::Collection;
    use bson::doc;

    #[test]
    fn insertion_order_is_preserved_across_deletes() {
        let col = Collection::new("books");
        let ids = col.insert_many([doc! {"n": 1}, doc! {"n": 2}, doc! {"n": 3}]);
        assert!(col.delete_document(&ids[1]));
        assert!(!col.delete_document(&ids[1]));
        assert_eq!(col.list_ids(), vec![ids[0].clone(), ids[2].clone()]);
    }

    #[test]
    fn update_keeps_identifier() {
        let col = Collection::new("books");
        let id = col.insert_document(doc! {"title": "Emma"});
        assert!(col.update_document(&id, doc! {"title": "Persuasion", "_id": "spoofed"}));
        let d = col.find_document(&id).unwrap();
        assert_eq!(d.data.get_str("_id").unwrap(), id.to_string());
        assert_eq!(d.data.get_str("title").unwrap(), "Persuasion");
        assert!(!col.update_document(&crate::types::DocumentId::new(), doc! {}));
    }
}
