use super::core::Collection;
use crate::index::IndexSpec;

impl Collection {
    /// Builds `spec` over the current documents. Returns the index name and whether it was new.
    pub fn create_index(&self, spec: IndexSpec) -> (String, bool) {
        let start = std::time::Instant::now();
        let docs = self.docs.read();
        let mut mgr = self.indexes.write();
        let (name, created) = mgr.create_index(spec, docs.iter().map(|d| (&d.id, &d.data)));
        if created {
            log::info!(
                "built index {} on {} over {} documents in {}ms",
                name,
                self.name(),
                docs.len(),
                start.elapsed().as_millis()
            );
        }
        (name, created)
    }

    pub fn drop_index(&self, name: &str) -> bool {
        self.indexes.write().drop_index(name)
    }

    #[must_use]
    pub fn list_indexes(&self) -> Vec<IndexSpec> {
        self.indexes.read().specs()
    }
}
