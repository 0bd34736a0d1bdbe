//! Secondary indexes. They are advisory: the planner uses them to narrow the candidate set,
//! and every candidate is still re-checked against the full filter.

use crate::errors::DbError;
use crate::query::{CmpOp, Filter, Order, eval::get_path};
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<(String, Order)>,
}

impl IndexSpec {
    /// # Errors
    /// Returns `MalformedQuery` for an empty key list, empty or `$`-prefixed field names, or duplicates.
    pub fn new(keys: Vec<(String, Order)>) -> Result<Self, DbError> {
        if keys.is_empty() {
            return Err(DbError::malformed("index needs at least one key"));
        }
        for (i, (field, _)) in keys.iter().enumerate() {
            if field.is_empty() || field.starts_with('$') {
                return Err(DbError::malformed(format!("invalid index field {field:?}")));
            }
            if keys[..i].iter().any(|(f, _)| f == field) {
                return Err(DbError::malformed(format!("index lists {field} twice")));
            }
        }
        Ok(Self { keys })
    }

    pub fn ascending<I, S>(fields: I) -> Result<Self, DbError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(fields.into_iter().map(|f| (f.into(), Order::Asc)).collect())
    }

    /// Parses a key pattern such as `{author: 1, published_year: 1}`.
    ///
    /// # Errors
    /// Returns `MalformedQuery` for directions other than 1 and -1.
    pub fn parse(doc: &BsonDocument) -> Result<Self, DbError> {
        let sort = crate::query::parse_sort(doc)?;
        Self::new(sort.into_iter().map(|s| (s.field, s.order)).collect())
    }

    /// Shell naming convention: `title_1`, `author_1_published_year_1`.
    #[must_use]
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(f, o)| format!("{f}_{}", o.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    #[must_use]
    pub fn key_pattern(&self) -> BsonDocument {
        self.keys.iter().map(|(f, o)| (f.clone(), Bson::Int32(o.as_i32()))).collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(f, _)| f.as_str())
    }
}

/// A single indexed value. Numbers of any width share one key space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Missing,
    Bool(bool),
    Num(OrderedFloat<f64>),
    Str(String),
    Other(String),
}

impl IndexKey {
    pub(crate) fn from_value(v: Option<&Bson>) -> Self {
        match v {
            None | Some(Bson::Null) => Self::Missing,
            Some(v) => Self::from_scalar(v).unwrap_or_else(|| Self::Other(v.to_string())),
        }
    }

    /// Keys for values an equality lookup can be answered for.
    fn from_scalar(v: &Bson) -> Option<Self> {
        match v {
            Bson::Boolean(b) => Some(Self::Bool(*b)),
            Bson::String(s) => Some(Self::Str(s.clone())),
            n => crate::query::eval::as_f64(n).map(|f| Self::Num(OrderedFloat(f))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub keys: usize,
    pub entries: usize,
}

#[derive(Debug, Clone)]
pub struct CompoundIndex {
    pub spec: IndexSpec,
    map: BTreeMap<Vec<IndexKey>, BTreeSet<DocumentId>>,
    pub stats: IndexStats,
}

impl CompoundIndex {
    #[must_use]
    pub fn new(spec: IndexSpec) -> Self {
        Self { spec, map: BTreeMap::new(), stats: IndexStats::default() }
    }

    fn key_for(&self, doc: &BsonDocument) -> Vec<IndexKey> {
        self.spec.fields().map(|f| IndexKey::from_value(get_path(doc, f))).collect()
    }

    pub fn insert(&mut self, doc: &BsonDocument, id: &DocumentId) {
        let key = self.key_for(doc);
        if self.map.entry(key).or_default().insert(id.clone()) {
            self.stats.entries += 1;
        }
        self.stats.keys = self.map.len();
    }

    pub fn remove(&mut self, doc: &BsonDocument, id: &DocumentId) {
        let key = self.key_for(doc);
        if let Some(set) = self.map.get_mut(&key) {
            if set.remove(id) {
                self.stats.entries = self.stats.entries.saturating_sub(1);
            }
            if set.is_empty() {
                self.map.remove(&key);
            }
        }
        self.stats.keys = self.map.len();
    }

    /// Ids whose leading key components equal `prefix`.
    #[must_use]
    pub fn lookup_prefix(&self, prefix: &[IndexKey]) -> Vec<DocumentId> {
        self.map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }
}

/// The index chosen for a filter and the equality prefix it can answer.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    pub index_name: String,
    pub key_pattern: BsonDocument,
    pub prefix: Vec<IndexKey>,
    pub bounds: BsonDocument,
}

#[derive(Debug, Clone, Default)]
pub struct IndexManager {
    indexes: Vec<CompoundIndex>,
}

impl IndexManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `spec` and fills it from `docs`. Returns the index name and whether it was new.
    pub fn create_index<'a, I>(&mut self, spec: IndexSpec, docs: I) -> (String, bool)
    where
        I: IntoIterator<Item = (&'a DocumentId, &'a BsonDocument)>,
    {
        let name = spec.name();
        if self.indexes.iter().any(|i| i.spec == spec) {
            return (name, false);
        }
        let mut idx = CompoundIndex::new(spec);
        for (id, doc) in docs {
            idx.insert(doc, id);
        }
        self.indexes.push(idx);
        (name, true)
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        let before = self.indexes.len();
        self.indexes.retain(|i| i.spec.name() != name);
        before != self.indexes.len()
    }

    #[must_use]
    pub fn specs(&self) -> Vec<IndexSpec> {
        self.indexes.iter().map(|i| i.spec.clone()).collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CompoundIndex> {
        self.indexes.iter().find(|i| i.spec.name() == name)
    }

    pub fn insert_all(&mut self, doc: &BsonDocument, id: &DocumentId) {
        for idx in &mut self.indexes {
            idx.insert(doc, id);
        }
    }

    pub fn remove_all(&mut self, doc: &BsonDocument, id: &DocumentId) {
        for idx in &mut self.indexes {
            idx.remove(doc, id);
        }
    }

    /// Picks the index with the longest leading run of fields pinned by top-level equality.
    /// Ties go to the index created first.
    #[must_use]
    pub fn plan(&self, filter: &Filter) -> Option<IndexPlan> {
        let equalities = top_level_equalities(filter);
        if equalities.is_empty() {
            return None;
        }
        let mut best: Option<(&CompoundIndex, Vec<IndexKey>, BsonDocument)> = None;
        for idx in &self.indexes {
            let mut prefix = Vec::new();
            let mut bounds = BsonDocument::new();
            for field in idx.spec.fields() {
                let Some((value, key)) = equalities.get(field) else { break };
                prefix.push(key.clone());
                bounds.insert(field, vec![Bson::String(format!("[{value}, {value}]"))]);
            }
            let better = best.as_ref().is_none_or(|(_, p, _)| prefix.len() > p.len());
            if !prefix.is_empty() && better {
                best = Some((idx, prefix, bounds));
            }
        }
        best.map(|(idx, prefix, bounds)| IndexPlan {
            index_name: idx.spec.name(),
            key_pattern: idx.spec.key_pattern(),
            prefix,
            bounds,
        })
    }

    #[must_use]
    pub fn candidates(&self, plan: &IndexPlan) -> Option<Vec<DocumentId>> {
        self.get(&plan.index_name).map(|idx| idx.lookup_prefix(&plan.prefix))
    }
}

fn top_level_equalities(filter: &Filter) -> HashMap<&str, (&Bson, IndexKey)> {
    let leaves: Vec<&Filter> = match filter {
        Filter::And(fs) => fs.iter().collect(),
        other => vec![other],
    };
    let mut out = HashMap::new();
    for f in leaves {
        if let Filter::Cmp { path, op: CmpOp::Eq, value } = f
            && let Some(key) = IndexKey::from_scalar(value)
        {
            out.entry(path.as_str()).or_insert((value, key));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn ids(n: usize) -> Vec<DocumentId> {
        (0..n).map(|_| DocumentId::new()).collect()
    }

    #[test]
    fn names_follow_shell_convention() {
        assert_eq!(IndexSpec::ascending(["title"]).unwrap().name(), "title_1");
        let spec = IndexSpec::parse(&doc! {"author": 1, "published_year": -1}).unwrap();
        assert_eq!(spec.name(), "author_1_published_year_-1");
        assert!(IndexSpec::ascending(Vec::<String>::new()).is_err());
        assert!(IndexSpec::ascending(["a", "a"]).is_err());
    }

    #[test]
    fn compound_prefix_lookup() {
        let docs = [
            doc! {"author": "Orwell", "published_year": 1949},
            doc! {"author": "Orwell", "published_year": 1945},
            doc! {"author": "Tolkien", "published_year": 1937},
        ];
        let ids = ids(3);
        let mut mgr = IndexManager::new();
        let spec = IndexSpec::ascending(["author", "published_year"]).unwrap();
        let (name, created) = mgr.create_index(spec.clone(), ids.iter().zip(docs.iter()));
        assert!(created);
        assert!(!mgr.create_index(spec, std::iter::empty()).1);

        let plan = mgr.plan(&Filter::eq("author", "Orwell")).unwrap();
        assert_eq!(plan.index_name, name);
        assert_eq!(mgr.candidates(&plan).unwrap().len(), 2);

        let f = Filter::and(vec![Filter::eq("author", "Orwell"), Filter::eq("published_year", 1949i64)]);
        let plan = mgr.plan(&f).unwrap();
        assert_eq!(plan.prefix.len(), 2);
        assert_eq!(mgr.candidates(&plan).unwrap(), vec![ids[0].clone()]);
    }

    #[test]
    fn non_leading_field_cannot_use_index() {
        let mut mgr = IndexManager::new();
        mgr.create_index(IndexSpec::ascending(["author", "published_year"]).unwrap(), std::iter::empty());
        assert!(mgr.plan(&Filter::eq("published_year", 1949)).is_none());
        assert!(mgr.plan(&Filter::gt("author", "A")).is_none());
    }

    #[test]
    fn remove_keeps_stats_consistent() {
        let d = doc! {"title": "1984"};
        let id = DocumentId::new();
        let mut idx = CompoundIndex::new(IndexSpec::ascending(["title"]).unwrap());
        idx.insert(&d, &id);
        assert_eq!(idx.stats, IndexStats { keys: 1, entries: 1 });
        idx.remove(&d, &id);
        assert_eq!(idx.stats, IndexStats::default());
    }
}
