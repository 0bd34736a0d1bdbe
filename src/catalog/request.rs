use crate::aggregate::{Pipeline, pipeline_to_documents};
use crate::errors::DbError;
use crate::index::IndexSpec;
use crate::query::{
    DeleteReport, ExplainVerbosity, Filter, FindOptions, Projection, SortSpec, UpdateDoc, UpdateReport,
    filter_to_document, projection_to_document, sort_to_document, update_to_document,
};
use crate::types::CollectionName;
use bson::{Bson, Document as BsonDocument, doc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Find,
    UpdateOne,
    DeleteOne,
    Aggregate,
    CreateIndex,
    Explain,
}

impl OperationKind {
    /// Shell method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::UpdateOne => "updateOne",
            Self::DeleteOne => "deleteOne",
            Self::Aggregate => "aggregate",
            Self::CreateIndex => "createIndex",
            Self::Explain => "explain",
        }
    }

    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::UpdateOne | Self::DeleteOne | Self::CreateIndex)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Find { filter: Filter, options: FindOptions },
    UpdateOne { filter: Filter, update: UpdateDoc },
    DeleteOne { filter: Filter },
    Aggregate { pipeline: Pipeline },
    CreateIndex { spec: IndexSpec },
    Explain { filter: Filter, options: FindOptions, verbosity: ExplainVerbosity },
}

impl Operation {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Find { .. } => OperationKind::Find,
            Self::UpdateOne { .. } => OperationKind::UpdateOne,
            Self::DeleteOne { .. } => OperationKind::DeleteOne,
            Self::Aggregate { .. } => OperationKind::Aggregate,
            Self::CreateIndex { .. } => OperationKind::CreateIndex,
            Self::Explain { .. } => OperationKind::Explain,
        }
    }
}

/// One validated request against a named collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    collection: CollectionName,
    op: Operation,
}

impl Request {
    pub fn new(collection: impl Into<CollectionName>, op: Operation) -> Self {
        Self { collection: collection.into(), op }
    }

    /// The same request against another collection.
    #[must_use]
    pub fn on(mut self, collection: impl Into<CollectionName>) -> Self {
        self.collection = collection.into();
        self
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub const fn operation(&self) -> &Operation {
        &self.op
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.op.kind()
    }

    #[must_use]
    pub const fn filter(&self) -> Option<&Filter> {
        match &self.op {
            Operation::Find { filter, .. }
            | Operation::UpdateOne { filter, .. }
            | Operation::DeleteOne { filter }
            | Operation::Explain { filter, .. } => Some(filter),
            Operation::Aggregate { .. } | Operation::CreateIndex { .. } => None,
        }
    }

    const fn options(&self) -> Option<&FindOptions> {
        match &self.op {
            Operation::Find { options, .. } | Operation::Explain { options, .. } => Some(options),
            _ => None,
        }
    }

    #[must_use]
    pub fn projection(&self) -> Option<&Projection> {
        self.options().and_then(|o| o.projection.as_ref())
    }

    #[must_use]
    pub fn sort(&self) -> Option<&[SortSpec]> {
        self.options().and_then(|o| o.sort.as_deref())
    }

    #[must_use]
    pub fn skip(&self) -> Option<usize> {
        self.options().and_then(|o| o.skip)
    }

    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.options().and_then(|o| o.limit)
    }

    #[must_use]
    pub const fn update(&self) -> Option<&UpdateDoc> {
        match &self.op {
            Operation::UpdateOne { update, .. } => Some(update),
            _ => None,
        }
    }

    #[must_use]
    pub const fn pipeline(&self) -> Option<&Pipeline> {
        match &self.op {
            Operation::Aggregate { pipeline } => Some(pipeline),
            _ => None,
        }
    }

    #[must_use]
    pub const fn index_spec(&self) -> Option<&IndexSpec> {
        match &self.op {
            Operation::CreateIndex { spec } => Some(spec),
            _ => None,
        }
    }

    #[must_use]
    pub const fn verbosity(&self) -> Option<ExplainVerbosity> {
        match &self.op {
            Operation::Explain { verbosity, .. } => Some(*verbosity),
            _ => None,
        }
    }

    /// Renders the request as a database command document.
    #[must_use]
    pub fn to_command(&self) -> BsonDocument {
        let coll = self.collection.as_str();
        match &self.op {
            Operation::Find { filter, options } => find_command(coll, filter, options),
            Operation::UpdateOne { filter, update } => doc! {
                "update": coll,
                "updates": [{"q": filter_to_document(filter), "u": update_to_document(update), "multi": false}],
            },
            Operation::DeleteOne { filter } => doc! {
                "delete": coll,
                "deletes": [{"q": filter_to_document(filter), "limit": 1}],
            },
            Operation::Aggregate { pipeline } => doc! {
                "aggregate": coll,
                "pipeline": pipeline_to_documents(pipeline),
                "cursor": {},
            },
            Operation::CreateIndex { spec } => doc! {
                "createIndexes": coll,
                "indexes": [{"key": spec.key_pattern(), "name": spec.name()}],
            },
            Operation::Explain { filter, options, verbosity } => doc! {
                "explain": find_command(coll, filter, options),
                "verbosity": verbosity.as_str(),
            },
        }
    }

    /// Renders the request the way it would be typed into the shell,
    /// e.g. `db.books.find({"genre":"Fiction"})`.
    ///
    /// # Errors
    /// Returns a JSON error if a value cannot be rendered.
    pub fn to_shell(&self) -> Result<String, DbError> {
        let coll = self.collection.as_str();
        Ok(match &self.op {
            Operation::Find { filter, options } => find_call(coll, filter, options)?,
            Operation::UpdateOne { filter, update } => format!(
                "db.{coll}.updateOne({}, {})",
                json(&filter_to_document(filter))?,
                json(&update_to_document(update))?
            ),
            Operation::DeleteOne { filter } => format!("db.{coll}.deleteOne({})", json(&filter_to_document(filter))?),
            Operation::Aggregate { pipeline } => {
                format!("db.{coll}.aggregate({})", serde_json::to_string(&pipeline_to_documents(pipeline))?)
            }
            Operation::CreateIndex { spec } => format!("db.{coll}.createIndex({})", json(&spec.key_pattern())?),
            Operation::Explain { filter, options, verbosity } => {
                format!("{}.explain(\"{verbosity}\")", find_call(coll, filter, options)?)
            }
        })
    }
}

fn json(doc: &BsonDocument) -> Result<String, DbError> {
    Ok(serde_json::to_string(doc)?)
}

/// `db.<coll>.find(filter[, projection])` plus any `.sort()`, `.skip()`, `.limit()` calls.
fn find_call(coll: &str, filter: &Filter, options: &FindOptions) -> Result<String, DbError> {
    let mut out = format!("db.{coll}.find({}", json(&filter_to_document(filter))?);
    if let Some(p) = &options.projection {
        out.push_str(&format!(", {}", json(&projection_to_document(p))?));
    }
    out.push(')');
    if let Some(s) = &options.sort {
        out.push_str(&format!(".sort({})", json(&sort_to_document(s))?));
    }
    if let Some(n) = options.skip {
        out.push_str(&format!(".skip({n})"));
    }
    if let Some(n) = options.limit {
        out.push_str(&format!(".limit({n})"));
    }
    Ok(out)
}

fn find_command(coll: &str, filter: &Filter, options: &FindOptions) -> BsonDocument {
    let mut cmd = doc! {"find": coll, "filter": filter_to_document(filter)};
    if let Some(p) = &options.projection {
        cmd.insert("projection", projection_to_document(p));
    }
    if let Some(s) = &options.sort {
        cmd.insert("sort", sort_to_document(s));
    }
    let count = |n: usize| Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX));
    if let Some(n) = options.skip {
        cmd.insert("skip", count(n));
    }
    if let Some(n) = options.limit {
        cmd.insert("limit", count(n));
    }
    cmd
}

/// What executing a [`Request`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Documents(Vec<BsonDocument>),
    Updated(UpdateReport),
    Deleted(DeleteReport),
    IndexCreated { name: String, created: bool },
    Explain(BsonDocument),
}

impl Response {
    #[must_use]
    pub fn documents(&self) -> Option<&[BsonDocument]> {
        match self {
            Self::Documents(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_documents(self) -> Option<Vec<BsonDocument>> {
        match self {
            Self::Documents(d) => Some(d),
            _ => None,
        }
    }
}
