use bson::Bson;
use serde::{Deserialize, Serialize};

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 8;
pub(crate) const MAX_PROJECTION_FIELDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    /// The shell's numeric spelling: 1 ascending, -1 descending.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }

    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Desc }
    }
}

/// Inclusion projection. Only the listed fields survive; `_id` survives unless `include_id` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub fields: Vec<String>,
    pub include_id: bool,
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { fields: fields.into_iter().map(Into::into).collect(), include_id: true }
    }

    #[must_use]
    pub fn without_id(mut self) -> Self {
        self.include_id = false;
        self
    }
}

/// Options for `find_docs`.
///
/// Semantics:
/// - Filtering happens first, then sorting, then `skip`, then `limit`.
/// - Projection is applied to the surviving documents last, so sort keys need not be projected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<Vec<SortSpec>>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    #[must_use]
    pub const fn operator(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }

    /// Ordering comparisons, as opposed to (in)equality.
    #[must_use]
    pub const fn is_range(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.into(), op: CmpOp::Eq, value: value.into() }
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.into(), op: CmpOp::Gt, value: value.into() }
    }

    /// Conjunction that flattens nested `And`s and drops `True` terms.
    #[must_use]
    pub fn and(filters: Vec<Self>) -> Self {
        let mut out = Vec::with_capacity(filters.len());
        for f in filters {
            match f {
                Self::True => {}
                Self::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Self::True,
            1 => out.remove(0),
            _ => Self::And(out),
        }
    }

    /// Visits every leaf predicate with its field path.
    pub fn for_each_path<F: FnMut(&str, &Self)>(&self, f: &mut F) {
        match self {
            Self::True => {}
            Self::And(fs) | Self::Or(fs) => fs.iter().for_each(|x| x.for_each_path(f)),
            Self::Not(inner) => inner.for_each_path(f),
            Self::Exists { path, .. }
            | Self::In { path, .. }
            | Self::Nin { path, .. }
            | Self::Cmp { path, .. } => f(path, self),
        }
    }

    /// Rewrites every field path through `map`.
    #[must_use]
    pub fn map_paths<F: Fn(&str) -> String + Copy>(self, map: F) -> Self {
        match self {
            Self::True => Self::True,
            Self::And(fs) => Self::And(fs.into_iter().map(|x| x.map_paths(map)).collect()),
            Self::Or(fs) => Self::Or(fs.into_iter().map(|x| x.map_paths(map)).collect()),
            Self::Not(inner) => Self::Not(Box::new(inner.map_paths(map))),
            Self::Exists { path, exists } => Self::Exists { path: map(&path), exists },
            Self::In { path, values } => Self::In { path: map(&path), values },
            Self::Nin { path, values } => Self::Nin { path: map(&path), values },
            Self::Cmp { path, op, value } => Self::Cmp { path: map(&path), op, value },
        }
    }
}

/// Field-level update operators, applied in `set`, `inc`, `unset` order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateDoc {
    pub set: Vec<(String, Bson)>,
    pub inc: Vec<(String, f64)>,
    pub unset: Vec<String>,
}

impl UpdateDoc {
    pub fn set(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self { set: vec![(field.into(), value.into())], ..Self::default() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty() && self.unset.is_empty()
    }

    /// Every path this update writes or removes.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.set
            .iter()
            .map(|(k, _)| k.as_str())
            .chain(self.inc.iter().map(|(k, _)| k.as_str()))
            .chain(self.unset.iter().map(String::as_str))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

impl UpdateReport {
    /// Turns a no-match into `NoSuchDocument` for callers that treat it as an error.
    ///
    /// # Errors
    /// Returns `DbError::NoSuchDocument` when nothing matched.
    pub fn require_match(self, what: &str) -> Result<Self, crate::errors::DbError> {
        if self.matched == 0 {
            return Err(crate::errors::DbError::NoSuchDocument(what.to_string()));
        }
        Ok(self)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted: u64,
}

impl DeleteReport {
    /// # Errors
    /// Returns `DbError::NoSuchDocument` when nothing was deleted.
    pub fn require_match(self, what: &str) -> Result<Self, crate::errors::DbError> {
        if self.deleted == 0 {
            return Err(crate::errors::DbError::NoSuchDocument(what.to_string()));
        }
        Ok(self)
    }
}
