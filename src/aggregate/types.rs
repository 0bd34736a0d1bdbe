use bson::Bson;

use crate::query::{Filter, SortSpec};

/// A computed value over one input document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `"$field"` or `"$a.b"`
    Field(String),
    Literal(Bson),
    Concat(Vec<Expression>),
    ToString(Box<Expression>),
    Add(Vec<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Vec<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Mod(Box<Expression>, Box<Expression>),
    Floor(Box<Expression>),
}

impl Expression {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub fn literal(v: impl Into<Bson>) -> Self {
        Self::Literal(v.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expression),
    Avg(Expression),
    Min(Expression),
    Max(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectItem {
    Include,
    Computed(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSpec {
    pub fields: Vec<(String, ProjectItem)>,
    pub include_id: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub id: Expression,
    pub accumulators: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Project(ProjectSpec),
    Group(GroupSpec),
    Sort(Vec<SortSpec>),
    Skip(usize),
    Limit(usize),
}

impl Stage {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Project(_) => "$project",
            Self::Group(_) => "$group",
            Self::Sort(_) => "$sort",
            Self::Skip(_) => "$skip",
            Self::Limit(_) => "$limit",
        }
    }
}

/// An ordered list of stages, each consuming the previous stage's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}
