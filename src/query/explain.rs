//! Query plan reports in the shape of the shell's `explain()` output.

use crate::collection::Collection;
use crate::errors::DbError;
use crate::index::IndexPlan;
use bson::{Bson, Document as BsonDocument, doc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use super::exec::{micros_since, scan, shape};
use super::parse::{filter_to_document, projection_to_document, sort_to_document};
use super::types::{Filter, FindOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExplainVerbosity {
    QueryPlanner,
    #[default]
    ExecutionStats,
    AllPlansExecution,
}

impl ExplainVerbosity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueryPlanner => "queryPlanner",
            Self::ExecutionStats => "executionStats",
            Self::AllPlansExecution => "allPlansExecution",
        }
    }
}

impl fmt::Display for ExplainVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExplainVerbosity {
    type Err = DbError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queryPlanner" => Ok(Self::QueryPlanner),
            "executionStats" => Ok(Self::ExecutionStats),
            "allPlansExecution" => Ok(Self::AllPlansExecution),
            other => Err(DbError::malformed(format!("unknown explain verbosity {other}"))),
        }
    }
}

fn count(n: usize) -> Bson {
    Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX))
}

fn access_stage(filter: &Filter, plan: Option<&IndexPlan>) -> BsonDocument {
    let mut stage = match plan {
        Some(p) => doc! {
            "stage": "FETCH",
            "inputStage": {
                "stage": "IXSCAN",
                "keyPattern": p.key_pattern.clone(),
                "indexName": p.index_name.clone(),
                "direction": "forward",
                "indexBounds": p.bounds.clone(),
            },
        },
        None => doc! {"stage": "COLLSCAN", "direction": "forward"},
    };
    if *filter != Filter::True {
        stage.insert("filter", filter_to_document(filter));
    }
    stage
}

fn wrap(name: &str, key: &str, value: impl Into<Bson>, input: BsonDocument) -> BsonDocument {
    let mut stage = doc! {"stage": name};
    stage.insert(key, value.into());
    stage.insert("inputStage", input);
    stage
}

fn winning_plan(filter: &Filter, opts: &FindOptions, plan: Option<&IndexPlan>) -> BsonDocument {
    let mut stage = access_stage(filter, plan);
    if let Some(sort) = opts.sort.as_deref()
        && !sort.is_empty()
    {
        stage = wrap("SORT", "sortPattern", sort_to_document(sort), stage);
    }
    if let Some(skip) = opts.skip {
        stage = wrap("SKIP", "skipAmount", count(skip), stage);
    }
    if let Some(limit) = opts.limit {
        stage = wrap("LIMIT", "limitAmount", count(limit), stage);
    }
    if let Some(p) = &opts.projection {
        stage = wrap("PROJECTION_SIMPLE", "transformBy", projection_to_document(p), stage);
    }
    stage
}

/// Plans and runs the query without touching stored data.
pub fn explain_find(
    col: &Collection,
    filter: &Filter,
    opts: &FindOptions,
    verbosity: ExplainVerbosity,
) -> BsonDocument {
    let start = Instant::now();
    let scan = scan(col, filter);
    let returned = shape(scan.docs, opts).len();
    let mut out = doc! {
        "queryPlanner": {
            "namespace": col.name(),
            "parsedQuery": filter_to_document(filter),
            "indexFilterSet": false,
            "winningPlan": winning_plan(filter, opts, scan.plan.as_ref()),
            "rejectedPlans": [],
        },
    };
    if verbosity != ExplainVerbosity::QueryPlanner {
        let mut stats = doc! {
            "executionSuccess": true,
            "nReturned": count(returned),
            "executionTimeMillis": Bson::Int64(i64::try_from(micros_since(start) / 1000).unwrap_or(i64::MAX)),
            "totalKeysExamined": count(scan.keys_examined),
            "totalDocsExamined": count(scan.docs_examined),
        };
        if verbosity == ExplainVerbosity::AllPlansExecution {
            stats.insert("allPlansExecution", Bson::Array(Vec::new()));
        }
        out.insert("executionStats", stats);
    }
    crate::qlog!({
        "op": "explain",
        "collection": col.name(),
        "verbosity": verbosity.as_str(),
        "index": scan.plan.as_ref().map(|p| p.index_name.clone()),
        "duration_us": micros_since(start),
    });
    out
}
