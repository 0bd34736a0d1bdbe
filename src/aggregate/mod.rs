// Aggregation pipelines: $match, $project, $group, $sort, $skip, $limit
mod exec;
mod parse;
mod types;

pub use exec::{evaluate, run_pipeline, run_stages};
pub use parse::{expression_to_bson, parse_expression, parse_pipeline, parse_pipeline_json, pipeline_to_documents};
pub use types::{Accumulator, Expression, GroupSpec, Pipeline, ProjectItem, ProjectSpec, Stage};
