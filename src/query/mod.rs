// Submodules for separation of concerns
mod cursor;
pub mod eval;
mod exec;
mod explain;
mod parse;
mod types;

pub use cursor::Cursor;
pub use eval::{compare_bson, compare_docs, eval_filter, get_path, values_equal};
pub(crate) use exec::{micros_since, scan};
pub use exec::{apply_update, delete_one, find_docs, update_one, update_one_checked};
pub use explain::{ExplainVerbosity, explain_find};
pub use parse::{
    filter_to_document, json_to_document, parse_filter, parse_filter_json, parse_projection,
    parse_sort, parse_update, parse_update_json, projection_to_document, sort_to_document,
    update_to_document, validate_update,
};
pub use types::{
    CmpOp, DeleteReport, Filter, FindOptions, Order, Projection, SortSpec, UpdateDoc, UpdateReport,
};
