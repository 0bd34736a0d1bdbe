use crate::collection::Collection;
use crate::errors::DbError;
use crate::index::IndexPlan;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use std::collections::HashSet;
use std::time::Instant;

use super::cursor::Cursor;
use super::eval::{as_f64, compare_docs, eval_filter, project_fields};
use super::types::{DeleteReport, Filter, FindOptions, UpdateDoc, UpdateReport};

/// Matching documents in natural order plus what it cost to find them.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scan {
    pub docs: Vec<BsonDocument>,
    pub plan: Option<IndexPlan>,
    pub keys_examined: usize,
    pub docs_examined: usize,
}

/// Collects every document satisfying `filter`. An index, when one applies, only narrows
/// which documents get examined; survivors are still visited in natural order.
pub(crate) fn scan(col: &Collection, filter: &Filter) -> Scan {
    let docs = col.docs.read();
    let (plan, candidates) = {
        let indexes = col.indexes.read();
        let plan = indexes.plan(filter);
        let candidates: Option<HashSet<DocumentId>> =
            plan.as_ref().and_then(|p| indexes.candidates(p)).map(|ids| ids.into_iter().collect());
        (plan, candidates)
    };
    let keys_examined = candidates.as_ref().map_or(0, HashSet::len);
    let mut docs_examined = 0usize;
    let matched = docs
        .iter()
        .filter(|d| candidates.as_ref().is_none_or(|c| c.contains(&d.id)))
        .filter(|d| {
            docs_examined += 1;
            eval_filter(&d.data, filter)
        })
        .map(|d| d.data.clone())
        .collect();
    Scan { docs: matched, plan, keys_examined, docs_examined }
}

/// Sort, then skip, then limit, then project.
pub(crate) fn shape(mut docs: Vec<BsonDocument>, opts: &FindOptions) -> Vec<BsonDocument> {
    if let Some(sort) = opts.sort.as_deref()
        && !sort.is_empty()
    {
        docs.sort_by(|a, b| compare_docs(a, b, sort));
    }
    let skip = opts.skip.unwrap_or(0);
    let limit = opts.limit.unwrap_or(usize::MAX);
    let window = docs.into_iter().skip(skip).take(limit);
    match &opts.projection {
        Some(p) => window.map(|d| project_fields(&d, p)).collect(),
        None => window.collect(),
    }
}

pub(crate) fn micros_since(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

pub fn find_docs(col: &Collection, filter: &Filter, opts: &FindOptions) -> Cursor {
    let start = Instant::now();
    let scan = scan(col, filter);
    let matched = scan.docs.len();
    let docs = shape(scan.docs, opts);
    crate::qlog!({
        "op": "find",
        "collection": col.name(),
        "matched": matched,
        "returned": docs.len(),
        "docs_examined": scan.docs_examined,
        "index": scan.plan.as_ref().map(|p| p.index_name.clone()),
        "skip": opts.skip,
        "limit": opts.limit,
        "duration_us": micros_since(start),
    });
    Cursor::new(docs)
}

/// Applies `update` to the first matching document in natural order. No match is a no-op.
pub fn update_one(col: &Collection, filter: &Filter, update: &UpdateDoc) -> UpdateReport {
    update_one_checked(col, filter, update, |_, _| Ok(())).unwrap_or_default()
}

/// Like [`update_one`], but `check` sees the matched document before and after the update
/// and may veto it. A vetoed update leaves the collection untouched.
///
/// # Errors
/// Returns whatever `check` returns.
pub fn update_one_checked<F>(
    col: &Collection,
    filter: &Filter,
    update: &UpdateDoc,
    check: F,
) -> Result<UpdateReport, DbError>
where
    F: Fn(&BsonDocument, &BsonDocument) -> Result<(), DbError>,
{
    let start = Instant::now();
    let mut docs = col.docs.write();
    let report = match docs.iter_mut().find(|d| eval_filter(&d.data, filter)) {
        None => UpdateReport::default(),
        Some(doc) => {
            let mut updated = doc.data.clone();
            let changed = apply_update(&mut updated, update);
            if changed {
                check(&doc.data, &updated)?;
                let before = std::mem::replace(&mut doc.data, updated);
                doc.touch();
                let mut indexes = col.indexes.write();
                indexes.remove_all(&before, &doc.id);
                indexes.insert_all(&doc.data, &doc.id);
            }
            UpdateReport { matched: 1, modified: u64::from(changed) }
        }
    };
    crate::qlog!({
        "op": "update_one",
        "collection": col.name(),
        "matched": report.matched,
        "modified": report.modified,
        "duration_us": micros_since(start),
    });
    Ok(report)
}

/// Removes the first matching document in natural order. No match is a no-op.
pub fn delete_one(col: &Collection, filter: &Filter) -> DeleteReport {
    let start = Instant::now();
    let mut docs = col.docs.write();
    let report = match docs.iter().position(|d| eval_filter(&d.data, filter)) {
        None => DeleteReport::default(),
        Some(pos) => {
            let removed = docs.remove(pos);
            col.indexes.write().remove_all(&removed.data, &removed.id);
            DeleteReport { deleted: 1 }
        }
    };
    crate::qlog!({
        "op": "delete_one",
        "collection": col.name(),
        "deleted": report.deleted,
        "duration_us": micros_since(start),
    });
    report
}

/// Applies `$set`, `$inc` and `$unset` in that order. Returns whether anything changed.
pub fn apply_update(doc: &mut BsonDocument, upd: &UpdateDoc) -> bool {
    let mut changed = false;
    for (k, v) in &upd.set {
        changed |= set_path(doc, k, v.clone());
    }
    for (k, by) in &upd.inc {
        let next = increment(lookup(doc, k), *by);
        changed |= set_path(doc, k, next);
    }
    for k in &upd.unset {
        changed |= unset_path(doc, k);
    }
    changed
}

/// Integers stay integers under an integral increment: Int32 widens to Int64 on overflow
/// and Int64 falls back to a double. Anything else becomes a double.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn increment(cur: Option<&Bson>, by: f64) -> Bson {
    let whole = by.fract() == 0.0 && by.abs() < 9.0e15;
    match cur {
        Some(Bson::Int32(i)) if whole => {
            let sum = i64::from(*i) + by as i64;
            i32::try_from(sum).map_or(Bson::Int64(sum), Bson::Int32)
        }
        Some(Bson::Int64(i)) if whole => i.checked_add(by as i64).map_or(Bson::Double(*i as f64 + by), Bson::Int64),
        None if whole => {
            let by = by as i64;
            i32::try_from(by).map_or(Bson::Int64(by), Bson::Int32)
        }
        other => Bson::Double(other.and_then(as_f64).unwrap_or(0.0) + by),
    }
}

fn lookup<'a>(root: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    super::eval::get_path(root, path)
}

/// Walks to the parent of `path`'s last segment, creating (or replacing non-document)
/// intermediate values when `create` is set.
fn parent_mut<'a>(
    root: &'a mut BsonDocument,
    path: &'a str,
    create: bool,
) -> Option<(&'a mut BsonDocument, &'a str)> {
    let (parents, last) = match path.rsplit_once('.') {
        Some((p, l)) => (Some(p), l),
        None => (None, path),
    };
    let mut cur = root;
    for seg in parents.into_iter().flat_map(|p| p.split('.')) {
        if create && !matches!(cur.get(seg), Some(Bson::Document(_))) {
            cur.insert(seg, BsonDocument::new());
        }
        match cur.get_mut(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return None,
        }
    }
    Some((cur, last))
}

fn set_path(root: &mut BsonDocument, path: &str, value: Bson) -> bool {
    let Some((parent, last)) = parent_mut(root, path, true) else {
        return false;
    };
    let old = parent.insert(last, value.clone());
    old.as_ref() != Some(&value)
}

fn unset_path(root: &mut BsonDocument, path: &str) -> bool {
    parent_mut(root, path, false).is_some_and(|(parent, last)| parent.remove(last).is_some())
}
