use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use super::types::{CmpOp, Filter, MAX_IN_SET, MAX_PATH_DEPTH, MAX_SORT_FIELDS, Order, Projection, SortSpec};
use crate::types::ID_FIELD;

pub fn eval_filter(doc: &BsonDocument, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => get_path(doc, path).is_some() == *exists,
        Filter::In { path, values } => get_path(doc, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Nin { path, values } => !get_path(doc, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Cmp { path, op, value } => {
            let found = get_path(doc, path);
            match op {
                // $ne also matches documents lacking the field
                CmpOp::Ne => !found.is_some_and(|v| values_equal(v, value)),
                _ => found.is_some_and(|v| compare_with(v, *op, value)),
            }
        }
    }
}

fn compare_with(v: &Bson, op: CmpOp, value: &Bson) -> bool {
    // range operators only compare values of the same type class
    if op.is_range() && type_rank(v) != type_rank(value) {
        return false;
    }
    match op {
        CmpOp::Eq => values_equal(v, value),
        CmpOp::Ne => !values_equal(v, value),
        CmpOp::Gt => compare_bson(v, value) == Ordering::Greater,
        CmpOp::Gte => compare_bson(v, value) != Ordering::Less,
        CmpOp::Lt => compare_bson(v, value) == Ordering::Less,
        CmpOp::Lte => compare_bson(v, value) != Ordering::Greater,
    }
}

/// Lexicographic comparison over `sort`; a missing field sorts before any present value.
pub fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &[SortSpec]) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        let ord = match (get_path(a, &s.field), get_path(b, &s.field)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

fn is_in_set(v: &Bson, set: &[Bson]) -> bool {
    set.iter().take(MAX_IN_SET).any(|x| values_equal(v, x))
}

/// Resolves a dotted path through nested documents.
pub fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut cur = doc;
    let mut parts = path.split('.').peekable();
    let mut depth = 0usize;
    while let Some(part) = parts.next() {
        depth += 1;
        if depth > MAX_PATH_DEPTH {
            return None;
        }
        let v = cur.get(part)?;
        if parts.peek().is_none() {
            return Some(v);
        }
        match v {
            Bson::Document(d) => cur = d,
            _ => return None,
        }
    }
    None
}

pub(crate) fn is_numeric(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn as_f64(x: &Bson) -> Option<f64> {
    match x {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}

/// Equality with numeric values compared by magnitude, so `1949` (Int32) equals `1949.0`.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_numeric(a) && is_numeric(b) {
        return compare_bson(a, b) == Ordering::Equal;
    }
    a == b
}

/// Total order over BSON values: numbers by value, strings and booleans naturally,
/// everything else by type rank.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if is_numeric(a) && is_numeric(b) {
        // -0.0 and 0.0 are the same number
        let x = as_f64(a).unwrap_or(f64::NAN) + 0.0;
        let y = as_f64(b).unwrap_or(f64::NAN) + 0.0;
        return x.total_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 250,
        _ => 200,
    }
}

/// Keeps the projected top-level fields in document order.
pub fn project_fields(doc: &BsonDocument, projection: &Projection) -> BsonDocument {
    let mut out = BsonDocument::new();
    for (k, v) in doc {
        let keep = if k == ID_FIELD {
            projection.include_id
        } else {
            projection.fields.iter().any(|f| f == k)
        };
        if keep {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numeric_equality_crosses_widths() {
        assert!(values_equal(&Bson::Int32(1949), &Bson::Int64(1949)));
        assert!(values_equal(&Bson::Int32(15), &Bson::Double(15.0)));
        assert!(!values_equal(&Bson::String("15".into()), &Bson::Int32(15)));
    }

    #[test]
    fn signed_zeroes_compare_equal() {
        assert!(values_equal(&Bson::Double(-0.0), &Bson::Double(0.0)));
        assert!(values_equal(&Bson::Double(-0.0), &Bson::Int32(0)));
        assert_eq!(compare_bson(&Bson::Double(0.0), &Bson::Double(-0.0)), Ordering::Equal);
        let f = Filter::eq("price", 0.0);
        assert!(eval_filter(&doc! {"price": -0.0}, &f));
        let f = Filter::Cmp { path: "price".into(), op: CmpOp::Lt, value: 0.0.into() };
        assert!(!eval_filter(&doc! {"price": -0.0}, &f));
    }

    #[test]
    fn ne_matches_missing_fields() {
        let d = doc! {"title": "Emma"};
        let f = Filter::Cmp { path: "genre".into(), op: CmpOp::Ne, value: "Fiction".into() };
        assert!(eval_filter(&d, &f));
    }

    #[test]
    fn dotted_paths_resolve_nested_values() {
        let d = doc! {"meta": {"pages": 320}};
        assert_eq!(get_path(&d, "meta.pages"), Some(&Bson::Int32(320)));
        assert!(get_path(&d, "meta.pages.x").is_none());
        assert!(get_path(&d, "").is_none());
    }

    #[test]
    fn booleans_order_false_before_true() {
        assert_eq!(compare_bson(&Bson::Boolean(false), &Bson::Boolean(true)), Ordering::Less);
        let f = Filter::Cmp { path: "in_stock".into(), op: CmpOp::Gt, value: false.into() };
        assert!(eval_filter(&doc! {"in_stock": true}, &f));
        assert!(!eval_filter(&doc! {"in_stock": false}, &f));
    }

    #[test]
    fn projection_keeps_document_order_and_honours_id() {
        let d = doc! {"_id": "a", "title": "T", "author": "A", "price": 1.5, "genre": "G"};
        let p = Projection::include(["price", "title"]);
        let out = project_fields(&d, &p);
        assert_eq!(out.keys().cloned().collect::<Vec<_>>(), vec!["_id", "title", "price"]);
        let out = project_fields(&d, &p.without_id());
        assert!(out.get(ID_FIELD).is_none());
    }
}
