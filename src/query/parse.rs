//! Parsing of shell-shaped query documents (`{genre: "Fiction"}`, `{price: {$gt: 10}}`,
//! `{$set: {price: 15.99}}`) into typed queries, and rendering them back.

use crate::errors::DbError;
use crate::types::ID_FIELD;
use bson::{Bson, Document as BsonDocument};
use std::collections::HashSet;

use super::eval::as_f64;
use super::types::{
    CmpOp, Filter, MAX_IN_SET, MAX_PROJECTION_FIELDS, MAX_SORT_FIELDS, Order, Projection, SortSpec,
    UpdateDoc,
};

fn is_operator_doc(d: &BsonDocument) -> Result<bool, DbError> {
    let ops = d.keys().filter(|k| k.starts_with('$')).count();
    if ops == 0 {
        return Ok(false);
    }
    if ops != d.len() {
        return Err(DbError::malformed("cannot mix operators and fields in one predicate"));
    }
    Ok(true)
}

/// # Errors
/// Returns `MalformedQuery` for unknown operators or ill-shaped operands.
pub fn parse_filter(doc: &BsonDocument) -> Result<Filter, DbError> {
    let mut terms = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        let term = match key.as_str() {
            "$and" => Filter::And(parse_filter_list(key, value)?),
            "$or" => Filter::Or(parse_filter_list(key, value)?),
            "$nor" => Filter::Not(Box::new(Filter::Or(parse_filter_list(key, value)?))),
            op if op.starts_with('$') => {
                return Err(DbError::malformed(format!("unknown top-level operator {op}")));
            }
            path => parse_field_predicate(path, value)?,
        };
        terms.push(term);
    }
    Ok(Filter::and(terms))
}

fn parse_filter_list(op: &str, value: &Bson) -> Result<Vec<Filter>, DbError> {
    let Bson::Array(items) = value else {
        return Err(DbError::malformed(format!("{op} expects an array")));
    };
    if items.is_empty() {
        return Err(DbError::malformed(format!("{op} expects a non-empty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => parse_filter(d),
            _ => Err(DbError::malformed(format!("{op} entries must be documents"))),
        })
        .collect()
}

fn parse_field_predicate(path: &str, value: &Bson) -> Result<Filter, DbError> {
    let ops = match value {
        Bson::Document(d) if is_operator_doc(d)? => d,
        _ => return Ok(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: value.clone() }),
    };
    let mut terms = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        let cmp = |op: CmpOp| Filter::Cmp { path: path.to_string(), op, value: operand.clone() };
        let term = match op.as_str() {
            "$eq" => cmp(CmpOp::Eq),
            "$ne" => cmp(CmpOp::Ne),
            "$gt" => cmp(CmpOp::Gt),
            "$gte" => cmp(CmpOp::Gte),
            "$lt" => cmp(CmpOp::Lt),
            "$lte" => cmp(CmpOp::Lte),
            "$in" | "$nin" => {
                let Bson::Array(values) = operand else {
                    return Err(DbError::malformed(format!("{op} on {path} expects an array")));
                };
                if values.len() > MAX_IN_SET {
                    return Err(DbError::malformed(format!("{op} on {path} exceeds {MAX_IN_SET} values")));
                }
                if op == "$in" {
                    Filter::In { path: path.to_string(), values: values.clone() }
                } else {
                    Filter::Nin { path: path.to_string(), values: values.clone() }
                }
            }
            "$exists" => match operand {
                Bson::Boolean(b) => Filter::Exists { path: path.to_string(), exists: *b },
                other => Filter::Exists { path: path.to_string(), exists: truthy(other)? },
            },
            other => return Err(DbError::malformed(format!("unknown operator {other} on {path}"))),
        };
        terms.push(term);
    }
    Ok(Filter::and(terms))
}

fn truthy(v: &Bson) -> Result<bool, DbError> {
    match v {
        Bson::Boolean(b) => Ok(*b),
        n => as_f64(n)
            .map(|f| f != 0.0)
            .ok_or_else(|| DbError::malformed(format!("expected 0/1 or boolean, got {n}"))),
    }
}

/// Parses an inclusion projection such as `{title: 1, author: 1, _id: 0}`.
///
/// # Errors
/// Returns `MalformedQuery` for exclusions other than `_id` or too many fields.
pub fn parse_projection(doc: &BsonDocument) -> Result<Projection, DbError> {
    if doc.len() > MAX_PROJECTION_FIELDS {
        return Err(DbError::malformed(format!("projection exceeds {MAX_PROJECTION_FIELDS} fields")));
    }
    let mut projection = Projection { fields: Vec::with_capacity(doc.len()), include_id: true };
    for (field, flag) in doc {
        let include = truthy(flag)?;
        if field == ID_FIELD {
            projection.include_id = include;
        } else if include {
            projection.fields.push(field.clone());
        } else {
            return Err(DbError::malformed(format!(
                "exclusion of {field} is not supported; list the fields to keep instead"
            )));
        }
    }
    Ok(projection)
}

/// Parses `{price: 1}` / `{price: -1, title: 1}`.
///
/// # Errors
/// Returns `MalformedQuery` for directions other than 1 and -1 or too many keys.
pub fn parse_sort(doc: &BsonDocument) -> Result<Vec<SortSpec>, DbError> {
    if doc.len() > MAX_SORT_FIELDS {
        return Err(DbError::malformed(format!("sort exceeds {MAX_SORT_FIELDS} keys")));
    }
    doc.iter()
        .map(|(field, dir)| {
            let order = match as_f64(dir) {
                Some(d) if d == 1.0 => Order::Asc,
                Some(d) if d == -1.0 => Order::Desc,
                _ => return Err(DbError::malformed(format!("sort direction for {field} must be 1 or -1"))),
            };
            Ok(SortSpec { field: field.clone(), order })
        })
        .collect()
}

/// Parses an operator update such as `{$set: {price: 15.99}}`.
///
/// # Errors
/// Returns `MalformedQuery` for replacement documents, unknown operators, updates of `_id`,
/// or the same path targeted twice.
pub fn parse_update(doc: &BsonDocument) -> Result<UpdateDoc, DbError> {
    if doc.is_empty() {
        return Err(DbError::malformed("update document is empty"));
    }
    let mut out = UpdateDoc::default();
    for (op, body) in doc {
        let Bson::Document(fields) = body else {
            if op == "$unset"
                && let Bson::Array(names) = body
            {
                for n in names {
                    match n {
                        Bson::String(s) => out.unset.push(s.clone()),
                        _ => return Err(DbError::malformed("$unset array entries must be strings")),
                    }
                }
                continue;
            }
            return Err(DbError::malformed(format!("{op} expects a document")));
        };
        match op.as_str() {
            "$set" => out.set.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone()))),
            "$inc" => {
                for (k, v) in fields {
                    let by = as_f64(v)
                        .ok_or_else(|| DbError::malformed(format!("$inc on {k} requires a number")))?;
                    out.inc.push((k.clone(), by));
                }
            }
            "$unset" => out.unset.extend(fields.keys().cloned()),
            o if o.starts_with('$') => return Err(DbError::malformed(format!("unknown update operator {o}"))),
            _ => return Err(DbError::malformed("update document must use operators such as $set")),
        }
    }
    validate_update(&out)?;
    Ok(out)
}

/// Rejects empty updates, writes to `_id`, and conflicting paths.
///
/// # Errors
/// Returns `MalformedQuery` describing the first problem found.
pub fn validate_update(update: &UpdateDoc) -> Result<(), DbError> {
    if update.is_empty() {
        return Err(DbError::malformed("update changes nothing"));
    }
    let mut seen = HashSet::new();
    for path in update.paths() {
        if path.is_empty() {
            return Err(DbError::malformed("update path is empty"));
        }
        if path == ID_FIELD || path.starts_with("_id.") {
            return Err(DbError::malformed("_id cannot be updated"));
        }
        if !seen.insert(path) {
            return Err(DbError::malformed(format!("update targets {path} more than once")));
        }
    }
    Ok(())
}

/// Parses a JSON object into a BSON document.
///
/// # Errors
/// Returns a JSON or BSON error for malformed input, `MalformedQuery` for non-objects.
pub fn json_to_document(json: &str) -> Result<BsonDocument, DbError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if !value.is_object() {
        return Err(DbError::malformed("expected a JSON object"));
    }
    Ok(bson::serialize_to_document(&value)?)
}

/// # Errors
/// Returns an error if the JSON string cannot be parsed into a filter structure.
pub fn parse_filter_json(json: &str) -> Result<Filter, DbError> {
    parse_filter(&json_to_document(json)?)
}

/// # Errors
/// Returns an error if the JSON string cannot be parsed into an update structure.
pub fn parse_update_json(json: &str) -> Result<UpdateDoc, DbError> {
    parse_update(&json_to_document(json)?)
}

/// Renders a filter in shell shape. Conjunctions over distinct fields collapse into one document.
#[must_use]
pub fn filter_to_document(filter: &Filter) -> BsonDocument {
    let mut out = BsonDocument::new();
    match filter {
        Filter::True => {}
        Filter::And(fs) => {
            let mut paths = HashSet::new();
            let flat = fs.iter().all(|f| match f {
                Filter::Exists { path, .. }
                | Filter::In { path, .. }
                | Filter::Nin { path, .. }
                | Filter::Cmp { path, .. } => paths.insert(path.as_str()),
                _ => false,
            });
            if flat {
                for f in fs {
                    out.extend(filter_to_document(f));
                }
            } else {
                out.insert("$and", fs.iter().map(|f| Bson::Document(filter_to_document(f))).collect::<Vec<_>>());
            }
        }
        Filter::Or(fs) => {
            out.insert("$or", fs.iter().map(|f| Bson::Document(filter_to_document(f))).collect::<Vec<_>>());
        }
        Filter::Not(inner) => {
            let list = match inner.as_ref() {
                Filter::Or(fs) => fs.iter().map(|f| Bson::Document(filter_to_document(f))).collect(),
                other => vec![Bson::Document(filter_to_document(other))],
            };
            out.insert("$nor", list);
        }
        Filter::Exists { path, exists } => {
            out.insert(path.clone(), bson::doc! {"$exists": *exists});
        }
        Filter::In { path, values } => {
            out.insert(path.clone(), bson::doc! {"$in": values.clone()});
        }
        Filter::Nin { path, values } => {
            out.insert(path.clone(), bson::doc! {"$nin": values.clone()});
        }
        Filter::Cmp { path, op: CmpOp::Eq, value } if !matches!(value, Bson::Document(_)) => {
            out.insert(path.clone(), value.clone());
        }
        Filter::Cmp { path, op, value } => {
            let mut d = BsonDocument::new();
            d.insert(op.operator(), value.clone());
            out.insert(path.clone(), d);
        }
    }
    out
}

#[must_use]
pub fn projection_to_document(projection: &Projection) -> BsonDocument {
    let mut out = BsonDocument::new();
    for f in &projection.fields {
        out.insert(f.clone(), 1);
    }
    if !projection.include_id {
        out.insert(ID_FIELD, 0);
    }
    out
}

#[must_use]
pub fn sort_to_document(sort: &[SortSpec]) -> BsonDocument {
    sort.iter().map(|s| (s.field.clone(), Bson::Int32(s.order.as_i32()))).collect()
}

#[must_use]
pub fn update_to_document(update: &UpdateDoc) -> BsonDocument {
    let mut out = BsonDocument::new();
    if !update.set.is_empty() {
        out.insert("$set", update.set.iter().cloned().collect::<BsonDocument>());
    }
    if !update.inc.is_empty() {
        out.insert(
            "$inc",
            update.inc.iter().map(|(k, v)| (k.clone(), Bson::Double(*v))).collect::<BsonDocument>(),
        );
    }
    if !update.unset.is_empty() {
        out.insert(
            "$unset",
            update.unset.iter().map(|k| (k.clone(), Bson::String(String::new()))).collect::<BsonDocument>(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn equality_and_operator_predicates() {
        let f = parse_filter(&doc! {"genre": "Fiction"}).unwrap();
        assert_eq!(f, Filter::eq("genre", "Fiction"));
        let f = parse_filter(&doc! {"published_year": {"$gt": 1950}}).unwrap();
        assert_eq!(f, Filter::gt("published_year", 1950));
    }

    #[test]
    fn several_fields_form_a_conjunction() {
        let f = parse_filter(&doc! {"in_stock": true, "published_year": {"$gt": 2010, "$lte": 2020}}).unwrap();
        let Filter::And(terms) = f else { panic!("expected And") };
        assert_eq!(terms.len(), 3);
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(parse_filter(&doc! {}).unwrap(), Filter::True);
    }

    #[test]
    fn unknown_operators_are_malformed() {
        assert!(matches!(
            parse_filter(&doc! {"price": {"$near": 3}}),
            Err(DbError::MalformedQuery(_))
        ));
        assert!(matches!(parse_filter(&doc! {"$where": "x"}), Err(DbError::MalformedQuery(_))));
        assert!(matches!(
            parse_filter(&doc! {"price": {"$gt": 1, "plain": 2}}),
            Err(DbError::MalformedQuery(_))
        ));
    }

    #[test]
    fn projection_rejects_field_exclusion() {
        let p = parse_projection(&doc! {"title": 1, "author": 1, "price": 1, "_id": 0}).unwrap();
        assert_eq!(p.fields, vec!["title", "author", "price"]);
        assert!(!p.include_id);
        assert!(parse_projection(&doc! {"genre": 0}).is_err());
    }

    #[test]
    fn sort_directions_must_be_unit() {
        assert_eq!(parse_sort(&doc! {"price": -1}).unwrap(), vec![SortSpec::desc("price")]);
        assert!(parse_sort(&doc! {"price": 2}).is_err());
        assert!(parse_sort(&doc! {"price": "asc"}).is_err());
    }

    #[test]
    fn update_requires_operators_and_protects_id() {
        let u = parse_update(&doc! {"$set": {"price": 15.99}}).unwrap();
        assert_eq!(u, UpdateDoc::set("price", 15.99));
        assert!(parse_update(&doc! {"price": 15.99}).is_err());
        assert!(parse_update(&doc! {"$set": {"_id": "x"}}).is_err());
        assert!(parse_update(&doc! {"$set": {"a": 1}, "$unset": {"a": ""}}).is_err());
        assert!(parse_update(&doc! {}).is_err());
    }

    #[test]
    fn json_entry_points() {
        let f = parse_filter_json(r#"{"author":"George Orwell"}"#).unwrap();
        assert_eq!(f, Filter::eq("author", "George Orwell"));
        let u = parse_update_json(r#"{"$inc":{"price":1}}"#).unwrap();
        assert_eq!(u.inc, vec![("price".to_string(), 1.0)]);
        assert!(parse_filter_json("[1,2]").is_err());
    }

    #[test]
    fn rendering_collapses_distinct_field_conjunctions() {
        let f = parse_filter(&doc! {"in_stock": true, "published_year": {"$gt": 2010}}).unwrap();
        assert_eq!(filter_to_document(&f), doc! {"in_stock": true, "published_year": {"$gt": 2010}});
        let p = Projection::include(["title"]).without_id();
        assert_eq!(projection_to_document(&p), doc! {"title": 1, "_id": 0});
        assert_eq!(sort_to_document(&[SortSpec::asc("price")]), doc! {"price": 1});
    }
}
