use crate::errors::DbError;
use crate::query::eval::as_f64;
use crate::query::{filter_to_document, parse_filter, parse_sort, sort_to_document};
use crate::types::ID_FIELD;
use bson::{Bson, Document as BsonDocument};

use super::types::{Accumulator, Expression, GroupSpec, Pipeline, ProjectItem, ProjectSpec, Stage};

const MAX_STAGES: usize = 64;

/// Parses a shell-shaped pipeline such as `[{$group: {_id: "$genre", n: {$sum: 1}}}]`.
///
/// # Errors
/// Returns `MalformedQuery` for unknown stages, operators, or ill-shaped arguments.
pub fn parse_pipeline(stages: &[BsonDocument]) -> Result<Pipeline, DbError> {
    if stages.len() > MAX_STAGES {
        return Err(DbError::malformed(format!("pipeline exceeds {MAX_STAGES} stages")));
    }
    stages.iter().map(parse_stage).collect::<Result<Vec<_>, _>>().map(Pipeline::new)
}

/// Parses a pipeline from a JSON array.
///
/// # Errors
/// Returns a JSON/BSON error for invalid input, `MalformedQuery` for invalid stages.
pub fn parse_pipeline_json(json: &str) -> Result<Pipeline, DbError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let serde_json::Value::Array(items) = value else {
        return Err(DbError::malformed("pipeline must be a JSON array"));
    };
    let docs = items
        .iter()
        .map(|v| {
            if v.is_object() {
                Ok(bson::serialize_to_document(v)?)
            } else {
                Err(DbError::malformed("pipeline stages must be objects"))
            }
        })
        .collect::<Result<Vec<_>, DbError>>()?;
    parse_pipeline(&docs)
}

fn single_entry<'a>(doc: &'a BsonDocument, what: &str) -> Result<(&'a String, &'a Bson), DbError> {
    let mut it = doc.iter();
    match (it.next(), it.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(DbError::malformed(format!("{what} must have exactly one key"))),
    }
}

fn parse_stage(doc: &BsonDocument) -> Result<Stage, DbError> {
    let (name, body) = single_entry(doc, "pipeline stage")?;
    let as_doc = || match body {
        Bson::Document(d) => Ok(d),
        _ => Err(DbError::malformed(format!("{name} expects a document"))),
    };
    match name.as_str() {
        "$match" => Ok(Stage::Match(parse_filter(as_doc()?)?)),
        "$project" => Ok(Stage::Project(parse_project(as_doc()?)?)),
        "$group" => Ok(Stage::Group(parse_group(as_doc()?)?)),
        "$sort" => {
            let sort = parse_sort(as_doc()?)?;
            if sort.is_empty() {
                return Err(DbError::malformed("$sort needs at least one key"));
            }
            Ok(Stage::Sort(sort))
        }
        "$skip" => Ok(Stage::Skip(parse_count(name, body)?)),
        "$limit" => match parse_count(name, body)? {
            0 => Err(DbError::malformed("$limit must be positive")),
            n => Ok(Stage::Limit(n)),
        },
        other => Err(DbError::malformed(format!("unsupported pipeline stage {other}"))),
    }
}

fn parse_count(name: &str, v: &Bson) -> Result<usize, DbError> {
    let n = match v {
        Bson::Int32(i) => i64::from(*i),
        Bson::Int64(i) => *i,
        Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => *f as i64,
        _ => return Err(DbError::malformed(format!("{name} expects an integer"))),
    };
    usize::try_from(n).map_err(|_| DbError::malformed(format!("{name} must not be negative")))
}

fn check_output_field(field: &str) -> Result<(), DbError> {
    if field.is_empty() || field.starts_with('$') || field.contains('.') {
        return Err(DbError::malformed(format!("invalid output field name {field:?}")));
    }
    Ok(())
}

fn parse_project(doc: &BsonDocument) -> Result<ProjectSpec, DbError> {
    let mut spec = ProjectSpec { fields: Vec::with_capacity(doc.len()), include_id: true };
    for (field, value) in doc {
        let flag = match value {
            Bson::Boolean(b) => Some(*b),
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => as_f64(value).map(|f| f != 0.0),
            _ => None,
        };
        match (field.as_str(), flag) {
            (ID_FIELD, Some(keep)) => spec.include_id = keep,
            (_, Some(true)) => spec.fields.push((field.clone(), ProjectItem::Include)),
            (_, Some(false)) => {
                return Err(DbError::malformed(format!("$project cannot exclude {field}")));
            }
            (_, None) => {
                check_output_field(field)?;
                spec.fields.push((field.clone(), ProjectItem::Computed(parse_expression(value)?)));
            }
        }
    }
    Ok(spec)
}

fn parse_group(doc: &BsonDocument) -> Result<GroupSpec, DbError> {
    let id = doc
        .get(ID_FIELD)
        .ok_or_else(|| DbError::malformed("$group requires an _id expression"))
        .and_then(parse_expression)?;
    let mut accumulators = Vec::with_capacity(doc.len().saturating_sub(1));
    for (field, value) in doc {
        if field == ID_FIELD {
            continue;
        }
        check_output_field(field)?;
        let Bson::Document(acc) = value else {
            return Err(DbError::malformed(format!("accumulator for {field} must be a document")));
        };
        let (op, arg) = single_entry(acc, "accumulator")?;
        let expr = parse_expression(arg)?;
        let acc = match op.as_str() {
            "$sum" => Accumulator::Sum(expr),
            "$avg" => Accumulator::Avg(expr),
            "$min" => Accumulator::Min(expr),
            "$max" => Accumulator::Max(expr),
            other => return Err(DbError::malformed(format!("unsupported accumulator {other}"))),
        };
        accumulators.push((field.clone(), acc));
    }
    Ok(GroupSpec { id, accumulators })
}

/// # Errors
/// Returns `MalformedQuery` for unknown operators, wrong arity, or object expressions.
pub fn parse_expression(value: &Bson) -> Result<Expression, DbError> {
    match value {
        Bson::String(s) if s.starts_with("$$") => {
            Err(DbError::malformed(format!("variables are not supported: {s}")))
        }
        Bson::String(s) if s.starts_with('$') => match &s[1..] {
            "" => Err(DbError::malformed("empty field path")),
            path => Ok(Expression::Field(path.to_string())),
        },
        Bson::Document(d) => {
            let (op, arg) = single_entry(d, "expression object")?;
            parse_operator(op, arg)
        }
        Bson::Array(_) => Err(DbError::malformed("array expressions are not supported")),
        other => Ok(Expression::Literal(other.clone())),
    }
}

fn args(op: &str, arg: &Bson) -> Result<Vec<Expression>, DbError> {
    match arg {
        Bson::Array(items) => items.iter().map(parse_expression).collect(),
        single => Ok(vec![parse_expression(single).map_err(|e| match e {
            DbError::MalformedQuery(m) => DbError::malformed(format!("{op}: {m}")),
            other => other,
        })?]),
    }
}

fn exactly<const N: usize>(op: &str, arg: &Bson) -> Result<[Expression; N], DbError> {
    let list = args(op, arg)?;
    let got = list.len();
    list.try_into()
        .map_err(|_| DbError::malformed(format!("{op} takes {N} argument(s), got {got}")))
}

fn parse_operator(op: &str, arg: &Bson) -> Result<Expression, DbError> {
    Ok(match op {
        "$literal" => Expression::Literal(arg.clone()),
        "$concat" => Expression::Concat(args(op, arg)?),
        "$add" => Expression::Add(args(op, arg)?),
        "$multiply" => Expression::Multiply(args(op, arg)?),
        "$toString" => {
            let [x] = exactly::<1>(op, arg)?;
            Expression::ToString(Box::new(x))
        }
        "$floor" => {
            let [x] = exactly::<1>(op, arg)?;
            Expression::Floor(Box::new(x))
        }
        "$subtract" | "$divide" | "$mod" => {
            let [a, b] = exactly::<2>(op, arg)?;
            let (a, b) = (Box::new(a), Box::new(b));
            match op {
                "$subtract" => Expression::Subtract(a, b),
                "$divide" => Expression::Divide(a, b),
                _ => Expression::Mod(a, b),
            }
        }
        other => return Err(DbError::malformed(format!("unsupported expression operator {other}"))),
    })
}

#[must_use]
pub fn expression_to_bson(expr: &Expression) -> Bson {
    fn op(name: &str, args: Vec<Bson>) -> Bson {
        let mut d = BsonDocument::new();
        d.insert(name, args);
        Bson::Document(d)
    }
    fn list(xs: &[Expression]) -> Vec<Bson> {
        xs.iter().map(expression_to_bson).collect()
    }
    match expr {
        Expression::Field(p) => Bson::String(format!("${p}")),
        Expression::Literal(Bson::String(s)) if s.starts_with('$') => {
            Bson::Document(bson::doc! {"$literal": s.clone()})
        }
        Expression::Literal(v) => v.clone(),
        Expression::Concat(xs) => op("$concat", list(xs)),
        Expression::Add(xs) => op("$add", list(xs)),
        Expression::Multiply(xs) => op("$multiply", list(xs)),
        Expression::ToString(x) => {
            Bson::Document(bson::doc! {"$toString": expression_to_bson(x)})
        }
        Expression::Floor(x) => Bson::Document(bson::doc! {"$floor": expression_to_bson(x)}),
        Expression::Subtract(a, b) => op("$subtract", vec![expression_to_bson(a), expression_to_bson(b)]),
        Expression::Divide(a, b) => op("$divide", vec![expression_to_bson(a), expression_to_bson(b)]),
        Expression::Mod(a, b) => op("$mod", vec![expression_to_bson(a), expression_to_bson(b)]),
    }
}

/// Renders a pipeline back to its shell shape.
#[must_use]
pub fn pipeline_to_documents(pipeline: &Pipeline) -> Vec<BsonDocument> {
    pipeline
        .stages
        .iter()
        .map(|stage| {
            let body: Bson = match stage {
                Stage::Match(f) => filter_to_document(f).into(),
                Stage::Sort(s) => sort_to_document(s).into(),
                Stage::Skip(n) | Stage::Limit(n) => Bson::Int64(i64::try_from(*n).unwrap_or(i64::MAX)),
                Stage::Project(p) => {
                    let mut d = BsonDocument::new();
                    if !p.include_id {
                        d.insert(ID_FIELD, 0);
                    }
                    for (field, item) in &p.fields {
                        match item {
                            ProjectItem::Include => d.insert(field.clone(), 1),
                            ProjectItem::Computed(e) => d.insert(field.clone(), expression_to_bson(e)),
                        };
                    }
                    d.into()
                }
                Stage::Group(g) => {
                    let mut d = BsonDocument::new();
                    d.insert(ID_FIELD, expression_to_bson(&g.id));
                    for (field, acc) in &g.accumulators {
                        let (name, e) = match acc {
                            Accumulator::Sum(e) => ("$sum", e),
                            Accumulator::Avg(e) => ("$avg", e),
                            Accumulator::Min(e) => ("$min", e),
                            Accumulator::Max(e) => ("$max", e),
                        };
                        let mut a = BsonDocument::new();
                        a.insert(name, expression_to_bson(e));
                        d.insert(field.clone(), a);
                    }
                    d.into()
                }
            };
            let mut out = BsonDocument::new();
            out.insert(stage.name(), body);
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn group_with_accumulators() {
        let p = parse_pipeline(&[doc! {"$group": {"_id": "$genre", "averagePrice": {"$avg": "$price"}}}]).unwrap();
        assert_eq!(
            p.stages,
            vec![Stage::Group(GroupSpec {
                id: Expression::field("genre"),
                accumulators: vec![("averagePrice".into(), Accumulator::Avg(Expression::field("price")))],
            })]
        );
    }

    #[test]
    fn arity_is_checked() {
        assert!(parse_expression(&Bson::Document(doc! {"$divide": ["$a"]})).is_err());
        assert!(parse_expression(&Bson::Document(doc! {"$floor": ["$a", 2]})).is_err());
        let e = parse_expression(&Bson::Document(doc! {"$floor": "$a"})).unwrap();
        assert_eq!(e, Expression::Floor(Box::new(Expression::field("a"))));
    }

    #[test]
    fn unknown_stages_and_shapes_are_malformed() {
        assert!(parse_pipeline(&[doc! {"$lookup": {}}]).is_err());
        assert!(parse_pipeline(&[doc! {"$limit": 0}]).is_err());
        assert!(parse_pipeline(&[doc! {"$skip": -1}]).is_err());
        assert!(parse_pipeline(&[doc! {"$group": {"n": {"$sum": 1}}}]).is_err());
        assert!(parse_pipeline(&[doc! {"$sort": {"a": 1}, "$limit": 1}]).is_err());
        assert!(parse_pipeline(&[doc! {"$project": {"x": {"a": 1}}}]).is_err());
    }

    #[test]
    fn pipeline_renders_in_shell_shape() {
        let src = vec![
            doc! {"$group": {"_id": "$author", "bookCount": {"$sum": 1}}},
            doc! {"$sort": {"bookCount": -1, "_id": 1}},
            doc! {"$limit": 1i64},
        ];
        let p = parse_pipeline(&src).unwrap();
        assert_eq!(pipeline_to_documents(&p), src);
    }

    #[test]
    fn json_pipelines() {
        let p = parse_pipeline_json(r#"[{"$match":{"genre":"Fiction"}},{"$limit":2}]"#).unwrap();
        assert_eq!(p.stages.len(), 2);
        assert!(parse_pipeline_json(r#"{"$limit":2}"#).is_err());
    }
}
