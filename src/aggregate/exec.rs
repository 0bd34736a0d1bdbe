use crate::collection::Collection;
use crate::errors::DbError;
use crate::index::IndexKey;
use crate::query::eval::{as_f64, is_numeric};
use crate::query::{Filter, compare_bson, compare_docs, eval_filter, get_path, micros_since, scan};
use crate::types::ID_FIELD;
use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use super::types::{Accumulator, Expression, GroupSpec, Pipeline, ProjectItem, ProjectSpec, Stage};

/// Runs `pipeline` over `col`. A leading `$match` is answered through the collection's
/// indexes; every later stage works on the in-memory output of the one before it.
///
/// # Errors
/// Returns `MalformedQuery` when an expression meets values it cannot operate on.
pub fn run_pipeline(col: &Collection, pipeline: &Pipeline) -> Result<Vec<BsonDocument>, DbError> {
    let start = Instant::now();
    let (input, rest) = match pipeline.stages.split_first() {
        Some((Stage::Match(filter), rest)) => (scan(col, filter).docs, rest),
        _ => (scan(col, &Filter::True).docs, pipeline.stages.as_slice()),
    };
    let scanned = input.len();
    let out = run_stages(input, rest)?;
    crate::qlog!({
        "op": "aggregate",
        "collection": col.name(),
        "stages": pipeline.stages.iter().map(Stage::name).collect::<Vec<_>>(),
        "input": scanned,
        "returned": out.len(),
        "duration_us": micros_since(start),
    });
    Ok(out)
}

/// Runs stages over an already materialised document list.
///
/// # Errors
/// Same as [`run_pipeline`].
pub fn run_stages(mut docs: Vec<BsonDocument>, stages: &[Stage]) -> Result<Vec<BsonDocument>, DbError> {
    for stage in stages {
        docs = match stage {
            Stage::Match(f) => docs.into_iter().filter(|d| eval_filter(d, f)).collect(),
            Stage::Project(p) => docs.iter().map(|d| project(d, p)).collect::<Result<_, _>>()?,
            Stage::Group(g) => group(&docs, g)?,
            Stage::Sort(s) => {
                docs.sort_by(|a, b| compare_docs(a, b, s));
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
        };
    }
    Ok(docs)
}

fn project(doc: &BsonDocument, spec: &ProjectSpec) -> Result<BsonDocument, DbError> {
    let mut out = BsonDocument::new();
    if spec.include_id
        && let Some(id) = doc.get(ID_FIELD)
    {
        out.insert(ID_FIELD, id.clone());
    }
    for (field, item) in &spec.fields {
        let value = match item {
            ProjectItem::Include => get_path(doc, field).cloned(),
            ProjectItem::Computed(e) => evaluate(doc, e)?,
        };
        if let Some(v) = value {
            insert_path(&mut out, field, v);
        }
    }
    Ok(out)
}

fn insert_path(doc: &mut BsonDocument, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, tail)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, BsonDocument::new());
            }
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                insert_path(child, tail, value);
            }
        }
    }
}

/// Running state of one accumulator within one group.
#[derive(Debug, Clone)]
enum AccState {
    Sum { int: i64, float: f64, all_int: bool },
    Avg { total: f64, n: u64 },
    Extreme { best: Option<Bson>, want: Ordering },
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => Self::Sum { int: 0, float: 0.0, all_int: true },
            Accumulator::Avg(_) => Self::Avg { total: 0.0, n: 0 },
            Accumulator::Min(_) => Self::Extreme { best: None, want: Ordering::Less },
            Accumulator::Max(_) => Self::Extreme { best: None, want: Ordering::Greater },
        }
    }

    fn push(&mut self, v: Option<Bson>) {
        let Some(v) = v else { return };
        match self {
            Self::Sum { int, float, all_int } => {
                let whole = match v {
                    Bson::Int32(i) => Some(i64::from(i)),
                    Bson::Int64(i) => Some(i),
                    _ => None,
                };
                match whole.and_then(|i| int.checked_add(i)) {
                    Some(next) if *all_int => *int = next,
                    // past Int64 the sum widens to a double
                    _ if is_numeric(&v) => {
                        *float += as_f64(&v).unwrap_or(0.0);
                        if *all_int {
                            #[allow(clippy::cast_precision_loss)]
                            {
                                *float += *int as f64;
                            }
                            *all_int = false;
                        }
                    }
                    _ => {}
                }
            }
            Self::Avg { total, n } => {
                if let Some(f) = as_f64(&v) {
                    *total += f;
                    *n += 1;
                }
            }
            Self::Extreme { best, want } => {
                if matches!(v, Bson::Null | Bson::Undefined) {
                    return;
                }
                if best.as_ref().is_none_or(|b| compare_bson(&v, b) == *want) {
                    *best = Some(v);
                }
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> Bson {
        match self {
            Self::Sum { int, all_int: true, .. } => Bson::Int64(int),
            Self::Sum { float, .. } => Bson::Double(float),
            Self::Avg { n: 0, .. } => Bson::Null,
            Self::Avg { total, n } => Bson::Double(total / n as f64),
            Self::Extreme { best, .. } => best.unwrap_or(Bson::Null),
        }
    }
}

/// Groups in the order each key is first seen. `1` and `1.0` land in the same group.
fn group(docs: &[BsonDocument], spec: &GroupSpec) -> Result<Vec<BsonDocument>, DbError> {
    let mut slots: HashMap<IndexKey, usize> = HashMap::new();
    let mut groups: Vec<(Bson, Vec<AccState>)> = Vec::new();
    for doc in docs {
        let key = evaluate(doc, &spec.id)?.unwrap_or(Bson::Null);
        let slot = *slots.entry(IndexKey::from_value(Some(&key))).or_insert_with(|| {
            groups.push((key, spec.accumulators.iter().map(|(_, a)| AccState::new(a)).collect()));
            groups.len() - 1
        });
        for ((_, acc), state) in spec.accumulators.iter().zip(groups[slot].1.iter_mut()) {
            let (Accumulator::Sum(e) | Accumulator::Avg(e) | Accumulator::Min(e) | Accumulator::Max(e)) = acc;
            state.push(evaluate(doc, e)?);
        }
    }
    Ok(groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = BsonDocument::new();
            out.insert(ID_FIELD, key);
            for ((name, _), state) in spec.accumulators.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect())
}

/// Integer-or-double arithmetic operand.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_bson(op: &str, v: &Bson) -> Result<Self, DbError> {
        match v {
            Bson::Int32(i) => Ok(Self::Int(i64::from(*i))),
            Bson::Int64(i) => Ok(Self::Int(*i)),
            other => as_f64(other)
                .map(Self::Float)
                .ok_or_else(|| DbError::malformed(format!("{op} only supports numeric types"))),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    const fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn combine(self, other: Self, int: fn(i64, i64) -> Option<i64>, float: fn(f64, f64) -> f64) -> Self {
        match (self, other) {
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(a), Self::Int(b)) => {
                int(a, b).map_or_else(|| Self::Float(float(a as f64, b as f64)), Self::Int)
            }
            (a, b) => Self::Float(float(a.as_f64(), b.as_f64())),
        }
    }

    fn into_bson(self) -> Bson {
        match self {
            Self::Int(i) => i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32),
            Self::Float(f) => Bson::Double(f),
        }
    }
}

/// Evaluates operands; `None` when any of them is null or missing.
fn numbers(doc: &BsonDocument, op: &str, args: &[&Expression]) -> Result<Option<Vec<Num>>, DbError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match evaluate(doc, arg)? {
            None | Some(Bson::Null | Bson::Undefined) => return Ok(None),
            Some(v) => out.push(Num::from_bson(op, &v)?),
        }
    }
    Ok(Some(out))
}

fn fold(
    doc: &BsonDocument,
    op: &str,
    args: &[&Expression],
    identity: Num,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Result<Bson, DbError> {
    Ok(match numbers(doc, op, args)? {
        None => Bson::Null,
        Some(ns) => ns.into_iter().fold(identity, |acc, n| acc.combine(n, int, float)).into_bson(),
    })
}

/// Formats a value the way `$toString` does. Integral doubles print without a fraction.
fn stringify(v: &Bson) -> Result<String, DbError> {
    Ok(match v {
        Bson::String(s) => s.clone(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Bson::Double(f) => f.to_string(),
        Bson::Decimal128(d) => d.to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::ObjectId(o) => o.to_hex(),
        other => return Err(DbError::malformed(format!("$toString cannot convert {other}"))),
    })
}

/// Evaluates `expr` against `doc`. `None` means the referenced field is absent.
///
/// # Errors
/// Returns `MalformedQuery` for operand type mismatches and division by zero.
pub fn evaluate(doc: &BsonDocument, expr: &Expression) -> Result<Option<Bson>, DbError> {
    let value = match expr {
        Expression::Field(path) => return Ok(get_path(doc, path).cloned()),
        Expression::Literal(v) => v.clone(),
        Expression::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                match evaluate(doc, part)? {
                    None | Some(Bson::Null | Bson::Undefined) => return Ok(Some(Bson::Null)),
                    Some(Bson::String(s)) => out.push_str(&s),
                    Some(other) => {
                        return Err(DbError::malformed(format!("$concat only supports strings, not {other}")));
                    }
                }
            }
            Bson::String(out)
        }
        Expression::ToString(x) => match evaluate(doc, x)? {
            None | Some(Bson::Null | Bson::Undefined) => Bson::Null,
            Some(v) => Bson::String(stringify(&v)?),
        },
        Expression::Add(xs) => {
            let args: Vec<_> = xs.iter().collect();
            fold(doc, "$add", &args, Num::Int(0), i64::checked_add, |a, b| a + b)?
        }
        Expression::Multiply(xs) => {
            let args: Vec<_> = xs.iter().collect();
            fold(doc, "$multiply", &args, Num::Int(1), i64::checked_mul, |a, b| a * b)?
        }
        Expression::Subtract(a, b) => match numbers(doc, "$subtract", &[&**a, &**b])?.as_deref() {
            Some(&[x, y]) => x.combine(y, i64::checked_sub, |a, b| a - b).into_bson(),
            _ => Bson::Null,
        },
        Expression::Divide(a, b) => match numbers(doc, "$divide", &[&**a, &**b])?.as_deref() {
            Some(&[_, y]) if y.as_f64() == 0.0 => return Err(DbError::malformed("can't $divide by zero")),
            Some(&[x, y]) => Bson::Double(x.as_f64() / y.as_f64()),
            _ => Bson::Null,
        },
        Expression::Mod(a, b) => match numbers(doc, "$mod", &[&**a, &**b])?.as_deref() {
            Some(&[_, y]) if y.as_f64() == 0.0 => return Err(DbError::malformed("can't $mod by zero")),
            Some(&[x, y]) => x.combine(y, i64::checked_rem, |a, b| a % b).into_bson(),
            _ => Bson::Null,
        },
        Expression::Floor(x) => match numbers(doc, "$floor", &[&**x])?.as_deref() {
            Some(&[Num::Int(i)]) => Num::Int(i).into_bson(),
            Some(&[Num::Float(f)]) => Bson::Double(f.floor()),
            _ => Bson::Null,
        },
    };
    Ok(Some(value))
}
