use crate::errors::DbError;
use crate::query::eval::as_f64;
use crate::types::ID_FIELD;
use bson::{Bson, Document as BsonDocument};
use serde::{Deserialize, Serialize};

/// A typed row decoded from aggregation output.
pub trait ResultRow: Sized {
    /// # Errors
    /// Returns `InvalidDocument` when the row does not have the expected shape.
    fn from_row(doc: &BsonDocument) -> Result<Self, DbError>;
}

/// # Errors
/// Fails on the first row that does not decode.
pub fn decode_rows<T: ResultRow>(docs: &[BsonDocument]) -> Result<Vec<T>, DbError> {
    docs.iter().map(T::from_row).collect()
}

fn key(doc: &BsonDocument) -> Result<String, DbError> {
    match doc.get(ID_FIELD) {
        Some(Bson::String(s)) => Ok(s.clone()),
        other => Err(DbError::InvalidDocument(format!("group key must be a string, got {other:?}"))),
    }
}

fn count(doc: &BsonDocument, field: &str) -> Result<u64, DbError> {
    let n = match doc.get(field) {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        _ => return Err(DbError::InvalidDocument(format!("{field} must be an integer count"))),
    };
    u64::try_from(n).map_err(|_| DbError::InvalidDocument(format!("{field} is negative")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreAverage {
    pub genre: String,
    /// `None` when no book in the genre has a numeric price.
    pub average_price: Option<f64>,
}

impl ResultRow for GenreAverage {
    fn from_row(doc: &BsonDocument) -> Result<Self, DbError> {
        let average_price = match doc.get("averagePrice") {
            None | Some(Bson::Null) => None,
            Some(v) => Some(
                as_f64(v).ok_or_else(|| DbError::InvalidDocument("averagePrice must be numeric".into()))?,
            ),
        };
        Ok(Self { genre: key(doc)?, average_price })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    pub author: String,
    pub book_count: u64,
}

impl ResultRow for AuthorCount {
    fn from_row(doc: &BsonDocument) -> Result<Self, DbError> {
        Ok(Self { author: key(doc)?, book_count: count(doc, "bookCount")? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecadeCount {
    /// e.g. `"1980s"`
    pub decade: String,
    pub count: u64,
}

impl ResultRow for DecadeCount {
    fn from_row(doc: &BsonDocument) -> Result<Self, DbError> {
        Ok(Self { decade: key(doc)?, count: count(doc, "count")? })
    }
}
