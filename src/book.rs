//! The `books` record and the field rules the catalog relies on.
//!
//! `published_year` is the canonical year field. `publishedYear` is accepted as an alias
//! on input only (filters and imported records) and is rewritten to the canonical name.

use crate::errors::DbError;
use crate::query::eval::{as_f64, is_numeric};
use crate::query::{self, Filter, UpdateDoc, parse_filter};
use bson::{Bson, Document as BsonDocument, doc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Legacy spelling of [`BookField::PublishedYear`].
pub const PUBLISHED_YEAR_ALIAS: &str = "publishedYear";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub genre: String,
    #[serde(alias = "publishedYear")]
    pub published_year: i32,
    pub price: f64,
    pub in_stock: bool,
}

impl Book {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        genre: impl Into<String>,
        published_year: i32,
        price: f64,
        in_stock: bool,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            genre: genre.into(),
            published_year,
            price,
            in_stock,
        }
    }

    /// # Errors
    /// Returns `InvalidDocument` naming the first offending field.
    pub fn validate(&self) -> Result<(), DbError> {
        let invalid = |msg: String| Err(DbError::InvalidDocument(msg));
        if self.title.trim().is_empty() {
            return invalid("title must not be empty".into());
        }
        if self.author.trim().is_empty() {
            return invalid(format!("author of {:?} must not be empty", self.title));
        }
        if !(1000..=9999).contains(&self.published_year) {
            return invalid(format!("published_year {} is not a four-digit year", self.published_year));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return invalid(format!("price {} must be a non-negative amount", self.price));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_document(&self) -> BsonDocument {
        doc! {
            "title": self.title.as_str(),
            "author": self.author.as_str(),
            "genre": self.genre.as_str(),
            "published_year": self.published_year,
            "price": positive_zero(self.price),
            "in_stock": self.in_stock,
        }
    }

    /// Reads a stored record. Extra fields such as `_id` are ignored.
    ///
    /// # Errors
    /// Returns `InvalidDocument` when a field is missing or has the wrong type.
    pub fn from_document(doc: &BsonDocument) -> Result<Self, DbError> {
        let text = |f: BookField| {
            doc.get_str(f.name())
                .map(str::to_owned)
                .map_err(|_| DbError::InvalidDocument(format!("{f} must be a string")))
        };
        let year = match doc.get(BookField::PublishedYear.name()).or_else(|| doc.get(PUBLISHED_YEAR_ALIAS)) {
            Some(Bson::Int32(y)) => *y,
            Some(Bson::Int64(y)) => i32::try_from(*y)
                .map_err(|_| DbError::InvalidDocument(format!("published_year {y} out of range")))?,
            Some(Bson::Double(y)) if y.fract() == 0.0 && y.abs() < f64::from(i32::MAX) => *y as i32,
            _ => return Err(DbError::InvalidDocument("published_year must be an integer".into())),
        };
        let price = doc
            .get(BookField::Price.name())
            .and_then(as_f64)
            .map(positive_zero)
            .ok_or_else(|| DbError::InvalidDocument("price must be a number".into()))?;
        let in_stock = doc
            .get_bool(BookField::InStock.name())
            .map_err(|_| DbError::InvalidDocument("in_stock must be a boolean".into()))?;
        Ok(Self {
            title: text(BookField::Title)?,
            author: text(BookField::Author)?,
            genre: text(BookField::Genre)?,
            published_year: year,
            price,
            in_stock,
        })
    }
}

/// Stored prices never carry a negative zero.
fn positive_zero(price: f64) -> f64 {
    if price == 0.0 { 0.0 } else { price }
}

/// What a field's values look like, for type-checking filters and updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookField {
    Title,
    Author,
    Genre,
    PublishedYear,
    Price,
    InStock,
}

impl BookField {
    pub const ALL: [Self; 6] =
        [Self::Title, Self::Author, Self::Genre, Self::PublishedYear, Self::Price, Self::InStock];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Author => "author",
            Self::Genre => "genre",
            Self::PublishedYear => "published_year",
            Self::Price => "price",
            Self::InStock => "in_stock",
        }
    }

    #[must_use]
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::Title | Self::Author | Self::Genre => FieldKind::Text,
            Self::PublishedYear => FieldKind::Integer,
            Self::Price => FieldKind::Number,
            Self::InStock => FieldKind::Flag,
        }
    }

    /// Looks a field up by canonical name or alias.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        let name = resolve_field(name);
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for BookField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BookField {
    type Err = DbError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| DbError::malformed(format!("unknown book field {s}")))
    }
}

/// Maps the `publishedYear` alias to `published_year`; other paths pass through.
#[must_use]
pub fn resolve_field(path: &str) -> &str {
    if path == PUBLISHED_YEAR_ALIAS { BookField::PublishedYear.name() } else { path }
}

fn fits(kind: FieldKind, v: &Bson) -> bool {
    match kind {
        FieldKind::Text => matches!(v, Bson::String(_)),
        FieldKind::Integer => match v {
            Bson::Int32(_) | Bson::Int64(_) => true,
            Bson::Double(f) => f.fract() == 0.0,
            _ => false,
        },
        FieldKind::Number => is_numeric(v),
        FieldKind::Flag => matches!(v, Bson::Boolean(_)),
    }
}

/// Parses a filter over book fields, resolving aliases and type-checking range operands.
///
/// # Errors
/// Returns `MalformedQuery` for invalid filter shapes or mistyped range comparisons.
pub fn parse_book_filter(doc: &BsonDocument) -> Result<Filter, DbError> {
    let filter = parse_filter(doc)?.map_paths(|p| resolve_field(p).to_string());
    validate_filter(&filter)?;
    Ok(filter)
}

/// Range comparisons on known book fields must use operands of the field's type,
/// so `{published_year: {$gt: "1950"}}` is rejected instead of silently matching nothing.
///
/// # Errors
/// Returns `MalformedQuery` for the first mistyped comparison.
pub fn validate_filter(filter: &Filter) -> Result<(), DbError> {
    let mut err = None;
    filter.for_each_path(&mut |path, leaf| {
        if err.is_some() {
            return;
        }
        if let Filter::Cmp { op, value, .. } = leaf
            && op.is_range()
            && let Some(field) = BookField::lookup(path)
        {
            // integral bounds on a year are fine as doubles too
            let kind = match field.kind() {
                FieldKind::Integer => FieldKind::Number,
                k => k,
            };
            if !fits(kind, value) {
                err = Some(DbError::malformed(format!(
                    "{} on {field} needs a {kind:?} operand, got {value}",
                    op.operator()
                )));
            }
        }
    });
    err.map_or(Ok(()), Err)
}

/// Generic update checks plus book field typing. Every book field is required, so none
/// may be unset or have a sub-path written; `$inc` only touches numeric fields.
/// The resulting values are checked per document by [`check_updated_record`].
///
/// # Errors
/// Returns `MalformedQuery` for the first violation.
pub fn validate_update(update: &UpdateDoc) -> Result<(), DbError> {
    query::validate_update(update)?;
    for path in update.paths() {
        if let Some((root, _)) = path.split_once('.')
            && let Some(field) = BookField::lookup(root)
        {
            return Err(DbError::malformed(format!("{path} reaches inside {field}, which is not a document")));
        }
    }
    if let Some(field) = update.unset.iter().find_map(|p| BookField::lookup(p)) {
        return Err(DbError::malformed(format!("$unset cannot remove required field {field}")));
    }
    for (path, value) in &update.set {
        let Some(field) = BookField::lookup(path) else { continue };
        if !fits(field.kind(), value) {
            return Err(DbError::malformed(format!("$set of {field} needs a {:?} value, got {value}", field.kind())));
        }
        if field == BookField::Price && as_f64(value).is_none_or(|p| !p.is_finite() || p < 0.0) {
            return Err(DbError::malformed(format!("price must be a non-negative amount, got {value}")));
        }
    }
    for (path, by) in &update.inc {
        if !by.is_finite() {
            return Err(DbError::malformed(format!("$inc of {path} must be finite")));
        }
        match BookField::lookup(path).map(BookField::kind) {
            None | Some(FieldKind::Number) => {}
            Some(FieldKind::Integer) if by.fract() == 0.0 => {}
            Some(_) => return Err(DbError::malformed(format!("$inc cannot change {path} by {by}"))),
        }
    }
    Ok(())
}

/// Vetoes an update that would turn a valid book record into an invalid one, such as an
/// `$inc` that drives `price` below zero. Records that were not valid books beforehand
/// are left to the generic rules.
///
/// # Errors
/// Returns `MalformedQuery` describing the field the update would break.
pub fn check_updated_record(before: &BsonDocument, after: &BsonDocument) -> Result<(), DbError> {
    if Book::from_document(before).and_then(|b| b.validate()).is_err() {
        return Ok(());
    }
    Book::from_document(after)
        .and_then(|b| b.validate())
        .map_err(|e| DbError::malformed(format!("update rejected: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nineteen_eighty_four() -> Book {
        Book::new("1984", "George Orwell", "Dystopian", 1949, 10.99, true)
    }

    #[test]
    fn record_round_trips_through_bson() {
        let b = nineteen_eighty_four();
        let mut d = b.to_document();
        d.insert("_id", "ignored");
        assert_eq!(Book::from_document(&d).unwrap(), b);
    }

    #[test]
    fn from_document_accepts_alias_and_wider_numbers() {
        let d = doc! {
            "title": "T", "author": "A", "genre": "G",
            "publishedYear": 1999i64, "price": 5, "in_stock": false,
        };
        let b = Book::from_document(&d).unwrap();
        assert_eq!(b.published_year, 1999);
        assert_eq!(b.price, 5.0);
        assert!(Book::from_document(&doc! {"title": "T"}).is_err());
    }

    #[test]
    fn validate_rejects_bad_records() {
        assert!(nineteen_eighty_four().validate().is_ok());
        let mut b = nineteen_eighty_four();
        b.price = -1.0;
        assert!(b.validate().is_err());
        let mut b = nineteen_eighty_four();
        b.published_year = 49;
        assert!(b.validate().is_err());
        let mut b = nineteen_eighty_four();
        b.title = "  ".into();
        assert!(b.validate().is_err());
    }

    #[test]
    fn alias_is_rewritten() {
        let f = parse_book_filter(&doc! {"publishedYear": {"$gt": 1950}}).unwrap();
        assert_eq!(f, Filter::gt("published_year", 1950));
        assert_eq!("publishedYear".parse::<BookField>().unwrap(), BookField::PublishedYear);
    }

    #[test]
    fn mistyped_ranges_are_malformed() {
        assert!(parse_book_filter(&doc! {"published_year": {"$gt": "1950"}}).is_err());
        assert!(parse_book_filter(&doc! {"in_stock": {"$gte": 1}}).is_err());
        assert!(parse_book_filter(&doc! {"price": {"$lt": 20.5}}).is_ok());
        // equality stays permissive
        assert!(parse_book_filter(&doc! {"published_year": "1950"}).is_ok());
    }

    #[test]
    fn price_updates_are_checked() {
        assert!(validate_update(&UpdateDoc::set("price", 15.99)).is_ok());
        assert!(validate_update(&UpdateDoc::set("price", -2.0)).is_err());
        assert!(validate_update(&UpdateDoc::set("price", f64::NAN)).is_err());
        assert!(validate_update(&UpdateDoc::set("price", "cheap")).is_err());
        assert!(validate_update(&UpdateDoc::set("_id", "x")).is_err());
        let inc = UpdateDoc { inc: vec![("in_stock".into(), 1.0)], ..UpdateDoc::default() };
        assert!(validate_update(&inc).is_err());
        let inc = UpdateDoc { inc: vec![("published_year".into(), 0.5)], ..UpdateDoc::default() };
        assert!(validate_update(&inc).is_err());
    }

    #[test]
    fn required_fields_cannot_be_removed_or_nested_into() {
        let unset = UpdateDoc { unset: vec!["price".into()], ..UpdateDoc::default() };
        assert!(validate_update(&unset).is_err());
        let unset = UpdateDoc { unset: vec!["publishedYear".into()], ..UpdateDoc::default() };
        assert!(validate_update(&unset).is_err());
        assert!(validate_update(&UpdateDoc::set("price.amount", 3)).is_err());
        let inc = UpdateDoc { inc: vec![("author.age".into(), 1.0)], ..UpdateDoc::default() };
        assert!(validate_update(&inc).is_err());
        // fields outside the record stay free
        assert!(validate_update(&UpdateDoc::set("meta.pages", 320)).is_ok());
        let unset = UpdateDoc { unset: vec!["notes".into()], ..UpdateDoc::default() };
        assert!(validate_update(&unset).is_ok());
    }

    #[test]
    fn updated_record_must_stay_a_valid_book() {
        let before = nineteen_eighty_four().to_document();
        let mut after = before.clone();
        after.insert("price", -89.01);
        assert!(matches!(check_updated_record(&before, &after), Err(DbError::MalformedQuery(_))));
        let mut after = before.clone();
        after.insert("published_year", 10_000);
        assert!(check_updated_record(&before, &after).is_err());
        let mut after = before.clone();
        after.insert("price", 0.0);
        assert!(check_updated_record(&before, &after).is_ok());
        // not a book to begin with
        let loose = doc! {"title": "Dune", "genre": "Fiction"};
        assert!(check_updated_record(&loose, &doc! {"price": -1}).is_ok());
    }

    #[test]
    fn negative_zero_price_is_stored_as_zero() {
        let mut b = nineteen_eighty_four();
        b.price = -0.0;
        let d = b.to_document();
        assert!(d.get_f64("price").unwrap().is_sign_positive());
        assert!(Book::from_document(&doc! {"title": "T", "author": "A", "genre": "G", "published_year": 2000, "price": -0.0, "in_stock": true}).unwrap().price.is_sign_positive());
    }
}
