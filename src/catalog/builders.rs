//! One constructor per catalog query. Arguments are checked here, so a `Request`
//! that exists is always well-formed.

use crate::aggregate::parse_pipeline;
use crate::book::{self, BookField};
use crate::errors::DbError;
use crate::index::IndexSpec;
use crate::query::{ExplainVerbosity, Filter, FindOptions, Order, Projection, SortSpec, UpdateDoc};
use crate::types::BOOKS_COLLECTION;
use bson::doc;

use super::request::{Operation, Request};

fn books(op: Operation) -> Request {
    Request::new(BOOKS_COLLECTION, op)
}

fn non_empty<'a>(what: BookField, value: &'a str) -> Result<&'a str, DbError> {
    if value.trim().is_empty() {
        return Err(DbError::malformed(format!("{what} must not be empty")));
    }
    Ok(value)
}

fn find(filter: Filter, options: FindOptions) -> Request {
    books(Operation::Find { filter, options })
}

/// `{title: 1, author: 1, price: 1, _id: 0}`
fn listing() -> Projection {
    Projection::include([BookField::Title.name(), BookField::Author.name(), BookField::Price.name()]).without_id()
}

/// `db.books.find({genre: <genre>})`
///
/// # Errors
/// Returns `MalformedQuery` for an empty genre.
pub fn books_by_genre(genre: &str) -> Result<Request, DbError> {
    let genre = non_empty(BookField::Genre, genre)?;
    Ok(find(Filter::eq(BookField::Genre.name(), genre), FindOptions::default()))
}

/// `db.books.find({published_year: {$gt: <year>}})`
///
/// # Errors
/// Never fails for any input.
pub fn books_published_after(year: i32) -> Result<Request, DbError> {
    Ok(find(Filter::gt(BookField::PublishedYear.name(), year), FindOptions::default()))
}

/// # Errors
/// Returns `MalformedQuery` for an empty author.
pub fn books_by_author(author: &str) -> Result<Request, DbError> {
    let author = non_empty(BookField::Author, author)?;
    Ok(find(Filter::eq(BookField::Author.name(), author), FindOptions::default()))
}

/// `db.books.updateOne({title: <title>}, {$set: {price: <price>}})`
///
/// # Errors
/// Returns `MalformedQuery` for an empty title or a negative or non-finite price.
pub fn set_price_by_title(title: &str, price: f64) -> Result<Request, DbError> {
    let title = non_empty(BookField::Title, title)?;
    let update = UpdateDoc::set(BookField::Price.name(), price);
    book::validate_update(&update)?;
    Ok(books(Operation::UpdateOne { filter: Filter::eq(BookField::Title.name(), title), update }))
}

/// # Errors
/// Returns `MalformedQuery` for an empty title.
pub fn delete_by_title(title: &str) -> Result<Request, DbError> {
    let title = non_empty(BookField::Title, title)?;
    Ok(books(Operation::DeleteOne { filter: Filter::eq(BookField::Title.name(), title) }))
}

/// In-stock books newer than `year`, showing title, author and price only.
///
/// # Errors
/// Never fails for any input.
pub fn in_stock_published_after(year: i32) -> Result<Request, DbError> {
    let filter = Filter::and(vec![
        Filter::eq(BookField::InStock.name(), true),
        Filter::gt(BookField::PublishedYear.name(), year),
    ]);
    Ok(find(filter, FindOptions { projection: Some(listing()), ..FindOptions::default() }))
}

/// Every book by price, cheapest first for `Order::Asc`.
///
/// # Errors
/// Never fails for any input.
pub fn books_sorted_by_price(order: Order) -> Result<Request, DbError> {
    let sort = vec![SortSpec { field: BookField::Price.name().into(), order }];
    Ok(find(Filter::True, FindOptions { projection: Some(listing()), sort: Some(sort), ..FindOptions::default() }))
}

/// Page `page` (1-based) of `page_size` books in natural order.
///
/// # Errors
/// Returns `MalformedQuery` when `page` or `page_size` is zero or the offset overflows.
pub fn books_page(page: usize, page_size: usize) -> Result<Request, DbError> {
    if page == 0 || page_size == 0 {
        return Err(DbError::malformed("page and page size start at 1"));
    }
    let skip = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| DbError::malformed(format!("page {page} is out of range")))?;
    Ok(find(
        Filter::True,
        FindOptions { projection: Some(listing()), skip: Some(skip), limit: Some(page_size), sort: None },
    ))
}

/// Mean price per genre: `{_id: <genre>, averagePrice: <mean>}`.
///
/// # Errors
/// Returns `MalformedQuery` if the fixed pipeline is rejected by the pipeline parser.
pub fn average_price_by_genre() -> Result<Request, DbError> {
    let pipeline = parse_pipeline(&[doc! {
        "$group": {"_id": "$genre", "averagePrice": {"$avg": "$price"}},
    }])?;
    Ok(books(Operation::Aggregate { pipeline }))
}

/// The author with the most books: `{_id: <author>, bookCount: <n>}`.
/// Ties go to the alphabetically first author.
///
/// # Errors
/// Returns `MalformedQuery` if the fixed pipeline is rejected by the pipeline parser.
pub fn author_with_most_books() -> Result<Request, DbError> {
    let pipeline = parse_pipeline(&[
        doc! {"$group": {"_id": "$author", "bookCount": {"$sum": 1}}},
        doc! {"$sort": {"bookCount": -1, "_id": 1}},
        doc! {"$limit": 1},
    ])?;
    Ok(books(Operation::Aggregate { pipeline }))
}

/// Books per decade, labelled `"1980s"` and sorted by label.
///
/// # Errors
/// Returns `MalformedQuery` if the fixed pipeline is rejected by the pipeline parser.
pub fn books_per_decade() -> Result<Request, DbError> {
    let pipeline = parse_pipeline(&[
        doc! {"$project": {"decade": {"$concat": [
            {"$toString": {"$multiply": [{"$floor": {"$divide": ["$published_year", 10]}}, 10]}},
            "s"
        ]}}},
        doc! {"$group": {"_id": "$decade", "count": {"$sum": 1}}},
        doc! {"$sort": {"_id": 1}},
    ])?;
    Ok(books(Operation::Aggregate { pipeline }))
}

/// `db.books.createIndex({title: 1})`
///
/// # Errors
/// Returns `MalformedQuery` if the key list is rejected.
pub fn title_index() -> Result<Request, DbError> {
    let spec = IndexSpec::ascending([BookField::Title.name()])?;
    Ok(books(Operation::CreateIndex { spec }))
}

/// `db.books.createIndex({author: 1, published_year: 1})`
///
/// # Errors
/// Returns `MalformedQuery` if the key list is rejected.
pub fn author_year_index() -> Result<Request, DbError> {
    let spec = IndexSpec::ascending([BookField::Author.name(), BookField::PublishedYear.name()])?;
    Ok(books(Operation::CreateIndex { spec }))
}

/// # Errors
/// Returns `MalformedQuery` for an empty title.
pub fn explain_by_title(title: &str, verbosity: ExplainVerbosity) -> Result<Request, DbError> {
    let title = non_empty(BookField::Title, title)?;
    Ok(books(Operation::Explain {
        filter: Filter::eq(BookField::Title.name(), title),
        options: FindOptions::default(),
        verbosity,
    }))
}

/// # Errors
/// Returns `MalformedQuery` for an empty author.
pub fn explain_by_author_and_year(
    author: &str,
    year: i32,
    verbosity: ExplainVerbosity,
) -> Result<Request, DbError> {
    let author = non_empty(BookField::Author, author)?;
    let filter = Filter::and(vec![
        Filter::eq(BookField::Author.name(), author),
        Filter::eq(BookField::PublishedYear.name(), year),
    ]);
    Ok(books(Operation::Explain { filter, options: FindOptions::default(), verbosity }))
}
