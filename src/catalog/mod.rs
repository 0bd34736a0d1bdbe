//! The books query catalog: typed requests, one builder per query, and the decoded
//! shapes of the aggregation results.

mod builders;
mod request;
mod results;

pub use builders::{
    author_with_most_books, author_year_index, average_price_by_genre, books_by_author, books_by_genre,
    books_page, books_per_decade, books_published_after, books_sorted_by_price, delete_by_title,
    explain_by_author_and_year, explain_by_title, in_stock_published_after, set_price_by_title, title_index,
};
pub use request::{Operation, OperationKind, Request, Response};
pub use results::{AuthorCount, DecadeCount, GenreAverage, ResultRow, decode_rows};

use crate::errors::DbError;
use crate::query::{ExplainVerbosity, Order};

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub request: Request,
}

fn entry(name: &'static str, description: &'static str, request: Result<Request, DbError>) -> Result<CatalogEntry, DbError> {
    Ok(CatalogEntry { name, description, request: request? })
}

/// Every catalog query with its reference arguments, in listing order.
///
/// # Errors
/// Only if a builder rejects its own reference arguments.
pub fn catalog() -> Result<Vec<CatalogEntry>, DbError> {
    let stats = ExplainVerbosity::ExecutionStats;
    [
        entry("books-by-genre", "Find all books in a genre", books_by_genre("Fiction")),
        entry("books-published-after", "Find books published after a year", books_published_after(1950)),
        entry("books-by-author", "Find books by an author", books_by_author("George Orwell")),
        entry("update-price", "Update the price of a book by title", set_price_by_title("1984", 15.99)),
        entry("delete-by-title", "Delete a book by title", delete_by_title("The Hobbit")),
        entry(
            "in-stock-after",
            "In-stock books published after a year; title, author and price only",
            in_stock_published_after(2010),
        ),
        entry("sort-by-price-asc", "Books by price, ascending", books_sorted_by_price(Order::Asc)),
        entry("sort-by-price-desc", "Books by price, descending", books_sorted_by_price(Order::Desc)),
        entry("page", "Second page of five books", books_page(2, 5)),
        entry("avg-price-by-genre", "Average price per genre", average_price_by_genre()),
        entry("top-author", "Author with the most books", author_with_most_books()),
        entry("books-per-decade", "Number of books per publication decade", books_per_decade()),
        entry("index-title", "Index on title", title_index()),
        entry("index-author-year", "Compound index on author and published_year", author_year_index()),
        entry("explain-title", "Plan and stats for a lookup by title", explain_by_title("1984", stats)),
        entry(
            "explain-author-year",
            "Plan and stats for a lookup by author and year",
            explain_by_author_and_year("George Orwell", 1949, stats),
        ),
    ]
    .into_iter()
    .collect()
}

/// Looks up a catalog entry by name.
///
/// # Errors
/// Returns `MalformedQuery` naming the unknown entry.
pub fn find_entry(name: &str) -> Result<CatalogEntry, DbError> {
    catalog()?
        .into_iter()
        .find(|e| e.name == name)
        .ok_or_else(|| DbError::malformed(format!("no catalog entry named {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_lists_every_query_once() {
        let entries = catalog().unwrap();
        assert_eq!(entries.len(), 16);
        let names: HashSet<_> = entries.iter().map(|e| e.name).collect();
        assert_eq!(names.len(), entries.len());
        let kinds: Vec<_> = entries.iter().map(|e| e.request.kind().as_str()).collect();
        assert_eq!(&kinds[..5], ["find", "find", "find", "updateOne", "deleteOne"]);
        assert_eq!(&kinds[9..], ["aggregate", "aggregate", "aggregate", "createIndex", "createIndex", "explain", "explain"]);
    }

    #[test]
    fn find_entry_by_name() {
        assert_eq!(find_entry("top-author").unwrap().request, author_with_most_books().unwrap());
        assert!(find_entry("nope").is_err());
    }
}
