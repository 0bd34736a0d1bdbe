//! Sample data: a fixed shelf of well-known books and a seeded random generator.

use crate::book::Book;
use fake::Fake;
use fake::faker::lorem::en::Words;
use fake::faker::name::en::Name;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const GENRES: [&str; 6] = ["Fiction", "Dystopian", "Fantasy", "Romance", "Mystery", "Science Fiction"];

/// Twelve books in a fixed order. George Orwell and J.R.R. Tolkien have two books each.
#[must_use]
pub fn sample_books() -> Vec<Book> {
    vec![
        Book::new("To Kill a Mockingbird", "Harper Lee", "Fiction", 1960, 12.99, true),
        Book::new("1984", "George Orwell", "Dystopian", 1949, 10.99, true),
        Book::new("Pride and Prejudice", "Jane Austen", "Romance", 1813, 7.99, true),
        Book::new("The Great Gatsby", "F. Scott Fitzgerald", "Fiction", 1925, 9.99, true),
        Book::new("Brave New World", "Aldous Huxley", "Dystopian", 1932, 11.50, false),
        Book::new("The Hobbit", "J.R.R. Tolkien", "Fantasy", 1937, 14.99, true),
        Book::new("The Catcher in the Rye", "J.D. Salinger", "Fiction", 1951, 8.99, false),
        Book::new("Animal Farm", "George Orwell", "Political Satire", 1945, 8.50, false),
        Book::new("The Alchemist", "Paulo Coelho", "Fiction", 1988, 10.99, true),
        Book::new("The Lord of the Rings", "J.R.R. Tolkien", "Fantasy", 1954, 19.99, true),
        Book::new("The Night Circus", "Erin Morgenstern", "Fantasy", 2011, 13.99, true),
        Book::new("The Midnight Library", "Matt Haig", "Fiction", 2020, 16.99, true),
    ]
}

fn title_case(words: &[String]) -> String {
    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |c| c.to_uppercase().chain(chars).collect())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `count` plausible books. The same `seed` always yields the same books.
#[must_use]
pub fn random_books(count: usize, seed: u64) -> Vec<Book> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let words: Vec<String> = Words(1..4).fake_with_rng(&mut rng);
            let author: String = Name().fake_with_rng(&mut rng);
            let genre = GENRES[rng.random_range(0..GENRES.len())];
            let year = rng.random_range(1800..=2024);
            let cents: u32 = rng.random_range(299..=4999);
            Book::new(title_case(&words), author, genre, year, f64::from(cents) / 100.0, rng.random_bool(0.75))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_books_are_valid() {
        let books = sample_books();
        assert_eq!(books.len(), 12);
        assert!(books.iter().all(|b| b.validate().is_ok()));
    }

    #[test]
    fn random_books_are_reproducible_and_valid() {
        let a = random_books(25, 7);
        assert_eq!(a, random_books(25, 7));
        assert_ne!(a, random_books(25, 8));
        assert!(a.iter().all(|b| b.validate().is_ok()));
    }
}
