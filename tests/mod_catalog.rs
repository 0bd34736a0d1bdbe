use bson::{Bson, Document as BsonDocument, doc};
use booklite::Database;
use booklite::book::Book;
use booklite::catalog::{
    self, AuthorCount, DecadeCount, GenreAverage, Operation, OperationKind, Request, Response, decode_rows,
};
use booklite::errors::DbError;
use booklite::fixtures::sample_books;
use booklite::query::{DeleteReport, ExplainVerbosity, Filter, Order, UpdateDoc, UpdateReport};
use booklite::store::DocumentStore;

fn shelf() -> Database {
    let db = Database::new();
    db.seed_books(&sample_books()).unwrap();
    db
}

fn titles(docs: &[BsonDocument]) -> Vec<&str> {
    docs.iter().map(|d| d.get_str("title").unwrap()).collect()
}

#[test]
fn genre_author_and_year_filters() {
    let db = shelf();
    let fiction = db.documents(&catalog::books_by_genre("Fiction").unwrap()).unwrap();
    assert_eq!(
        titles(&fiction),
        ["To Kill a Mockingbird", "The Great Gatsby", "The Catcher in the Rye", "The Alchemist", "The Midnight Library"]
    );
    assert!(fiction.iter().all(|d| d.get_str("genre").unwrap() == "Fiction"));

    let orwell = db.documents(&catalog::books_by_author("George Orwell").unwrap()).unwrap();
    assert_eq!(titles(&orwell), ["1984", "Animal Farm"]);

    let recent = db.documents(&catalog::books_published_after(1950).unwrap()).unwrap();
    assert_eq!(recent.len(), 6);
    assert!(recent.iter().all(|d| d.get_i32("published_year").unwrap() > 1950));
}

#[test]
fn in_stock_projection_has_exactly_the_listed_fields() {
    let db = shelf();
    let docs = db.documents(&catalog::in_stock_published_after(2010).unwrap()).unwrap();
    assert_eq!(
        docs,
        vec![
            doc! {"title": "The Night Circus", "author": "Erin Morgenstern", "price": 13.99},
            doc! {"title": "The Midnight Library", "author": "Matt Haig", "price": 16.99},
        ]
    );
}

#[test]
fn price_sorts_are_reverses_of_each_other() {
    let db = shelf();
    let asc = db.documents(&catalog::books_sorted_by_price(Order::Asc).unwrap()).unwrap();
    let desc = db.documents(&catalog::books_sorted_by_price(Order::Desc).unwrap()).unwrap();
    let prices = |docs: &[BsonDocument]| docs.iter().map(|d| d.get_f64("price").unwrap()).collect::<Vec<_>>();
    let mut reversed = prices(&desc);
    reversed.reverse();
    assert_eq!(prices(&asc), reversed);
    assert_eq!(asc[0].get_str("title").unwrap(), "Pride and Prejudice");
    assert_eq!(desc[0].get_str("title").unwrap(), "The Lord of the Rings");
    assert!(asc.iter().all(|d| d.get("_id").is_none() && d.len() == 3));
}

#[test]
fn second_page_is_positions_five_to_nine() {
    let db = shelf();
    let page = db.documents(&catalog::books_page(2, 5).unwrap()).unwrap();
    let expected: Vec<String> = sample_books()[5..10].iter().map(|b| b.title.clone()).collect();
    assert_eq!(titles(&page), expected);
    let last = db.documents(&catalog::books_page(3, 5).unwrap()).unwrap();
    assert_eq!(last.len(), 2);
    assert!(db.documents(&catalog::books_page(4, 5).unwrap()).unwrap().is_empty());
}

#[test]
fn update_price_touches_only_the_first_match_and_is_idempotent() {
    let db = shelf();
    db.seed_books(&[Book::new("1984", "Someone Else", "Parody", 2001, 3.0, true)]).unwrap();
    let before = db.all_books().unwrap();
    let req = catalog::set_price_by_title("1984", 15.99).unwrap();

    assert_eq!(db.run(&req).unwrap(), Response::Updated(UpdateReport { matched: 1, modified: 1 }));
    let after = db.all_books().unwrap();
    assert_eq!(after[1].price, 15.99);
    assert_eq!(after[12].price, 3.0);
    for (i, (a, b)) in before.iter().zip(&after).enumerate() {
        if i != 1 {
            assert_eq!(a, b);
        } else {
            assert_eq!(Book { price: 15.99, ..a.clone() }, *b);
        }
    }

    assert_eq!(db.run(&req).unwrap(), Response::Updated(UpdateReport { matched: 1, modified: 0 }));
    assert_eq!(db.all_books().unwrap(), after);
}

#[test]
fn update_without_match_is_a_no_op() {
    let db = shelf();
    let before = db.all_books().unwrap();
    let r = db.run(&catalog::set_price_by_title("Dune", 1.0).unwrap()).unwrap();
    assert_eq!(r, Response::Updated(UpdateReport::default()));
    assert_eq!(db.all_books().unwrap(), before);
}

#[test]
fn updates_cannot_break_book_records() {
    let db = shelf();
    let update = |update: UpdateDoc| {
        let op = Operation::UpdateOne { filter: Filter::eq("title", "1984"), update };
        db.run(&Request::new("books", op))
    };
    let cut = UpdateDoc { inc: vec![("price".into(), -100.0)], ..UpdateDoc::default() };
    assert!(matches!(update(cut), Err(DbError::MalformedQuery(_))));
    let drop_price = UpdateDoc { unset: vec!["price".into()], ..UpdateDoc::default() };
    assert!(matches!(update(drop_price), Err(DbError::MalformedQuery(_))));
    assert!(matches!(update(UpdateDoc::set("price.amount", 3)), Err(DbError::MalformedQuery(_))));

    let books = db.all_books().unwrap();
    assert!(books.iter().all(|b| b.validate().is_ok()));
    assert_eq!(books.iter().find(|b| b.title == "1984").unwrap().price, 10.99);

    let next_year = UpdateDoc { inc: vec![("published_year".into(), 1.0)], ..UpdateDoc::default() };
    assert_eq!(update(next_year).unwrap(), Response::Updated(UpdateReport { matched: 1, modified: 1 }));
    let found = db.documents(&catalog::books_by_author("George Orwell").unwrap()).unwrap();
    assert_eq!(found[0].get("published_year"), Some(&Bson::Int32(1950)));
}

#[test]
fn delete_removes_one_match_then_nothing() {
    let db = shelf();
    db.seed_books(&[Book::new("The Hobbit", "J.R.R. Tolkien", "Fantasy", 1966, 12.0, true)]).unwrap();
    let req = catalog::delete_by_title("The Hobbit").unwrap();

    assert_eq!(db.run(&req).unwrap(), Response::Deleted(DeleteReport { deleted: 1 }));
    let left = db.all_books().unwrap();
    assert_eq!(left.len(), 12);
    let hobbits: Vec<_> = left.iter().filter(|b| b.title == "The Hobbit").collect();
    assert_eq!(hobbits.len(), 1);
    assert_eq!(hobbits[0].published_year, 1966);

    assert_eq!(db.run(&req).unwrap(), Response::Deleted(DeleteReport { deleted: 1 }));
    let before = db.all_books().unwrap();
    assert_eq!(db.run(&req).unwrap(), Response::Deleted(DeleteReport::default()));
    assert_eq!(db.all_books().unwrap(), before);
}

#[test]
fn aggregations_over_the_sample_shelf() {
    let db = shelf();
    let averages: Vec<GenreAverage> =
        decode_rows(&db.documents(&catalog::average_price_by_genre().unwrap()).unwrap()).unwrap();
    let genres: Vec<_> = averages.iter().map(|g| g.genre.as_str()).collect();
    assert_eq!(genres, ["Fiction", "Dystopian", "Romance", "Fantasy", "Political Satire"]);
    let fantasy = averages.iter().find(|g| g.genre == "Fantasy").unwrap();
    assert!((fantasy.average_price.unwrap() - (14.99 + 19.99 + 13.99) / 3.0).abs() < 1e-9);

    let top: Vec<AuthorCount> =
        decode_rows(&db.documents(&catalog::author_with_most_books().unwrap()).unwrap()).unwrap();
    assert_eq!(top, vec![AuthorCount { author: "George Orwell".into(), book_count: 2 }]);

    let decades: Vec<DecadeCount> =
        decode_rows(&db.documents(&catalog::books_per_decade().unwrap()).unwrap()).unwrap();
    let labels: Vec<(&str, u64)> = decades.iter().map(|d| (d.decade.as_str(), d.count)).collect();
    assert_eq!(
        labels,
        [
            ("1810s", 1),
            ("1920s", 1),
            ("1930s", 2),
            ("1940s", 2),
            ("1950s", 2),
            ("1960s", 1),
            ("1980s", 1),
            ("2010s", 1),
            ("2020s", 1),
        ]
    );
}

#[test]
fn every_entry_runs_in_order() {
    let db = shelf();
    for entry in catalog::catalog().unwrap() {
        let response = db.run(&entry.request).unwrap_or_else(|e| panic!("{}: {e}", entry.name));
        match entry.request.kind() {
            OperationKind::Find | OperationKind::Aggregate => assert!(response.documents().is_some()),
            OperationKind::UpdateOne => assert!(matches!(response, Response::Updated(_))),
            OperationKind::DeleteOne => assert!(matches!(response, Response::Deleted(_))),
            OperationKind::CreateIndex => assert!(matches!(response, Response::IndexCreated { .. })),
            OperationKind::Explain => assert!(matches!(response, Response::Explain(_))),
        }
    }
    let names: Vec<String> = db.books().list_indexes().iter().map(|s| s.name()).collect();
    assert_eq!(names, ["title_1", "author_1_published_year_1"]);
}

#[test]
fn requests_render_as_commands_and_shell_calls() {
    let find = catalog::in_stock_published_after(2010).unwrap();
    assert_eq!(
        find.to_command(),
        doc! {
            "find": "books",
            "filter": {"in_stock": true, "published_year": {"$gt": 2010}},
            "projection": {"title": 1, "author": 1, "price": 1, "_id": 0},
        }
    );
    let update = catalog::set_price_by_title("1984", 15.99).unwrap();
    assert_eq!(
        update.to_command(),
        doc! {
            "update": "books",
            "updates": [{"q": {"title": "1984"}, "u": {"$set": {"price": 15.99}}, "multi": false}],
        }
    );
    let page = catalog::books_page(2, 5).unwrap();
    assert_eq!(
        page.to_shell().unwrap(),
        r#"db.books.find({}, {"title":1,"author":1,"price":1,"_id":0}).skip(5).limit(5)"#
    );
    let explain = catalog::explain_by_title("1984", ExplainVerbosity::ExecutionStats).unwrap();
    assert_eq!(explain.to_shell().unwrap(), r#"db.books.find({"title":"1984"}).explain("executionStats")"#);
    assert_eq!(
        catalog::title_index().unwrap().to_command().get_array("indexes").unwrap()[0],
        Bson::Document(doc! {"key": {"title": 1}, "name": "title_1"})
    );
}
