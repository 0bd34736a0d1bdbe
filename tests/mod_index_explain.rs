use bson::{Bson, Document as BsonDocument, doc};
use booklite::Database;
use booklite::catalog::{self, Response};
use booklite::fixtures::{random_books, sample_books};
use booklite::query::ExplainVerbosity;
use booklite::store::DocumentStore;

fn shelf() -> Database {
    let db = Database::new();
    db.seed_books(&sample_books()).unwrap();
    db.seed_books(&random_books(200, 7)).unwrap();
    db
}

fn explain(db: &Database, req: &catalog::Request) -> BsonDocument {
    match db.run(req).unwrap() {
        Response::Explain(plan) => plan,
        other => panic!("expected a plan, got {other:?}"),
    }
}

fn winning_plan(plan: &BsonDocument) -> &BsonDocument {
    plan.get_document("queryPlanner").unwrap().get_document("winningPlan").unwrap()
}

#[test]
fn test_indexes_do_not_change_results() {
    let db = shelf();
    let queries = [
        catalog::books_by_author("J.R.R. Tolkien").unwrap(),
        catalog::books_by_genre("Fantasy").unwrap(),
        catalog::books_published_after(1950).unwrap(),
        catalog::in_stock_published_after(2000).unwrap(),
    ];
    let before: Vec<Vec<BsonDocument>> = queries.iter().map(|q| db.documents(q).unwrap()).collect();
    db.run(&catalog::title_index().unwrap()).unwrap();
    db.run(&catalog::author_year_index().unwrap()).unwrap();
    let after: Vec<Vec<BsonDocument>> = queries.iter().map(|q| db.documents(q).unwrap()).collect();
    assert_eq!(before, after);
}

#[test]
fn test_create_index_is_idempotent() {
    let db = shelf();
    let req = catalog::title_index().unwrap();
    assert_eq!(db.run(&req).unwrap(), Response::IndexCreated { name: "title_1".into(), created: true });
    assert_eq!(db.run(&req).unwrap(), Response::IndexCreated { name: "title_1".into(), created: false });
    assert_eq!(db.books().list_indexes().len(), 1);
}

#[test]
fn test_explain_title_uses_title_index() {
    let db = shelf();
    let req = catalog::explain_by_title("1984", ExplainVerbosity::ExecutionStats).unwrap();
    let plan = explain(&db, &req);
    assert_eq!(winning_plan(&plan).get_str("stage").unwrap(), "COLLSCAN");

    db.run(&catalog::title_index().unwrap()).unwrap();
    let plan = explain(&db, &req);
    let win = winning_plan(&plan);
    assert_eq!(win.get_str("stage").unwrap(), "FETCH");
    let ix = win.get_document("inputStage").unwrap();
    assert_eq!(ix.get_str("stage").unwrap(), "IXSCAN");
    assert_eq!(ix.get_str("indexName").unwrap(), "title_1");
    assert_eq!(ix.get_document("keyPattern").unwrap(), &doc! {"title": 1});

    let stats = plan.get_document("executionStats").unwrap();
    assert_eq!(stats.get("nReturned"), Some(&Bson::Int64(1)));
    assert_eq!(stats.get("totalDocsExamined"), Some(&Bson::Int64(1)));
}

#[test]
fn test_explain_author_year_uses_compound_index() {
    let db = shelf();
    db.run(&catalog::title_index().unwrap()).unwrap();
    db.run(&catalog::author_year_index().unwrap()).unwrap();
    let req = catalog::explain_by_author_and_year("George Orwell", 1949, ExplainVerbosity::QueryPlanner).unwrap();
    let plan = explain(&db, &req);
    assert!(plan.get("executionStats").is_none());
    let ix = winning_plan(&plan).get_document("inputStage").unwrap();
    assert_eq!(ix.get_str("indexName").unwrap(), "author_1_published_year_1");
    assert_eq!(
        plan.get_document("queryPlanner").unwrap().get_document("parsedQuery").unwrap(),
        &doc! {"author": "George Orwell", "published_year": 1949}
    );
}

#[test]
fn test_explain_does_not_mutate() {
    let db = shelf();
    db.run(&catalog::author_year_index().unwrap()).unwrap();
    let before = db.all_books().unwrap();
    let req = catalog::explain_by_author_and_year("George Orwell", 1949, ExplainVerbosity::AllPlansExecution).unwrap();
    let plan = explain(&db, &req);
    assert!(plan.get_document("executionStats").unwrap().get_array("allPlansExecution").is_ok());
    assert_eq!(db.all_books().unwrap(), before);
    assert_eq!(db.books().list_indexes().len(), 1);
}

#[test]
fn test_index_follows_updates_and_deletes() {
    let db = shelf();
    db.run(&catalog::title_index().unwrap()).unwrap();
    db.run(&catalog::set_price_by_title("1984", 15.99).unwrap()).unwrap();
    let explain_only = catalog::explain_by_title("1984", ExplainVerbosity::QueryPlanner).unwrap();
    assert!(db.documents(&explain_only).is_err());

    let found = db
        .documents(&catalog::books_by_author("George Orwell").unwrap())
        .unwrap();
    assert_eq!(found[0].get_f64("price").unwrap(), 15.99);

    db.run(&catalog::delete_by_title("1984").unwrap()).unwrap();
    let req = catalog::explain_by_title("1984", ExplainVerbosity::ExecutionStats).unwrap();
    let plan = explain(&db, &req);
    let stats = plan.get_document("executionStats").unwrap();
    assert_eq!(stats.get("nReturned"), Some(&Bson::Int64(0)));
    assert_eq!(stats.get("totalKeysExamined"), Some(&Bson::Int64(0)));
}
