use crate::catalog::{Request, Response};
use crate::errors::DbError;
use bson::Document as BsonDocument;

/// Anything that can answer catalog requests. Each call is one atomic request/response.
pub trait DocumentStore {
    /// # Errors
    /// `MalformedQuery` for requests the store cannot evaluate, including updates that would
    /// break a book record. A missing collection behaves as an empty one.
    fn execute(&self, request: &Request) -> Result<Response, DbError>;

    /// Runs a read and returns its documents.
    ///
    /// # Errors
    /// As [`DocumentStore::execute`], plus `MalformedQuery` when the request does not return documents.
    fn documents(&self, request: &Request) -> Result<Vec<BsonDocument>, DbError> {
        self.execute(request)?.into_documents().ok_or_else(|| {
            DbError::malformed(format!("{} does not return documents", request.kind()))
        })
    }
}
