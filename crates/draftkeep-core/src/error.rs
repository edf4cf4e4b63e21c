use thiserror::Error;

/// Failures of a [`DocumentStore`](crate::DocumentStore) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    /// A stored payload or record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Document {0} does not exist")]
    DocumentNotFound(String),

    #[error("Invalid document id: {0:?}")]
    InvalidId(String),
}
