use crate::client::error::ClientError;
use crate::storage::error::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("Gave up on chunk '{chunk}' after {failures} consecutive failures")]
    RetriesExhausted {
        chunk: String,
        failures: u32,
        #[source]
        source: ClientError,
    },
}
