use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create datastore root '{0}'")]
    RootCreation(std::path::PathBuf, #[source] std::io::Error),

    #[error("I/O error accessing blob '{0}'")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to persist blob '{0}'")]
    Persist(String, #[source] std::io::Error),

    #[error("Failed to build archive for '{0}'")]
    Zip(String, #[source] zip::result::ZipError),

    #[error("Failed to serialize payload for '{0}'")]
    Serialize(String, #[source] serde_json::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
