use crate::chunk::CodecError;
use crate::record::RecordId;
use crate::script::LoaderError;

/// Errors surfaced by the archive engine.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("index store error: {0}")]
    Store(#[from] sled::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("collection was already loaded")]
    AlreadyLoaded,

    #[error("duplicate record id {0}")]
    DuplicateId(RecordId),

    #[error("record ids start at 1; got {0}")]
    InvalidRecordId(RecordId),

    #[error("invalid site config: {0}")]
    InvalidConfig(String),

    #[error("search index not ready: {processed} of {target:?} records processed")]
    SearchNotReady {
        processed: RecordId,
        target: Option<RecordId>,
    },
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
