use std::fmt;
use std::io;

#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
    NotFound,
    /// Returned by backends (e.g. Redis) that cannot implement an ordered range scan. Any code
    /// path relying on `Find` must fall back to `EntityStore::list_entity_ids` instead.
    Unsupported(&'static str),
    Backend(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "storage io error: {}", e),
            StorageError::NotFound => write!(f, "not found"),
            StorageError::Unsupported(op) => write!(f, "operation not supported: {}", op),
            StorageError::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// True for errors that indicate the underlying connection is gone and should be reconnected,
/// as opposed to application-level errors like `NotFound`.
pub fn is_connection_error(err: &StorageError) -> bool {
    matches!(
        err,
        StorageError::Io(e) if matches!(e.kind(), io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe)
    )
}
