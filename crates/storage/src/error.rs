use opendal::Error as OpenDalError;
use thiserror::Error;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    OpenDalError(#[from] OpenDalError),

    #[error("Storage io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Path error")]
    PathError,

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
}
