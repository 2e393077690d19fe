use thiserror::Error;

pub type LibraryResult<T> = std::result::Result<T, LibraryError>;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("caption library lock poisoned")]
    Poisoned,
}
