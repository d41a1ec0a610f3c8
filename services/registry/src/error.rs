use thiserror::Error;

/// Errors surfaced by the record store and asset manager
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A required field is missing or an upload is unusable. Raised before any mutation.
    #[error("{0}")]
    Validation(String),

    #[error("User already exists.")]
    DuplicateKey,

    #[error("User not found.")]
    NotFound,

    #[error("Asset storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl RegistryError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// True for failures of the underlying stores rather than of the request
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Database(_))
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::DuplicateKey,
            _ => Self::Database(error),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
