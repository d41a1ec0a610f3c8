use crate::config::ConfigError;
use thiserror::Error;

/// Errors surfaced to console callers
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// The registry could not be reached at all
    #[error("Registry unreachable: {0}")]
    Unreachable(String),

    /// The registry answered with a non-success status
    #[error("Registry rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode registry response: {0}")]
    Decode(String),

    #[error("Failed to read local file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ConsoleError {
    /// Only transport failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConsoleError::Unreachable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ConsoleError::Rejected { status: 404, .. })
    }

    /// Status code for rejections
    pub fn status(&self) -> Option<u16> {
        match self {
            ConsoleError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ConsoleError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ConsoleError::Decode(error.to_string())
        } else {
            ConsoleError::Unreachable(error.to_string())
        }
    }
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;
