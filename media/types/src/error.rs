/*!
    Error types shared by every backend crate.
*/

use thiserror::Error;

/**
    Error type for backend operations (probe, decode, encode, mux).
*/
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file not found, permission denied, disk full)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Codec error (decoder or encoder failure)
    #[error("codec error: {message}")]
    Codec { message: String },
    /// Invalid data (malformed input)
    #[error("invalid data: {message}")]
    InvalidData { message: String },
    /// Unsupported format (valid but not handled)
    #[error("unsupported format: {message}")]
    UnsupportedFormat { message: String },
    /// A stream or track index that does not exist
    #[error("no such stream: {index}")]
    NoSuchStream { index: usize },
}

impl Error {
    /**
        Create a codec error with the given message.
    */
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /**
        Create an invalid data error with the given message.
    */
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /**
        Create an unsupported format error with the given message.
    */
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }
}

/**
    Result type alias for backend operations.
*/
pub type Result<T> = std::result::Result<T, Error>;
