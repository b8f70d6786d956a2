use thiserror::Error;

/// Fatal errors that can escape the public facade.
///
/// Per-chunk decode problems (bad patient record, unreadable contour, a
/// pixel buffer that won't reshape, …) never become an `Error` — they are
/// logged and the offending chunk is skipped. See the module docs on
/// [`crate::chunk`] for that half of the error story.
#[derive(Debug, Error)]
pub enum Error {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed header: {0}")]
    MalformedHeader(String),
}

pub type Result<T> = std::result::Result<T, Error>;
