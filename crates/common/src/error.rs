use thiserror::Error;

/// Error kinds surfaced by every Kelpie crate.
///
/// Mirrors the small tagged enum the rest of the system propagates through
/// callback/future results rather than exceptions.
#[derive(Debug, Error)]
pub enum Error {
    #[error("waiting for completion")]
    Waiting,

    #[error("not found")]
    NotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("communication error: {0}")]
    CommunicationError(String),

    #[error("fatal invariant violation: {0}")]
    Fatal(String),

    #[error("configuration error")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a foreign error that doesn't fit one of the tagged kinds.
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Internal(Box::new(err))
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Error::AlreadyExists(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::Unavailable(msg.into())
    }

    pub fn communication(msg: impl Into<String>) -> Self {
        Error::CommunicationError(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Error::Fatal(msg.into())
    }
}
