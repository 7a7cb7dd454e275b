//! Error handling for the modem statistics logger.

/// A specialized `Result` type for logger operations.
pub type Result<T> = std::result::Result<T, LoggerError>;

/// The main error type for logger operations.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// A required run parameter could not be resolved
    #[error("Configuration error: {0}")]
    Config(String),

    /// Login rejected or modem unreachable
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Network failure or bad response on an established session
    #[error("Transport error: {0}")]
    Transport(String),

    /// The modem no longer accepts the session cookie
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// A statistic could not be located or converted
    #[error("Failed to parse field '{field}': {reason}")]
    Parse {
        /// Label of the offending field
        field: &'static str,
        /// What went wrong
        reason: String,
    },

    /// Output file could not be opened or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoggerError {
    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new authentication error
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a new transport error
    pub fn transport_error(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new session expiry error
    pub fn session_expired(msg: impl Into<String>) -> Self {
        Self::SessionExpired(msg.into())
    }

    /// Create a new parse error for the named field
    pub fn parse_error(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            field,
            reason: reason.into(),
        }
    }

    /// Whether this error must end the run.
    ///
    /// Transport and parse failures only cost the current tick. An expired
    /// session is normally absorbed by a re-login, so if it ever reaches the
    /// scheduler it is treated like any other per-tick failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Auth(_) | Self::Io(_))
    }

    /// Inverse of [`LoggerError::is_fatal`].
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }
}

impl From<csv::Error> for LoggerError {
    fn from(err: csv::Error) -> Self {
        Self::Io(std::io::Error::from(err))
    }
}
