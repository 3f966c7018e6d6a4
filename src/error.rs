use std::fmt;

/// Any failure the loader can report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Usage(#[from] UsageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The playlist request failed at the network level or returned a non-2xx status.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("HLS playlist request error at URL {uri}: {reason}")]
pub struct TransportError {
    pub uri: String,
    pub status: Option<u16>,
    pub body: Option<String>,
    pub reason: String,
}

impl TransportError {
    pub fn network(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            status: None,
            body: None,
            reason: reason.into(),
        }
    }

    pub fn http_status(uri: impl Into<String>, status: u16, body: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            status: Some(status),
            body,
            reason: format!("HTTP {status}"),
        }
    }
}

/// The response arrived but did not contain a usable manifest.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to parse playlist {uri}: {reason}")]
pub struct ProtocolError {
    pub uri: String,
    /// Status of the response that carried the unusable manifest.
    pub status: Option<u16>,
    pub reason: String,
}

impl ProtocolError {
    pub fn new(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            status: None,
            reason: reason.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// The caller asked for something the loader cannot do in its current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("unknown playlist URI `{uri}`")]
    UnknownPlaylist { uri: String },

    #[error("cannot {operation} before a master playlist is loaded")]
    NoMaster { operation: &'static str },

    #[error("no media playlist is active")]
    NoActivePlaylist,

    #[error("the master playlist is already loaded or loading")]
    AlreadyStarted,

    #[error("the loader has been disposed")]
    Disposed,
}

/// How the playback layer should react to a surfaced error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The caller may retry or pick another rendition.
    Recoverable,
    /// The caller should abandon this rendition or stream.
    Fatal,
}

impl Severity {
    /// Server errors and failures without any HTTP status are fatal.
    pub fn from_status(status: Option<u16>) -> Severity {
        match status {
            Some(status) if status < 500 => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Recoverable => write!(f, "recoverable"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

impl Error {
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport(e) => e.status,
            Error::Protocol(e) => e.status,
            Error::Usage(_) => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Error::Transport(e) => Some(&e.uri),
            Error::Protocol(e) => Some(&e.uri),
            Error::Usage(UsageError::UnknownPlaylist { uri }) => Some(uri),
            Error::Usage(_) => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Error::Usage(_) => Severity::Recoverable,
            _ => Severity::from_status(self.status()),
        }
    }

    pub fn is_usage_error(&self) -> bool {
        matches!(self, Error::Usage(_))
    }
}

/// Error details carried by [`LoaderEvent::Error`](crate::events::LoaderEvent::Error).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    /// The rendition (or master) URI whose request failed.
    pub uri: String,
    pub status: Option<u16>,
    pub message: String,
    pub body: Option<String>,
    pub severity: Severity,
}

impl ErrorInfo {
    pub fn new(uri: impl Into<String>, error: &Error) -> ErrorInfo {
        let body = match error {
            Error::Transport(e) => e.body.clone(),
            _ => None,
        };
        ErrorInfo {
            uri: uri.into(),
            status: error.status(),
            message: error.to_string(),
            body,
            severity: error.severity(),
        }
    }
}
