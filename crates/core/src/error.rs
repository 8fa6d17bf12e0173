//! Error types for the RTSP client library.

use std::fmt;

/// Errors raised below the session layer.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse), [`InvalidUri`](Self::InvalidUri),
///   [`UnsupportedAuthentication`](Self::UnsupportedAuthentication).
/// - **Transport**: [`Io`](Self::Io), [`NotConnected`](Self::NotConnected),
///   [`ConnectionClosed`](Self::ConnectionClosed), [`Timeout`](Self::Timeout).
///
/// The session state machine never lets these escape on their own: they are
/// wrapped into a [`ClientError`] carrying a [`ClientErrorCode`].
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP message or an SDP body.
    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The URI is not an `rtsp://` URI with a usable host.
    #[error("invalid RTSP URI: {0}")]
    InvalidUri(String),

    /// A request was issued before the connection was opened.
    #[error("connection not opened")]
    NotConnected,

    /// The peer closed the control connection (or it was aborted locally).
    #[error("connection closed")]
    ConnectionClosed,

    /// No response arrived within the receive timeout.
    #[error("timed out waiting for {method} response")]
    Timeout { method: String },

    /// The server asked for an authentication scheme we do not implement.
    #[error("unsupported authentication scheme: {0}")]
    UnsupportedAuthentication(String),
}

/// Specific kind of parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no start line).
    EmptyMessage,
    /// Response status line was not `RTSP/1.0 <code> <reason>`.
    InvalidStatusLine,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The SDP body has no version line or no media description.
    InvalidSdp,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidSdp => write!(f, "invalid session description"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;

/// Classification of a failed session operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientErrorCode {
    /// Opening the control connection or configuring its timeouts failed.
    ConnectionFailed,
    /// OPTIONS did not succeed.
    GetOptionsFailed,
    /// DESCRIBE failed, the SDP could not be parsed, or no track matched.
    DescribeFailed,
    /// SETUP failed, the transport could not start, or no session id was issued.
    SetupFailed,
    /// PLAY failed after a successful SETUP.
    PlayFailed,
    /// The keep-alive request did not succeed.
    KeepAliveFailed,
    /// TEARDOWN failed while closing. Reported, never fatal.
    TearDownFailed,
}

impl fmt::Display for ClientErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionFailed => "connection failed",
            Self::GetOptionsFailed => "get options failed",
            Self::DescribeFailed => "describe failed",
            Self::SetupFailed => "setup failed",
            Self::PlayFailed => "play failed",
            Self::KeepAliveFailed => "keep-alive failed",
            Self::TearDownFailed => "teardown failed",
        };
        f.write_str(name)
    }
}

/// A classified session failure.
///
/// Returned by [`ClientSession::open`](crate::session::ClientSession::open)
/// and [`ClientSession::ping`](crate::session::ClientSession::ping), and
/// delivered to observers as [`SessionEvent::Error`](crate::session::SessionEvent::Error).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ClientError {
    pub code: ClientErrorCode,
    pub message: String,
    /// Rendered lower-level cause, if any.
    pub cause: Option<String>,
}

impl ClientError {
    pub fn new(code: ClientErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the lower-level error that triggered this failure.
    pub fn caused_by(mut self, cause: &RtspError) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}
