use std::fmt;
use std::str::FromStr;

use crate::error::{ParseErrorKind, RtspError};

/// RTSP methods (RFC 2326 §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Describe,
    Announce,
    Setup,
    Play,
    Pause,
    Record,
    Redirect,
    TearDown,
    GetParameter,
    SetParameter,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Describe => "DESCRIBE",
            Self::Announce => "ANNOUNCE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Record => "RECORD",
            Self::Redirect => "REDIRECT",
            Self::TearDown => "TEARDOWN",
            Self::GetParameter => "GET_PARAMETER",
            Self::SetParameter => "SET_PARAMETER",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RtspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = match s.trim().to_ascii_uppercase().as_str() {
            "OPTIONS" => Self::Options,
            "DESCRIBE" => Self::Describe,
            "ANNOUNCE" => Self::Announce,
            "SETUP" => Self::Setup,
            "PLAY" => Self::Play,
            "PAUSE" => Self::Pause,
            "RECORD" => Self::Record,
            "REDIRECT" => Self::Redirect,
            "TEARDOWN" => Self::TearDown,
            "GET_PARAMETER" => Self::GetParameter,
            "SET_PARAMETER" => Self::SetParameter,
            _ => {
                return Err(RtspError::Parse {
                    kind: ParseErrorKind::InvalidRequestLine,
                });
            }
        };
        Ok(method)
    }
}

/// An RTSP request (RFC 2326 §6).
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Built by the session with [`add_header`](Self::add_header) and friends;
/// `CSeq` and `Authorization` are added by the connection at send time.
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[derive(Debug, Clone)]
#[must_use]
pub struct RtspRequest {
    pub method: Method,
    /// Request-URI (e.g. `rtsp://host:port/stream/track1`).
    pub uri: String,
    /// Headers as ordered (name, value) pairs.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspRequest {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Replace a header if present, otherwise append it.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn with_session(self, session_id: &str) -> Self {
        self.add_header("Session", session_id)
    }

    pub fn with_body(mut self, content_type: &str, body: String) -> Self {
        self.set_header("Content-Type", content_type);
        self.body = Some(body);
        self
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq").and_then(|v| v.trim().parse().ok())
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// `Content-Length` is appended automatically when a body is present
    /// (RFC 2326 §12.14).
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);

        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }

        match &self.body {
            Some(body) => {
                request.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
                request.push_str(body);
            }
            None => request.push_str("\r\n"),
        }
        request
    }

    /// Parse a request head (request line and headers).
    ///
    /// Used by test peers that play the server side of an exchange.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyMessage,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method: Method = parts[0].parse()?;
        let mut request = Self::new(method, parts[1]);

        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            request = request.add_header(name.trim(), value.trim());
        }

        Ok(request)
    }
}
