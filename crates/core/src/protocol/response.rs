use std::collections::HashSet;

use crate::error::{ParseErrorKind, RtspError};
use crate::protocol::request::Method;

/// An RTSP response (RFC 2326 §7).
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 2\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// The connection parses the head with [`parse_head`](Self::parse_head) and
/// reads `Content-Length` bytes of body separately.
#[derive(Debug, Clone)]
#[must_use]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// 200 OK: success (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Parse a status line and headers, stopping at the blank line.
    pub fn parse_head(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let status_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyMessage,
        })?;

        let invalid_status = || RtspError::Parse {
            kind: ParseErrorKind::InvalidStatusLine,
        };
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().ok_or_else(invalid_status)?;
        if !version.starts_with("RTSP/") {
            return Err(invalid_status());
        }
        let status_code: u16 = parts
            .next()
            .and_then(|code| code.trim().parse().ok())
            .ok_or_else(invalid_status)?;
        let status_text = parts.next().unwrap_or("").trim();

        let mut response = Self::new(status_code, status_text);
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            response = response.add_header(name.trim(), value.trim());
        }

        Ok(response)
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
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

    pub fn content_length(&self) -> usize {
        self.get_header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn content_base(&self) -> Option<&str> {
        self.get_header("Content-Base")
            .or_else(|| self.get_header("Content-Location"))
    }

    /// Session id from the `Session` header, without the `;timeout=` suffix
    /// (RFC 2326 §12.37). Empty ids are reported as absent.
    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim())
            .filter(|id| !id.is_empty())
    }

    /// Session timeout in seconds, if the server advertised one.
    pub fn session_timeout(&self) -> Option<u64> {
        self.get_header("Session")?
            .split(';')
            .skip(1)
            .find_map(|p| p.trim().strip_prefix("timeout="))
            .and_then(|t| t.trim().parse().ok())
    }

    /// Methods listed in the `Public` header of an OPTIONS response.
    /// Unknown method names are ignored.
    pub fn public_methods(&self) -> HashSet<Method> {
        self.get_header("Public")
            .map(|list| list.split(',').filter_map(|m| m.parse().ok()).collect())
            .unwrap_or_default()
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically.
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            response.push_str("\r\n");
            response.push_str(body);
        } else {
            response.push_str("\r\n");
        }
        response
    }
}
