use std::fmt;

use crate::error::RtspError;

/// Default RTSP port (RFC 2326 §3.2).
pub const DEFAULT_PORT: u16 = 554;

/// A parsed `rtsp://` URI.
///
/// ```text
/// rtsp://[user[:password]@]host[:port][/path]
/// ```
///
/// [`Display`](fmt::Display) renders the URI without credentials, which is
/// the form sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspUri {
    pub host: String,
    pub port: u16,
    /// Path including the leading `/`, or empty.
    pub path: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl RtspUri {
    pub fn parse(uri: &str) -> crate::error::Result<Self> {
        let invalid = || RtspError::InvalidUri(uri.to_string());

        let after = uri
            .trim()
            .strip_prefix("rtsp://")
            .or_else(|| uri.trim().strip_prefix("RTSP://"))
            .ok_or_else(invalid)?;

        let (authority, path) = match after.find('/') {
            Some(slash) => (&after[..slash], &after[slash..]),
            None => (after, ""),
        };

        let (userinfo, host_port) = match authority.rfind('@') {
            Some(at) => (Some(&authority[..at]), &authority[at + 1..]),
            None => (None, authority),
        };

        let (username, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((u, p)) => (Some(u.to_string()), Some(p.to_string())),
                None => (Some(info.to_string()), None),
            },
            None => (None, None),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            // "[::1]" has colons but no port
            Some((h, p)) if !p.contains(']') => {
                (h, p.parse::<u16>().map_err(|_| invalid())?)
            }
            _ => (host_port, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
            username,
            password,
        })
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for RtspUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rtsp://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Resolve an SDP `a=control` value against a base URI (RFC 2326 §C.1.1).
///
/// Absolute controls are returned as-is, `*` means the base itself, and
/// anything else is appended to the base.
pub fn resolve_control(base: &str, control: &str) -> String {
    let control = control.trim();
    if control.is_empty() || control == "*" {
        return base.to_string();
    }
    if control.starts_with("rtsp://") || control.starts_with("rtsps://") {
        return control.to_string();
    }
    if base.ends_with('/') {
        format!("{}{}", base, control.trim_start_matches('/'))
    } else {
        format!("{}/{}", base, control.trim_start_matches('/'))
    }
}
