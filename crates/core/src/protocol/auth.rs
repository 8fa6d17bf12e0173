//! RTSP authentication (RFC 2326 §D.1, RFC 2617).
//!
//! The connection replays a request once when the server answers
//! `401 Unauthorized`, using the strongest challenge offered:
//!
//! ```text
//! WWW-Authenticate: Digest realm="IP Camera", nonce="a1b2c3", qop="auth"
//! WWW-Authenticate: Basic realm="IP Camera"
//! ```

use std::fmt;

use base64::prelude::{BASE64_STANDARD, Engine as _};
use md5::{Digest, Md5};

use crate::error::{Result, RtspError};
use crate::protocol::request::Method;

/// User name and password for the control connection.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Basic {
        realm: String,
    },
    Digest {
        realm: String,
        nonce: String,
        opaque: Option<String>,
        qop: Option<String>,
    },
}

impl Challenge {
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));
        let params = parse_params(rest);
        let param = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };

        if scheme.eq_ignore_ascii_case("basic") {
            Ok(Self::Basic {
                realm: param("realm").unwrap_or_default(),
            })
        } else if scheme.eq_ignore_ascii_case("digest") {
            if let Some(algorithm) = param("algorithm")
                && !algorithm.eq_ignore_ascii_case("md5")
            {
                return Err(RtspError::UnsupportedAuthentication(format!(
                    "Digest algorithm {algorithm}"
                )));
            }
            Ok(Self::Digest {
                realm: param("realm").unwrap_or_default(),
                nonce: param("nonce").unwrap_or_default(),
                opaque: param("opaque"),
                qop: param("qop"),
            })
        } else {
            Err(RtspError::UnsupportedAuthentication(scheme.to_string()))
        }
    }

    /// Pick the strongest supported challenge, preferring Digest over Basic.
    pub fn select<'a>(headers: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut fallback = None;
        let mut last_err = RtspError::UnsupportedAuthentication("none offered".to_string());
        for header in headers {
            match Self::parse(header) {
                Ok(c @ Self::Digest { .. }) => return Ok(c),
                Ok(c) => fallback = Some(c),
                Err(e) => last_err = e,
            }
        }
        fallback.ok_or(last_err)
    }

    /// `Authorization` header value for one request.
    ///
    /// `nonce_count` is the 1-based number of requests sent with this
    /// challenge's nonce. It only matters for Digest with `qop=auth`
    /// (RFC 2617 §3.2.2), where servers reject a repeated count as a replay.
    pub fn authorization(
        &self,
        credentials: &Credentials,
        method: Method,
        uri: &str,
        nonce_count: u32,
    ) -> String {
        match self {
            Self::Basic { .. } => {
                let token = format!("{}:{}", credentials.username, credentials.password);
                format!("Basic {}", BASE64_STANDARD.encode(token))
            }
            Self::Digest {
                realm,
                nonce,
                opaque,
                qop,
            } => {
                let ha1 = md5_hex(&format!(
                    "{}:{}:{}",
                    credentials.username, realm, credentials.password
                ));
                let ha2 = md5_hex(&format!("{}:{}", method, uri));

                let mut value = format!(
                    "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\"",
                    credentials.username, realm, nonce, uri
                );

                let auth_qop = qop
                    .as_deref()
                    .filter(|q| q.split(',').any(|v| v.trim() == "auth"));
                if auth_qop.is_some() {
                    let cnonce = format!("{:08x}", rand::random::<u32>());
                    let nc = format!("{nonce_count:08x}");
                    let response =
                        md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}"));
                    value.push_str(&format!(
                        ", qop=auth, nc={nc}, cnonce=\"{cnonce}\", response=\"{response}\""
                    ));
                } else {
                    let response = md5_hex(&format!("{ha1}:{nonce}:{ha2}"));
                    value.push_str(&format!(", response=\"{response}\""));
                }

                if let Some(opaque) = opaque {
                    value.push_str(&format!(", opaque=\"{opaque}\""));
                }
                value
            }
        }
    }
}

fn md5_hex(input: &str) -> String {
    Md5::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Split `k1="v, 1", k2=v2` into pairs, honouring quotes.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    let mut flush = |item: &str| {
        if let Some((k, v)) = item.split_once('=') {
            params.push((k.trim().to_string(), v.trim().trim_matches('"').to_string()));
        }
    };

    for ch in input.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                current.push(ch);
            }
            ',' if !quoted => {
                flush(&current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    flush(&current);
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_authorization() {
        let challenge = Challenge::parse("Basic realm=\"cam\"").unwrap();
        let value = challenge.authorization(
            &Credentials::new("Aladdin", "open sesame"),
            Method::Describe,
            "rtsp://cam/stream",
            1,
        );
        assert_eq!(value, "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }

    #[test]
    fn digest_without_qop() {
        // RFC 2069-style digest as sent by most cameras
        let challenge =
            Challenge::parse("Digest realm=\"testrealm@host.com\", nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\"")
                .unwrap();
        let value = challenge.authorization(
            &Credentials::new("Mufasa", "Circle Of Life"),
            Method::Describe,
            "rtsp://cam/stream",
            1,
        );
        let ha1 = md5_hex("Mufasa:testrealm@host.com:Circle Of Life");
        let ha2 = md5_hex("DESCRIBE:rtsp://cam/stream");
        let expected = md5_hex(&format!("{ha1}:dcd98b7102dd2f0e8b11d0f600bfb0c093:{ha2}"));
        assert!(value.starts_with("Digest username=\"Mufasa\""));
        assert!(value.contains(&format!("response=\"{expected}\"")));
        assert!(!value.contains("cnonce"));
    }

    #[test]
    fn digest_with_qop_and_opaque() {
        let challenge =
            Challenge::parse("Digest realm=\"r\", qop=\"auth,auth-int\", nonce=\"n\", opaque=\"o\"")
                .unwrap();
        let value = challenge.authorization(&Credentials::new("u", "p"), Method::Play, "rtsp://x", 1);
        assert!(value.contains("qop=auth"));
        assert!(value.contains("cnonce=\""));
        assert!(value.ends_with("opaque=\"o\""));
    }

    #[test]
    fn digest_nonce_count_is_hex_and_hashed() {
        let challenge = Challenge::parse("Digest realm=\"r\", qop=\"auth\", nonce=\"n\"").unwrap();
        let creds = Credentials::new("u", "p");
        let first = challenge.authorization(&creds, Method::Options, "rtsp://x", 1);
        let later = challenge.authorization(&creds, Method::Options, "rtsp://x", 26);
        assert!(first.contains("nc=00000001"));
        assert!(later.contains("nc=0000001a"));

        let param = |value: &str, name: &str| {
            parse_params(value.trim_start_matches("Digest "))
                .into_iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v)
                .unwrap()
        };
        let ha1 = md5_hex("u:r:p");
        let ha2 = md5_hex("OPTIONS:rtsp://x");
        let cnonce = param(&later, "cnonce");
        let expected = md5_hex(&format!("{ha1}:n:0000001a:{cnonce}:auth:{ha2}"));
        assert_eq!(param(&later, "response"), expected);
    }

    #[test]
    fn md5_known_vector() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn select_prefers_digest() {
        let c = Challenge::select(["Basic realm=\"a\"", "Digest realm=\"a\", nonce=\"n\""]).unwrap();
        assert!(matches!(c, Challenge::Digest { .. }));
        let c = Challenge::select(["Basic realm=\"a\""]).unwrap();
        assert!(matches!(c, Challenge::Basic { .. }));
    }

    #[test]
    fn unsupported_schemes() {
        assert!(Challenge::parse("Bearer token").is_err());
        assert!(Challenge::parse("Digest realm=\"r\", nonce=\"n\", algorithm=SHA-256").is_err());
        assert!(Challenge::select(Vec::<&str>::new()).is_err());
    }

    #[test]
    fn quoted_commas() {
        let params = parse_params("realm=\"a, b\", nonce=x");
        assert_eq!(params[0], ("realm".to_string(), "a, b".to_string()));
        assert_eq!(params[1], ("nonce".to_string(), "x".to_string()));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let s = format!("{:?}", Credentials::new("admin", "hunter2"));
        assert!(!s.contains("hunter2"));
    }
}
