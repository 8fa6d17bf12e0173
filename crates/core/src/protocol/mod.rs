//! RTSP protocol implementation (RFC 2326), client side.
//!
//! This module covers the text-based signaling protocol: building requests,
//! parsing responses, authenticating, resolving URIs and extracting SDP.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://camera/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! ## Methods used by the client
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery, keep-alive |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate transport, obtain session id |
//! | PLAY | §10.5 | Start media delivery |
//! | TEARDOWN | §10.7 | Destroy session |
//! | GET_PARAMETER | §10.8 | Keep-alive |

pub mod auth;
pub mod request;
pub mod response;
pub mod sdp;
pub mod uri;

pub use auth::Credentials;
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;
pub use sdp::{MediaTrack, SessionDescriptor};
pub use uri::RtspUri;
