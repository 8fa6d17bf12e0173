use std::fmt;
use std::time::Duration;

/// Method used by [`ClientSession::ping`](crate::session::ClientSession::ping)
/// once a session id is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeepAliveType {
    #[default]
    Options,
    GetParameter,
}

/// Kind of media track selected from the SDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaFormat {
    Audio,
    #[default]
    Video,
}

impl MediaFormat {
    /// SDP `m=` media name for this format.
    pub fn sdp_name(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// How RTP data reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Interleaved on the RTSP control connection (RFC 2326 §10.12).
    #[default]
    Tcp,
    /// UDP unicast to `rtp_port`.
    Udp,
    /// UDP multicast on `multicast_address:rtp_port`.
    Multicast,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
            Self::Multicast => f.write_str("multicast"),
        }
    }
}

/// Client-side session configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Stream URI, e.g. `rtsp://192.168.1.10:554/stream1`.
    /// Credentials embedded in it are used when `username` is empty.
    pub uri: String,
    pub username: String,
    pub password: String,
    /// Bound on waiting for a response and on each receive-loop poll.
    pub receive_timeout: Duration,
    pub send_timeout: Duration,
    pub keep_alive_type: KeepAliveType,
    pub media_format: MediaFormat,
    pub delivery_mode: DeliveryMode,
    /// Local RTP port for UDP, group port for multicast.
    pub rtp_port: u16,
    pub multicast_address: String,
    pub time_to_live: u32,
    /// Delay between reconnection attempts of [`RtspClient`](crate::RtspClient).
    pub retries_interval: Duration,
    /// Delay between keep-alive pings of [`RtspClient`](crate::RtspClient).
    pub keep_alive_interval: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            username: String::new(),
            password: String::new(),
            receive_timeout: Duration::from_secs(3),
            send_timeout: Duration::from_secs(3),
            keep_alive_type: KeepAliveType::Options,
            media_format: MediaFormat::Video,
            delivery_mode: DeliveryMode::Tcp,
            rtp_port: 55000,
            multicast_address: String::new(),
            time_to_live: 15,
            retries_interval: Duration::from_secs(5),
            keep_alive_interval: Duration::from_secs(20),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Default client identification string.
pub const USER_AGENT: &str = "rtsp-client-rs/0.1";
