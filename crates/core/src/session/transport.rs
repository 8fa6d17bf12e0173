use crate::config::{ClientConfig, DeliveryMode};

/// Transport requested in a SETUP, one per [`DeliveryMode`] (RFC 2326 §12.39).
///
/// ## Wire format
///
/// ```text
/// Tcp:       RTP/AVP/TCP;unicast;interleaved=0-1
/// Udp:       RTP/AVP;unicast;client_port=55000-55001
/// Multicast: RTP/AVP;multicast;destination=239.0.0.1;port=55000-55001;ttl=15
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    Interleaved {
        rtp_channel: u8,
        rtcp_channel: u8,
    },
    Unicast {
        client_rtp_port: u16,
        client_rtcp_port: u16,
    },
    Multicast {
        destination: String,
        rtp_port: u16,
        rtcp_port: u16,
        ttl: u32,
    },
}

impl TransportSpec {
    /// Transport for the configured delivery mode. RTCP takes the port (or
    /// channel) following RTP (RFC 3550 §11).
    pub fn from_config(config: &ClientConfig) -> Self {
        match config.delivery_mode {
            DeliveryMode::Tcp => Self::Interleaved {
                rtp_channel: 0,
                rtcp_channel: 1,
            },
            DeliveryMode::Udp => Self::Unicast {
                client_rtp_port: config.rtp_port,
                client_rtcp_port: config.rtp_port.wrapping_add(1),
            },
            DeliveryMode::Multicast => Self::Multicast {
                destination: config.multicast_address.clone(),
                rtp_port: config.rtp_port,
                rtcp_port: config.rtp_port.wrapping_add(1),
                ttl: config.time_to_live,
            },
        }
    }

    /// `Transport` header value for the SETUP request.
    pub fn header_value(&self) -> String {
        match self {
            Self::Interleaved {
                rtp_channel,
                rtcp_channel,
            } => format!("RTP/AVP/TCP;unicast;interleaved={rtp_channel}-{rtcp_channel}"),
            Self::Unicast {
                client_rtp_port,
                client_rtcp_port,
            } => format!("RTP/AVP;unicast;client_port={client_rtp_port}-{client_rtcp_port}"),
            Self::Multicast {
                destination,
                rtp_port,
                rtcp_port,
                ttl,
            } => format!(
                "RTP/AVP;multicast;destination={destination};port={rtp_port}-{rtcp_port};ttl={ttl}"
            ),
        }
    }
}

/// Transport parameters echoed back by the server in the SETUP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHeader {
    pub multicast: bool,
    pub client_port: Option<(u16, u16)>,
    pub server_port: Option<(u16, u16)>,
    pub interleaved: Option<(u8, u8)>,
    pub destination: Option<String>,
    pub port: Option<(u16, u16)>,
    pub ttl: Option<u32>,
    pub ssrc: Option<u32>,
}

impl TransportHeader {
    /// Parse a `Transport` header value (RFC 2326 §12.39).
    ///
    /// Returns `None` unless the value names an RTP/AVP profile.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse(
    ///     "RTP/AVP;unicast;client_port=8000-8001;server_port=5000-5001;ssrc=1A2B3C4D",
    /// )
    /// .unwrap();
    /// assert_eq!(th.client_port, Some((8000, 8001)));
    /// assert_eq!(th.server_port, Some((5000, 5001)));
    /// assert_eq!(th.ssrc, Some(0x1A2B3C4D));
    ///
    /// assert!(TransportHeader::parse("MP2T/H2221/UDP").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';').map(str::trim);
        let profile = parts.next()?;
        if !profile.starts_with("RTP/AVP") {
            return None;
        }

        let mut th = TransportHeader::default();
        for part in parts {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            match key {
                "multicast" => th.multicast = true,
                "client_port" => th.client_port = parse_pair(value),
                "server_port" => th.server_port = parse_pair(value),
                "interleaved" => th.interleaved = parse_pair(value),
                "port" => th.port = parse_pair(value),
                "destination" if !value.is_empty() => th.destination = Some(value.to_string()),
                "ttl" => th.ttl = value.parse().ok(),
                "ssrc" => th.ssrc = u32::from_str_radix(value, 16).ok(),
                _ => {}
            }
        }
        Some(th)
    }
}

/// `a-b` or a lone `a` (then `b = a + 1`).
fn parse_pair<T>(value: &str) -> Option<(T, T)>
where
    T: std::str::FromStr + Copy + TryFrom<u32>,
    u32: From<T>,
{
    match value.split_once('-') {
        Some((a, b)) => Some((a.trim().parse().ok()?, b.trim().parse().ok()?)),
        None => {
            let a: T = value.trim().parse().ok()?;
            let b = T::try_from(u32::from(a) + 1).ok()?;
            Some((a, b))
        }
    }
}
