//! Network transport layer for RTSP signaling and RTP media delivery.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP request/response signaling, and in
//!   interleaved mode also the RTP/RTCP data, multiplexed with `$` framing
//!   (RFC 2326 §10.12). One reader thread per connection.
//!
//! - **UDP** ([`udp`]): receives RTP datagrams on a fixed local port, for
//!   unicast or multicast delivery. One receive thread per socket.

pub mod tcp;
pub mod udp;

pub use tcp::TcpConnection;
pub use udp::{Endpoint, UdpReceiver};
