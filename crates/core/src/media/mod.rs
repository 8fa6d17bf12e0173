//! RTP depacketization and H.264 NAL unit extraction.
//!
//! Inbound media flows through three stages, leaves first:
//!
//! 1. [`rtp::RtpPacket::parse`] decodes one datagram (RFC 3550 §5.1).
//! 2. [`frame::FrameBuilder`] groups packets into access units, closing a
//!    frame on every packet whose **marker bit** is set.
//! 3. [`h264::H264Parser`] classifies the NAL unit carried by each packet
//!    (RFC 6184 §5.2) and filters on registered payload types.
//!
//! [`pipeline::MediaPipeline`] chains the three for a session.
//!
//! ## RTP overview (RFC 3550)
//!
//! - **Sequence number** (16-bit, wrapping).
//! - **Timestamp** (32-bit): media clock, 90 kHz for video.
//! - **SSRC** (32-bit): identifies the sender.
//! - **Marker bit**: set on the last packet of an access unit (frame).
//!
//! Packets are assumed to arrive in order: there is no jitter buffer and no
//! loss detection.

pub mod frame;
pub mod h264;
pub mod pipeline;
pub mod rtp;

pub use frame::{FrameBuilder, RtpFrame};
pub use h264::{H264Parser, H264ParserConfig, NalUnit};
pub use pipeline::{MediaFrame, MediaPipeline};
pub use rtp::RtpPacket;
