use std::sync::Arc;

use super::frame::{FrameBuilder, RtpFrame};
use super::h264::{H264Parser, H264ParserConfig, NalUnit};

/// A completed access unit together with the NAL units found in it.
#[derive(Debug, Clone)]
pub struct MediaFrame {
    pub frame: RtpFrame,
    pub nal_units: Vec<NalUnit>,
}

/// RTP datagrams in, completed frames out.
///
/// Chains [`FrameBuilder`] and [`H264Parser`]. A session owns one pipeline
/// and clears it whenever the session is reset.
#[derive(Debug, Default)]
pub struct MediaPipeline {
    builder: FrameBuilder,
    parser: H264Parser,
}

impl MediaPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser_config(config: Arc<H264ParserConfig>) -> Self {
        Self {
            builder: FrameBuilder::new(),
            parser: H264Parser::with_config(config),
        }
    }

    pub fn parser_config(&self) -> &Arc<H264ParserConfig> {
        self.parser.config()
    }

    /// Feed one datagram; returns every frame it completed.
    ///
    /// Malformed datagrams are dropped silently.
    pub fn write(&self, data: &[u8]) -> Vec<MediaFrame> {
        if !self.builder.try_add_packet(data) {
            return Vec::new();
        }

        let mut frames = Vec::new();
        while let Some(frame) = self.builder.build_frame() {
            let nal_units = self.parser.parse(&frame);
            frames.push(MediaFrame { frame, nal_units });
        }
        frames
    }

    pub fn reset(&self) {
        self.builder.clear();
    }
}
