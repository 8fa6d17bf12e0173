use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::rtp::RtpPacket;

/// The packets of one access unit, in arrival order, ending with the packet
/// whose marker bit is set.
#[derive(Debug, Clone)]
pub struct RtpFrame {
    packets: Vec<Arc<RtpPacket>>,
}

impl RtpFrame {
    pub fn packets(&self) -> &[Arc<RtpPacket>] {
        &self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// RTP timestamp of the frame, taken from its first packet.
    pub fn timestamp(&self) -> Option<u32> {
        self.packets.first().map(|p| p.timestamp)
    }

    /// Total payload bytes across all packets.
    pub fn payload_len(&self) -> usize {
        self.packets.iter().map(|p| p.payload.len()).sum()
    }
}

#[derive(Debug, Default)]
struct BuilderState {
    packets: VecDeque<Arc<RtpPacket>>,
    /// Packet counts of completed frames, oldest first.
    sizes: VecDeque<usize>,
    /// Packets accepted since the last marker.
    frame_size: usize,
    last_packet: Option<Arc<RtpPacket>>,
}

/// Reassembles marker-delimited runs of RTP packets into [`RtpFrame`]s.
///
/// Shared between the receive thread (producer) and whoever drains frames
/// (consumer); every operation takes the same lock over all four state
/// members.
///
/// Packets are assumed to arrive in transmission order. No reordering or
/// loss detection is done.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    state: Mutex<BuilderState>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and enqueue one datagram.
    ///
    /// Unparsable input returns `false` and leaves the builder untouched.
    pub fn try_add_packet(&self, data: &[u8]) -> bool {
        let Some(packet) = RtpPacket::parse(data) else {
            tracing::trace!(len = data.len(), "dropping unparsable RTP datagram");
            return false;
        };

        let packet = Arc::new(packet);
        let mut state = self.state.lock();
        state.packets.push_back(packet.clone());
        state.frame_size += 1;
        if packet.marker {
            let size = state.frame_size;
            state.sizes.push_back(size);
            state.frame_size = 0;
        }
        state.last_packet = Some(packet);
        true
    }

    /// Whether at least one completed frame is queued.
    pub fn can_build_frame(&self) -> bool {
        !self.state.lock().sizes.is_empty()
    }

    /// Dequeue the oldest completed frame, or `None` if none is ready.
    pub fn build_frame(&self) -> Option<RtpFrame> {
        let mut state = self.state.lock();
        let size = state.sizes.pop_front()?;
        let packets = state.packets.drain(..size).collect();
        Some(RtpFrame { packets })
    }

    /// The most recently accepted packet.
    pub fn last_packet(&self) -> Option<Arc<RtpPacket>> {
        self.state.lock().last_packet.clone()
    }

    /// Drop every queued packet, completed frame and the partial frame.
    pub fn clear(&self) {
        *self.state.lock() = BuilderState::default();
    }
}
