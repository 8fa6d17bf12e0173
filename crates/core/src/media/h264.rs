use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::frame::RtpFrame;

/// 3-byte Annex B start code.
pub const START_CODE_3: [u8; 3] = [0, 0, 1];
/// 4-byte Annex B start code.
pub const START_CODE_4: [u8; 4] = [0, 0, 0, 1];

/// Payload type H.264 is conventionally negotiated on (RFC 3551 dynamic range).
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

const MIN_NAL_BUFFER_LEN: usize = 4;

/// One H.264 NAL unit, classified from its header byte.
///
/// ```text
/// +---------------+
/// |0|1|2|3|4|5|6|7|
/// +-+-+-+-+-+-+-+-+
/// |F|NRI|  Type   |
/// +---------------+
/// ```
///
/// Types 24–29 are the RTP packetization types of RFC 6184 §5.2
/// (STAP-A/B, MTAP16/24, FU-A/B). They are classified here but not
/// reassembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    pub forbidden: bool,
    pub ref_idc: u8,
    pub nal_type: u8,
    /// Bytes following the header byte.
    pub payload: Vec<u8>,
}

impl NalUnit {
    /// Parse a buffer that starts with an Annex B start code.
    ///
    /// Fails for buffers under 4 bytes and for buffers that start with
    /// neither `00 00 01` nor `00 00 00 01`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < MIN_NAL_BUFFER_LEN {
            return None;
        }

        let header_index = if buf.starts_with(&START_CODE_3) {
            START_CODE_3.len()
        } else if buf.starts_with(&START_CODE_4) {
            START_CODE_4.len()
        } else {
            return None;
        };

        let header = *buf.get(header_index)?;
        Some(Self {
            forbidden: header & 0x80 != 0,
            ref_idc: (header >> 5) & 0x03,
            nal_type: header & 0x1f,
            payload: buf[header_index + 1..].to_vec(),
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.payload.is_empty()
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self.nal_type, 0 | 30 | 31)
    }

    /// Single NAL unit packet (types 1–23).
    pub fn is_single(&self) -> bool {
        (1..=23).contains(&self.nal_type)
    }

    pub fn is_aggregation(&self) -> bool {
        (24..=27).contains(&self.nal_type)
    }

    pub fn is_fragmentation(&self) -> bool {
        matches!(self.nal_type, 28 | 29)
    }

    pub fn is_stap_a(&self) -> bool {
        self.nal_type == 24
    }

    pub fn is_stap_b(&self) -> bool {
        self.nal_type == 25
    }

    pub fn is_mtap_a(&self) -> bool {
        self.nal_type == 26
    }

    pub fn is_mtap_b(&self) -> bool {
        self.nal_type == 27
    }

    pub fn is_fu_a(&self) -> bool {
        self.nal_type == 28
    }

    pub fn is_fu_b(&self) -> bool {
        self.nal_type == 29
    }

    pub fn is_coded_slice_non_idr(&self) -> bool {
        self.nal_type == 1
    }

    pub fn is_slice_partition_a(&self) -> bool {
        self.nal_type == 2
    }

    pub fn is_slice_partition_b(&self) -> bool {
        self.nal_type == 3
    }

    pub fn is_slice_partition_c(&self) -> bool {
        self.nal_type == 4
    }

    pub fn is_coded_slice_idr(&self) -> bool {
        self.nal_type == 5
    }

    pub fn is_sei(&self) -> bool {
        self.nal_type == 6
    }

    pub fn is_sps(&self) -> bool {
        self.nal_type == 7
    }

    pub fn is_pps(&self) -> bool {
        self.nal_type == 8
    }

    pub fn is_access_unit_delimiter(&self) -> bool {
        self.nal_type == 9
    }

    /// Short name for logging.
    pub fn type_name(&self) -> &'static str {
        match self.nal_type {
            0 | 30 | 31 => "reserved",
            1 => "slice",
            2 => "partition-a",
            3 => "partition-b",
            4 => "partition-c",
            5 => "idr",
            6 => "sei",
            7 => "sps",
            8 => "pps",
            9 => "aud",
            24 => "stap-a",
            25 => "stap-b",
            26 => "mtap-a",
            27 => "mtap-b",
            28 => "fu-a",
            29 => "fu-b",
            _ => "other",
        }
    }
}

/// RTP payload types accepted as H.264.
///
/// Owned per parser so concurrent sessions can accept different dynamic
/// payload types.
#[derive(Debug)]
pub struct H264ParserConfig {
    payload_types: Mutex<HashSet<u8>>,
}

impl H264ParserConfig {
    pub fn new() -> Self {
        Self {
            payload_types: Mutex::new(HashSet::from([DEFAULT_PAYLOAD_TYPE])),
        }
    }

    /// Returns `false` if the payload type was already registered.
    pub fn register_payload(&self, payload_type: u8) -> bool {
        self.payload_types.lock().insert(payload_type)
    }

    /// Returns `false` if the payload type was not registered.
    pub fn unregister_payload(&self, payload_type: u8) -> bool {
        self.payload_types.lock().remove(&payload_type)
    }

    pub fn is_payload_supported(&self, payload_type: u8) -> bool {
        self.payload_types.lock().contains(&payload_type)
    }
}

impl Default for H264ParserConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts NAL units from the packets of an [`RtpFrame`].
///
/// Packets with an unregistered payload type are skipped, as are payloads
/// that do not parse as a NAL unit.
#[derive(Debug, Clone, Default)]
pub struct H264Parser {
    config: Arc<H264ParserConfig>,
}

impl H264Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Arc<H264ParserConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<H264ParserConfig> {
        &self.config
    }

    pub fn parse(&self, frame: &RtpFrame) -> Vec<NalUnit> {
        let mut units = Vec::new();
        for packet in frame.packets() {
            if !self.config.is_payload_supported(packet.payload_type) {
                tracing::trace!(
                    pt = packet.payload_type,
                    seq = packet.sequence_number,
                    "skipping packet with unregistered payload type"
                );
                continue;
            }
            if let Some(unit) = NalUnit::parse(&packet.payload) {
                units.push(unit);
            }
        }

        tracing::trace!(
            packets = frame.len(),
            nal_units = units.len(),
            "frame parsed"
        );
        units
    }
}
