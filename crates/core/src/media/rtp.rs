/// Size of the RTP fixed header (RFC 3550 §5.1).
pub const FIXED_HEADER_LEN: usize = 12;

/// A decoded RTP packet (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            CSRC identifiers (CC x 32 bits)                    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   profile (X=1)               |   length in 32-bit words      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The payload is copied out of the datagram, so the packet outlives the
/// receive buffer it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    /// Set on the last packet of an access unit.
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub header_extension: Option<HeaderExtension>,
    pub payload: Vec<u8>,
}

/// RTP header extension (RFC 3550 §5.3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderExtension {
    pub profile: u16,
    pub data: Vec<u8>,
}

impl RtpPacket {
    /// Decode one RTP datagram.
    ///
    /// Returns `None` when the buffer is shorter than the fixed header, when
    /// the CSRC list or extension runs past the end, or when no payload
    /// bytes remain after them.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < FIXED_HEADER_LEN {
            return None;
        }

        let version = buf[0] >> 6;
        let padding = (buf[0] >> 5) & 0x1 == 1;
        let extension = (buf[0] >> 4) & 0x1 == 1;
        let csrc_count = buf[0] & 0x0f;
        let marker = buf[1] & 0x80 != 0;
        let payload_type = buf[1] & 0x7f;
        let sequence_number = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let mut offset = FIXED_HEADER_LEN;
        let csrc_end = offset + 4 * csrc_count as usize;
        let extension_header_len = if extension { 4 } else { 0 };
        if csrc_end + extension_header_len >= buf.len() {
            return None;
        }

        let csrc = buf[offset..csrc_end]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        offset = csrc_end;

        let header_extension = if extension {
            let profile = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
            let words = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            offset += 4;
            let end = offset + words * 4;
            if end >= buf.len() {
                return None;
            }
            let data = buf[offset..end].to_vec();
            offset = end;
            Some(HeaderExtension { profile, data })
        } else {
            None
        };

        let mut end = buf.len();
        if padding {
            let pad = buf[buf.len() - 1] as usize;
            end = end.checked_sub(pad).filter(|&e| e >= offset)?;
        }

        Some(Self {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            header_extension,
            payload: buf[offset..end].to_vec(),
        })
    }

    /// Semantic check, separate from parseability: version 2 and a
    /// non-empty payload.
    pub fn is_valid(&self) -> bool {
        self.version == 2 && !self.payload.is_empty()
    }
}
