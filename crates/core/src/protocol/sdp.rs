//! SDP (Session Description Protocol) extraction (RFC 4566 / RFC 8866).
//!
//! Only what a playing client needs is read from a DESCRIBE body:
//!
//! ```text
//! v=0                                          ← required
//! s=<session-name>
//! a=control:*                                  ← session control URL
//! m=video 0 RTP/AVP 96                         ← media description
//! a=rtpmap:96 H264/90000                       ← codec/clock rate
//! a=fmtp:96 packetization-mode=1;...           ← codec parameters
//! a=control:track1                             ← track control URL for SETUP
//! ```
//!
//! Everything else is ignored.

use crate::config::MediaFormat;
use crate::error::{ParseErrorKind, RtspError};
use crate::protocol::uri::resolve_control;

/// One `m=` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    /// Media name from the `m=` line (`video`, `audio`, `application`, ...).
    pub media: String,
    pub payload_type: Option<u8>,
    /// Encoding name from `a=rtpmap` (e.g. `H264`).
    pub encoding: Option<String>,
    pub clock_rate: Option<u32>,
    /// Raw `a=fmtp` parameters for the track's payload type.
    pub format_parameters: Option<String>,
    /// Absolute URI to SETUP this track with.
    pub control_uri: String,
}

impl MediaTrack {
    pub fn format(&self) -> Option<MediaFormat> {
        match self.media.as_str() {
            "video" => Some(MediaFormat::Video),
            "audio" => Some(MediaFormat::Audio),
            _ => None,
        }
    }
}

/// Parsed DESCRIBE body plus the track chosen for SETUP.
#[derive(Debug, Clone, Default)]
pub struct SessionDescriptor {
    pub session_name: String,
    /// Session-level control URI (resolved), if any.
    pub control_uri: Option<String>,
    pub tracks: Vec<MediaTrack>,
    selected: Option<usize>,
}

impl SessionDescriptor {
    /// Parse an SDP body. Relative control attributes are resolved against
    /// `base_uri` (the `Content-Base` of the response, or the request URI).
    ///
    /// Fails when the body lacks a `v=` line or has no `m=` section.
    pub fn extract(body: &str, base_uri: &str) -> crate::error::Result<Self> {
        let invalid = || RtspError::Parse {
            kind: ParseErrorKind::InvalidSdp,
        };

        let mut descriptor = Self::default();
        let mut has_version = false;
        let mut session_base = base_uri.to_string();
        // Track fields are collected raw and resolved once the section ends.
        let mut current: Option<(MediaTrack, Option<String>)> = None;
        let mut raw_tracks = Vec::new();

        for line in body.lines() {
            let line = line.trim();
            let Some((kind, value)) = line.split_once('=') else {
                continue;
            };

            match kind {
                "v" => has_version = true,
                "s" if current.is_none() => descriptor.session_name = value.to_string(),
                "m" => {
                    if let Some(track) = current.take() {
                        raw_tracks.push(track);
                    }
                    let mut fields = value.split_whitespace();
                    let media = fields.next().ok_or_else(invalid)?.to_string();
                    let payload_type = fields.nth(2).and_then(|pt| pt.parse().ok());
                    current = Some((
                        MediaTrack {
                            media,
                            payload_type,
                            encoding: None,
                            clock_rate: None,
                            format_parameters: None,
                            control_uri: String::new(),
                        },
                        None,
                    ));
                }
                "a" => {
                    let (name, attr) = value.split_once(':').unwrap_or((value, ""));
                    match (&mut current, name) {
                        (None, "control") => {
                            session_base = resolve_control(base_uri, attr);
                            descriptor.control_uri = Some(session_base.clone());
                        }
                        (Some((_, control)), "control") => *control = Some(attr.to_string()),
                        (Some((track, _)), "rtpmap") => parse_rtpmap(track, attr),
                        (Some((track, _)), "fmtp") => {
                            if let Some((pt, params)) = attr.split_once(' ')
                                && pt.parse::<u8>().ok() == track.payload_type
                            {
                                track.format_parameters = Some(params.trim().to_string());
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        if let Some(track) = current.take() {
            raw_tracks.push(track);
        }

        if !has_version || raw_tracks.is_empty() {
            return Err(invalid());
        }

        descriptor.tracks = raw_tracks
            .into_iter()
            .map(|(mut track, control)| {
                track.control_uri = match control {
                    Some(c) => resolve_control(&session_base, &c),
                    None => session_base.clone(),
                };
                track
            })
            .collect();

        tracing::debug!(
            session = %descriptor.session_name,
            tracks = descriptor.tracks.len(),
            "SDP extracted"
        );
        Ok(descriptor)
    }

    /// Select the first track of the given format. Returns `false` if none matches.
    pub fn select_track(&mut self, format: MediaFormat) -> bool {
        self.selected = self
            .tracks
            .iter()
            .position(|t| t.format() == Some(format));
        self.selected.is_some()
    }

    pub fn selected_track(&self) -> Option<&MediaTrack> {
        self.selected.and_then(|i| self.tracks.get(i))
    }
}

fn parse_rtpmap(track: &mut MediaTrack, attr: &str) {
    // a=rtpmap:<pt> <encoding>/<clock>[/<channels>]
    let Some((pt, mapping)) = attr.split_once(' ') else {
        return;
    };
    if pt.trim().parse::<u8>().ok() != track.payload_type {
        return;
    }
    let mut parts = mapping.trim().split('/');
    track.encoding = parts.next().map(str::to_string);
    track.clock_rate = parts.next().and_then(|c| c.parse().ok());
}
