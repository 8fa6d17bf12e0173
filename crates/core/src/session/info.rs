use std::collections::HashSet;

use crate::protocol::request::Method;
use crate::protocol::sdp::{MediaTrack, SessionDescriptor};

/// Negotiated state of one client session.
///
/// Reset at the start of every open attempt and on every close/abort. A
/// session id is registered if and only if a SETUP succeeded since the
/// last reset.
#[derive(Debug, Default)]
pub struct SessionInfo {
    session_id: Option<String>,
    supported_methods: HashSet<Method>,
    descriptor: Option<SessionDescriptor>,
    playing: bool,
}

impl SessionInfo {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Register the id issued by SETUP. Empty ids are rejected.
    pub fn register_session_id(&mut self, session_id: Option<&str>) -> bool {
        match session_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => {
                self.session_id = Some(id.to_string());
                true
            }
            None => false,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_session_id_registered(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn set_supported_methods(&mut self, methods: HashSet<Method>) {
        self.supported_methods = methods;
    }

    pub fn supported_methods(&self) -> &HashSet<Method> {
        &self.supported_methods
    }

    /// Whether the server advertised `method`. An empty `Public` list is
    /// treated as "everything".
    pub fn supports(&self, method: Method) -> bool {
        self.supported_methods.is_empty() || self.supported_methods.contains(&method)
    }

    pub fn set_descriptor(&mut self, descriptor: SessionDescriptor) {
        self.descriptor = Some(descriptor);
    }

    pub fn descriptor(&self) -> Option<&SessionDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn selected_track(&self) -> Option<&MediaTrack> {
        self.descriptor.as_ref()?.selected_track()
    }

    pub fn turn_on_playing(&mut self) {
        self.playing = true;
    }

    /// SETUP has succeeded.
    pub fn is_ready(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// OPTIONS/DESCRIBE may be issued: no session established yet.
    pub fn can_prepare(&self) -> bool {
        !self.is_ready() && !self.playing
    }

    /// A track is selected and no session exists yet.
    pub fn can_setup(&self) -> bool {
        self.selected_track().is_some() && !self.is_ready()
    }

    pub fn can_play(&self) -> bool {
        self.is_ready() && !self.playing
    }

    pub fn can_tear_down(&self) -> bool {
        self.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaFormat;

    fn descriptor() -> SessionDescriptor {
        let mut sdp =
            SessionDescriptor::extract("v=0\r\nm=video 0 RTP/AVP 96\r\n", "rtsp://cam/s").unwrap();
        sdp.select_track(MediaFormat::Video);
        sdp
    }

    #[test]
    fn guards_follow_lifecycle() {
        let mut info = SessionInfo::default();
        assert!(info.can_prepare());
        assert!(!info.can_setup());
        assert!(!info.can_play());
        assert!(!info.can_tear_down());

        info.set_descriptor(descriptor());
        assert!(info.can_setup());

        assert!(info.register_session_id(Some("ABC123")));
        assert!(info.is_ready());
        assert!(!info.can_prepare());
        assert!(!info.can_setup());
        assert!(info.can_play());
        assert!(info.can_tear_down());

        info.turn_on_playing();
        assert!(!info.can_play());
        assert!(info.can_tear_down());
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let mut info = SessionInfo::default();
        assert!(!info.register_session_id(None));
        assert!(!info.register_session_id(Some("  ")));
        assert!(!info.is_session_id_registered());
    }

    #[test]
    fn reset_clears_everything() {
        let mut info = SessionInfo::default();
        info.set_descriptor(descriptor());
        info.register_session_id(Some("X"));
        info.set_supported_methods(HashSet::from([Method::Options]));
        info.turn_on_playing();
        info.reset();

        assert!(info.session_id().is_none());
        assert!(info.supported_methods().is_empty());
        assert!(info.descriptor().is_none());
        assert!(!info.is_playing());
    }

    #[test]
    fn empty_public_list_supports_all() {
        let mut info = SessionInfo::default();
        assert!(info.supports(Method::GetParameter));
        info.set_supported_methods(HashSet::from([Method::Options]));
        assert!(!info.supports(Method::GetParameter));
    }
}
