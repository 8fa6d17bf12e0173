//! RTSP client session (RFC 2326 §A.1, client side).
//!
//! A [`ClientSession`] drives a [`Connection`] through the playback
//! handshake and owns the delivery transport that media arrives on.
//!
//! ## Session lifecycle
//!
//! ```text
//! open():  connect -> OPTIONS -> DESCRIBE -> SETUP -> [start UDP receiver]
//!          -> Connected event -> PLAY -> playing
//! close(): stop receiver -> TEARDOWN -> close connection -> Disconnected
//! abort(): stop receiver -> Disconnected -> hard-close connection
//! ping():  keep-alive (OPTIONS or GET_PARAMETER)
//! ```
//!
//! Every failure inside these operations is classified with a
//! [`ClientErrorCode`] and delivered both as the return value and as a
//! [`SessionEvent::Error`].
//!
//! ## Concurrency
//!
//! `open()`/`close()` are expected to run from one orchestrating thread.
//! `abort()` may run concurrently from a watchdog thread to bound shutdown
//! time; it works by hard-closing the connection, which makes any in-flight
//! exchange fail. All state goes through one lock and all events through one
//! serializing [`Dispatcher`], and `Disconnected` is latched per cycle, but
//! the interleaving of a concurrent abort with an in-flight open/close
//! remains best-effort.

pub mod event;
pub mod info;
pub mod signal;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{ClientConfig, DeliveryMode, KeepAliveType};
use crate::error::{ClientError, ClientErrorCode, Result};
use crate::media::{H264ParserConfig, MediaPipeline};
use crate::protocol::auth::Credentials;
use crate::protocol::request::{Method, RtspRequest};
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp::SessionDescriptor;
use crate::protocol::uri::RtspUri;
use crate::transport::udp::{Endpoint, UdpReceiver};

pub use event::{Dispatcher, ObserverId, SessionEvent, SessionObserver};
pub use info::SessionInfo;
pub use signal::Signal;
pub use transport::{TransportHeader, TransportSpec};

/// Callback for interleaved packets read off the control connection:
/// `(channel, data)`.
pub type PacketHandler = Arc<dyn Fn(u8, &[u8]) + Send + Sync>;

/// The RTSP control connection a session drives.
///
/// Implementations must be internally synchronized: `abort()` and
/// `close()` may be called while another thread is blocked in `invoke()`,
/// and must make that call return promptly.
pub trait Connection: Send + Sync {
    fn open(&self, uri: &RtspUri, credentials: &Credentials) -> Result<()>;

    fn configure_timeouts(&self, receive: Duration, send: Duration) -> Result<()>;

    /// Send one request and wait for its response. Non-2xx responses are
    /// returned as `Ok`; only transport failures are errors.
    fn invoke(&self, request: RtspRequest) -> Result<RtspResponse>;

    fn close(&self);

    /// Close without waiting for anything.
    fn abort(&self);

    fn is_opened(&self) -> bool;

    /// Opened and the peer has not gone away.
    fn is_connected(&self) -> bool;

    /// Install the receiver of interleaved data (TCP delivery).
    fn set_packet_handler(&self, handler: Option<PacketHandler>);
}

/// Fans inbound media out to observers and the depacketizer.
struct PacketRouter {
    dispatcher: Dispatcher,
    pipeline: MediaPipeline,
}

impl PacketRouter {
    fn route(&self, channel: Option<u8>, data: &[u8]) {
        let mut events = self.dispatcher.lock();
        events.dispatch(SessionEvent::PacketReceived {
            channel,
            data: data.to_vec(),
        });

        // odd interleaved channels carry RTCP
        if channel.is_none_or(|c| c % 2 == 0) {
            for frame in self.pipeline.write(data) {
                events.dispatch(SessionEvent::FrameReceived(Arc::new(frame)));
            }
        }
    }
}

/// Client-side RTSP session state machine.
pub struct ClientSession {
    config: ClientConfig,
    connection: Arc<dyn Connection>,
    info: Mutex<SessionInfo>,
    transport: Mutex<Option<UdpReceiver>>,
    router: Arc<PacketRouter>,
    connected: Signal,
}

impl ClientSession {
    pub fn new(config: ClientConfig, connection: Arc<dyn Connection>) -> Self {
        let router = Arc::new(PacketRouter {
            dispatcher: Dispatcher::new(),
            pipeline: MediaPipeline::new(),
        });

        let r = router.clone();
        connection.set_packet_handler(Some(Arc::new(move |channel: u8, data: &[u8]| {
            r.route(Some(channel), data)
        })));

        Self {
            config,
            connection,
            info: Mutex::new(SessionInfo::default()),
            transport: Mutex::new(None),
            router,
            connected: Signal::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.router.dispatcher
    }

    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) -> ObserverId {
        self.router.dispatcher.subscribe(observer)
    }

    /// Subscribe a channel receiving every event of this session.
    pub fn events(&self) -> std::sync::mpsc::Receiver<SessionEvent> {
        self.router.dispatcher.channel()
    }

    /// Payload types the H.264 depacketizer of this session accepts.
    pub fn parser_config(&self) -> &Arc<H264ParserConfig> {
        self.router.pipeline.parser_config()
    }

    pub fn session_id(&self) -> Option<String> {
        self.info.lock().session_id().map(str::to_string)
    }

    pub fn is_opened(&self) -> bool {
        self.connection.is_opened()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_ready(&self) -> bool {
        self.info.lock().is_ready()
    }

    pub fn is_playing(&self) -> bool {
        self.info.lock().is_playing()
    }

    pub fn can_prepare(&self) -> bool {
        self.info.lock().can_prepare()
    }

    pub fn can_setup(&self) -> bool {
        self.info.lock().can_setup()
    }

    pub fn can_play(&self) -> bool {
        self.info.lock().can_play()
    }

    pub fn can_tear_down(&self) -> bool {
        self.info.lock().can_tear_down()
    }

    /// Block until `Connected` has been dispatched for the current cycle,
    /// at most `timeout`.
    pub fn wait_for_connection(&self, timeout: Duration) -> bool {
        self.connected.wait_timeout(timeout)
    }

    /// Run the full playback handshake.
    ///
    /// On failure the connection is closed, any started transport is
    /// stopped, and the classified error is both dispatched and returned.
    /// Opening an already open session is rejected without an event.
    pub fn open(&self) -> std::result::Result<(), ClientError> {
        if self.connection.is_opened() {
            return Err(ClientError::new(
                ClientErrorCode::ConnectionFailed,
                "session already open",
            ));
        }

        self.reset();
        self.router.dispatcher.lock().begin_cycle();

        match self.establish() {
            Ok(()) => {
                let session_id = self.session_id().unwrap_or_default();
                tracing::info!(
                    uri = %self.config.uri,
                    mode = %self.config.delivery_mode,
                    %session_id,
                    "session playing"
                );
                Ok(())
            }
            Err(err) => {
                self.connection.close();
                self.stop_transport();
                self.reset();
                self.report(err.clone());
                Err(err)
            }
        }
    }

    fn establish(&self) -> std::result::Result<(), ClientError> {
        use ClientErrorCode::*;

        let uri = RtspUri::parse(&self.config.uri)
            .map_err(|e| ClientError::new(ConnectionFailed, "invalid uri").caused_by(&e))?;
        let base = uri.to_string();

        self.connection
            .open(&uri, &self.credentials(&uri))
            .map_err(|e| ClientError::new(ConnectionFailed, "connection failed").caused_by(&e))?;
        self.connection
            .configure_timeouts(self.config.receive_timeout, self.config.send_timeout)
            .map_err(|e| {
                ClientError::new(ConnectionFailed, "failed to configure the timeouts").caused_by(&e)
            })?;

        let options = self.call(
            self.request(Method::Options, &base),
            GetOptionsFailed,
            "failed to invoke the options method",
        )?;
        self.info
            .lock()
            .set_supported_methods(options.public_methods());

        let describe = self.call(
            self.request(Method::Describe, &base)
                .add_header("Accept", "application/sdp"),
            DescribeFailed,
            "failed to invoke the describe method",
        )?;
        let content_base = describe.content_base().unwrap_or(&base).to_string();
        let mut descriptor =
            SessionDescriptor::extract(describe.body.as_deref().unwrap_or(""), &content_base)
                .map_err(|e| {
                    ClientError::new(DescribeFailed, "failed to extract the sdp").caused_by(&e)
                })?;
        if !descriptor.select_track(self.config.media_format) {
            return Err(ClientError::new(
                DescribeFailed,
                format!(
                    "failed to select a {} track",
                    self.config.media_format.sdp_name()
                ),
            ));
        }
        let track = descriptor
            .selected_track()
            .cloned()
            .ok_or_else(|| ClientError::new(DescribeFailed, "failed to select a media track"))?;
        let control = descriptor.control_uri.clone().unwrap_or(base);
        self.info.lock().set_descriptor(descriptor);

        let spec = TransportSpec::from_config(&self.config);
        let setup = self.call(
            self.request(Method::Setup, &track.control_uri)
                .add_header("Transport", &spec.header_value()),
            SetupFailed,
            "failed to setup the transport",
        )?;
        if let Some(th) = setup.get_header("Transport").and_then(TransportHeader::parse) {
            tracing::debug!(transport = ?th, "transport negotiated");
        }

        let session_id = {
            let mut info = self.info.lock();
            if !info.register_session_id(setup.session_id()) {
                return Err(ClientError::new(
                    SetupFailed,
                    "failed to setup the transport due to invalid session identifier",
                ));
            }
            info.session_id().unwrap_or_default().to_string()
        };

        let receiver = self.receiver()?;
        {
            // Held until Connected is out, so no packet event can precede it.
            let mut events = self.router.dispatcher.lock();
            if let Some(mut receiver) = receiver {
                let router = self.router.clone();
                receiver
                    .start(move |data| router.route(None, data))
                    .map_err(|e| {
                        ClientError::new(SetupFailed, "failed to start the transport")
                            .caused_by(&e)
                    })?;
                *self.transport.lock() = Some(receiver);
            }
            events.dispatch(SessionEvent::Connected { track });
            self.connected.set();
        }

        let play = self.connection.invoke(
            self.request(Method::Play, &control)
                .with_session(&session_id)
                .add_header("Range", "npt=0.000-"),
        );
        if let Err(err) = expect_success(play, PlayFailed, "failed to invoke the play method") {
            let teardown = self.request(Method::TearDown, &control).with_session(&session_id);
            if let Err(e) = self.connection.invoke(teardown) {
                tracing::warn!(error = %e, "best-effort TEARDOWN after failed PLAY");
            }
            self.stop_transport();
            self.connected.reset();
            self.router.dispatcher.dispatch(SessionEvent::Disconnected);
            return Err(err);
        }

        self.info.lock().turn_on_playing();
        Ok(())
    }

    /// Best-effort shutdown. Each step runs even if an earlier one failed.
    pub fn close(&self) {
        self.stop_transport();

        let session_id = self.session_id();
        if let Some(id) = session_id {
            let request = self
                .request(Method::TearDown, &self.control_uri())
                .with_session(&id);
            if let Err(err) = expect_success(
                self.connection.invoke(request),
                ClientErrorCode::TearDownFailed,
                "failed to invoke the teardown method",
            ) {
                self.report(err);
            }
        }

        if self.connection.is_opened() {
            self.connection.close();
            self.connected.reset();
            self.router.dispatcher.dispatch(SessionEvent::Disconnected);
            tracing::info!(uri = %self.config.uri, "session closed");
        }

        self.reset();
    }

    /// Forced shutdown without TEARDOWN, for when `close()` takes too long.
    /// Safe to call from another thread while `open()`/`close()` runs.
    pub fn abort(&self) {
        self.stop_transport();

        if self.connection.is_connected() {
            self.connected.reset();
            self.router.dispatcher.dispatch(SessionEvent::Disconnected);
        }
        self.connection.abort();
        tracing::warn!(uri = %self.config.uri, "session aborted");

        self.reset();
    }

    /// Send a keep-alive.
    ///
    /// With a registered session id the configured keep-alive method is
    /// used (GET_PARAMETER falls back to OPTIONS when the server did not
    /// advertise it); otherwise a plain OPTIONS.
    pub fn ping(&self) -> std::result::Result<(), ClientError> {
        let (session_id, get_parameter) = {
            let info = self.info.lock();
            (
                info.session_id().map(str::to_string),
                info.supports(Method::GetParameter),
            )
        };

        let request = match session_id {
            Some(id) => {
                let method = match self.config.keep_alive_type {
                    KeepAliveType::GetParameter if get_parameter => Method::GetParameter,
                    _ => Method::Options,
                };
                self.request(method, &self.control_uri()).with_session(&id)
            }
            None => self.request(Method::Options, &self.base_uri()),
        };

        let method = request.method;
        tracing::trace!(%method, "keep-alive");
        expect_success(
            self.connection.invoke(request),
            ClientErrorCode::KeepAliveFailed,
            "failed to ping the session",
        )
        .map(|_| ())
        .inspect_err(|err| self.report(err.clone()))
    }

    fn request(&self, method: Method, uri: &str) -> RtspRequest {
        RtspRequest::new(method, uri).add_header("User-Agent", &self.config.user_agent)
    }

    fn call(
        &self,
        request: RtspRequest,
        code: ClientErrorCode,
        message: &str,
    ) -> std::result::Result<RtspResponse, ClientError> {
        let method = request.method;
        let result = expect_success(self.connection.invoke(request), code, message);
        if let Ok(response) = &result {
            tracing::debug!(%method, status = response.status_code, "exchange succeeded");
        }
        result
    }

    fn credentials(&self, uri: &RtspUri) -> Credentials {
        if self.config.username.is_empty() {
            Credentials::new(
                uri.username.as_deref().unwrap_or(""),
                uri.password.as_deref().unwrap_or(""),
            )
        } else {
            Credentials::new(&self.config.username, &self.config.password)
        }
    }

    fn base_uri(&self) -> String {
        RtspUri::parse(&self.config.uri)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| self.config.uri.clone())
    }

    /// Aggregate control URI for PLAY/TEARDOWN/keep-alive.
    fn control_uri(&self) -> String {
        self.info
            .lock()
            .descriptor()
            .and_then(|d| d.control_uri.clone())
            .unwrap_or_else(|| self.base_uri())
    }

    fn receiver(&self) -> std::result::Result<Option<UdpReceiver>, ClientError> {
        let endpoint = match self.config.delivery_mode {
            DeliveryMode::Tcp => return Ok(None),
            DeliveryMode::Udp => Endpoint::Unicast {
                port: self.config.rtp_port,
            },
            DeliveryMode::Multicast => Endpoint::Multicast {
                group: self.config.multicast_address.trim().parse().map_err(|_| {
                    ClientError::new(
                        ClientErrorCode::SetupFailed,
                        format!(
                            "invalid multicast address {:?}",
                            self.config.multicast_address
                        ),
                    )
                })?,
                port: self.config.rtp_port,
                ttl: self.config.time_to_live,
            },
        };
        Ok(Some(UdpReceiver::new(endpoint, self.config.receive_timeout)))
    }

    fn stop_transport(&self) {
        let receiver = self.transport.lock().take();
        if let Some(mut receiver) = receiver {
            receiver.stop();
        }
    }

    fn reset(&self) {
        self.info.lock().reset();
        self.router.pipeline.reset();
        self.connected.reset();
    }

    fn report(&self, err: ClientError) {
        tracing::error!(code = ?err.code, message = %err.message, cause = ?err.cause, "session error");
        self.router.dispatcher.dispatch(SessionEvent::Error(err));
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.connection.is_opened() || self.transport.lock().is_some() {
            self.close();
        }
        self.connection.set_packet_handler(None);
    }
}

fn expect_success(
    result: Result<RtspResponse>,
    code: ClientErrorCode,
    message: &str,
) -> std::result::Result<RtspResponse, ClientError> {
    match result {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => Err(ClientError::new(
            code,
            format!(
                "{message} ({} {})",
                response.status_code, response.status_text
            ),
        )),
        Err(e) => Err(ClientError::new(code, message).caused_by(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::Receiver;

    use crate::config::MediaFormat;
    use crate::error::RtspError;

    const SDP: &str = "v=0\r\n\
        s=Mock\r\n\
        a=control:*\r\n\
        m=video 0 RTP/AVP 96\r\n\
        a=rtpmap:96 H264/90000\r\n\
        a=control:track1\r\n";

    #[derive(Default)]
    struct MockConnection {
        opened: AtomicBool,
        calls: Mutex<Vec<RtspRequest>>,
        failing: Mutex<HashSet<Method>>,
        omit_session_id: AtomicBool,
        public: Mutex<Option<String>>,
        handler: Mutex<Option<PacketHandler>>,
    }

    impl MockConnection {
        fn failing(methods: &[Method]) -> Arc<Self> {
            let mock = Self::default();
            mock.failing.lock().extend(methods.iter().copied());
            Arc::new(mock)
        }

        fn methods(&self) -> Vec<Method> {
            self.calls.lock().iter().map(|r| r.method).collect()
        }

        fn push_packet(&self, channel: u8, data: &[u8]) {
            let handler = self.handler.lock().clone();
            if let Some(handler) = handler {
                handler(channel, data);
            }
        }
    }

    impl Connection for MockConnection {
        fn open(&self, _uri: &RtspUri, _credentials: &Credentials) -> Result<()> {
            self.opened.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn configure_timeouts(&self, _receive: Duration, _send: Duration) -> Result<()> {
            Ok(())
        }

        fn invoke(&self, request: RtspRequest) -> Result<RtspResponse> {
            if !self.opened.load(Ordering::SeqCst) {
                return Err(RtspError::NotConnected);
            }
            let method = request.method;
            self.calls.lock().push(request);
            if self.failing.lock().contains(&method) {
                return Ok(RtspResponse::new(500, "Internal Server Error"));
            }
            let response = match method {
                Method::Options => RtspResponse::ok().add_header(
                    "Public",
                    self.public
                        .lock()
                        .as_deref()
                        .unwrap_or("OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN, GET_PARAMETER"),
                ),
                Method::Describe => RtspResponse::ok()
                    .add_header("Content-Base", "rtsp://cam:554/live/")
                    .with_body(SDP.to_string()),
                Method::Setup if self.omit_session_id.load(Ordering::SeqCst) => RtspResponse::ok(),
                Method::Setup => RtspResponse::ok()
                    .add_header("Session", "DEADBEEF;timeout=60")
                    .add_header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1"),
                _ => RtspResponse::ok(),
            };
            Ok(response)
        }

        fn close(&self) {
            self.opened.store(false, Ordering::SeqCst);
        }

        fn abort(&self) {
            self.opened.store(false, Ordering::SeqCst);
        }

        fn is_opened(&self) -> bool {
            self.opened.load(Ordering::SeqCst)
        }

        fn is_connected(&self) -> bool {
            self.opened.load(Ordering::SeqCst)
        }

        fn set_packet_handler(&self, handler: Option<PacketHandler>) {
            *self.handler.lock() = handler;
        }
    }

    fn config() -> ClientConfig {
        ClientConfig {
            uri: "rtsp://cam:554/live".to_string(),
            ..ClientConfig::default()
        }
    }

    fn session(mock: &Arc<MockConnection>) -> (ClientSession, Receiver<SessionEvent>) {
        let session = ClientSession::new(config(), mock.clone());
        let events = session.events();
        (session, events)
    }

    fn rtp(seq: u16, marker: bool) -> Vec<u8> {
        let mut buf = vec![0x80, if marker { 0x80 | 96 } else { 96 }];
        buf.extend_from_slice(&seq.to_be_bytes());
        buf.extend_from_slice(&[0; 8]);
        buf.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88]);
        buf
    }

    fn errors(events: &[SessionEvent]) -> Vec<ClientErrorCode> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Error(err) => Some(err.code),
                _ => None,
            })
            .collect()
    }

    fn count(events: &[SessionEvent], pred: fn(&SessionEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    #[test]
    fn open_then_close_cycle() {
        let mock = Arc::new(MockConnection::default());
        let (session, rx) = session(&mock);

        session.open().unwrap();
        assert!(session.is_playing());
        assert_eq!(session.session_id().as_deref(), Some("DEADBEEF"));
        assert!(session.wait_for_connection(Duration::from_millis(10)));

        session.close();
        assert!(!session.is_opened());
        assert!(session.session_id().is_none());
        assert!(!session.wait_for_connection(Duration::from_millis(10)));

        assert_eq!(
            mock.methods(),
            vec![
                Method::Options,
                Method::Describe,
                Method::Setup,
                Method::Play,
                Method::TearDown
            ]
        );

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::Connected { .. })), 1);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::Disconnected)), 1);
        assert!(errors(&events).is_empty());
        assert!(matches!(events.first(), Some(SessionEvent::Connected { .. })));
    }

    #[test]
    fn requests_carry_expected_uris_and_headers() {
        let mock = Arc::new(MockConnection::default());
        let (session, _rx) = session(&mock);
        session.open().unwrap();

        let calls = mock.calls.lock();
        assert_eq!(calls[0].uri, "rtsp://cam:554/live");
        assert_eq!(calls[1].get_header("Accept"), Some("application/sdp"));
        assert_eq!(calls[2].uri, "rtsp://cam:554/live/track1");
        assert_eq!(
            calls[2].get_header("Transport"),
            Some("RTP/AVP/TCP;unicast;interleaved=0-1")
        );
        assert_eq!(calls[3].uri, "rtsp://cam:554/live/");
        assert_eq!(calls[3].get_header("Session"), Some("DEADBEEF"));
        assert!(calls.iter().all(|r| r.get_header("User-Agent").is_some()));
    }

    #[test]
    fn describe_failure() {
        let mock = MockConnection::failing(&[Method::Describe]);
        let (session, rx) = session(&mock);

        let err = session.open().unwrap_err();
        assert_eq!(err.code, ClientErrorCode::DescribeFailed);
        assert!(!session.is_opened());
        assert_eq!(mock.methods(), vec![Method::Options, Method::Describe]);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(errors(&events), vec![ClientErrorCode::DescribeFailed]);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::Connected { .. })), 0);
    }

    #[test]
    fn options_failure() {
        let mock = MockConnection::failing(&[Method::Options]);
        let (session, rx) = session(&mock);
        assert_eq!(
            session.open().unwrap_err().code,
            ClientErrorCode::GetOptionsFailed
        );
        assert_eq!(
            errors(&rx.try_iter().collect::<Vec<_>>()),
            vec![ClientErrorCode::GetOptionsFailed]
        );
    }

    #[test]
    fn missing_track_is_describe_failure() {
        let mock = Arc::new(MockConnection::default());
        let config = ClientConfig {
            media_format: MediaFormat::Audio,
            ..config()
        };
        let session = ClientSession::new(config, mock.clone());
        let err = session.open().unwrap_err();
        assert_eq!(err.code, ClientErrorCode::DescribeFailed);
        assert!(!mock.methods().contains(&Method::Setup));
    }

    #[test]
    fn missing_session_id_is_setup_failure() {
        let mock = Arc::new(MockConnection::default());
        mock.omit_session_id.store(true, Ordering::SeqCst);
        let (session, rx) = session(&mock);

        let err = session.open().unwrap_err();
        assert_eq!(err.code, ClientErrorCode::SetupFailed);
        assert!(err.message.contains("invalid session identifier"));
        assert!(!session.is_ready());
        assert!(!mock.methods().contains(&Method::Play));
        assert_eq!(
            errors(&rx.try_iter().collect::<Vec<_>>()),
            vec![ClientErrorCode::SetupFailed]
        );
    }

    #[test]
    fn play_failure_tears_down() {
        let mock = MockConnection::failing(&[Method::Play]);
        let (session, rx) = session(&mock);

        let err = session.open().unwrap_err();
        assert_eq!(err.code, ClientErrorCode::PlayFailed);
        assert_eq!(mock.methods().last(), Some(&Method::TearDown));
        assert!(!session.is_opened());
        assert!(session.session_id().is_none());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::Connected { .. })), 1);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::Disconnected)), 1);
        assert_eq!(errors(&events), vec![ClientErrorCode::PlayFailed]);
    }

    #[test]
    fn open_twice_is_rejected_silently() {
        let mock = Arc::new(MockConnection::default());
        let (session, rx) = session(&mock);
        session.open().unwrap();
        let _ = rx.try_iter().count();

        assert!(session.open().is_err());
        assert_eq!(rx.try_iter().count(), 0);
        assert!(session.is_playing());
    }

    #[test]
    fn interleaved_packets_flow_after_connected() {
        let mock = Arc::new(MockConnection::default());
        let (session, rx) = session(&mock);
        session.open().unwrap();

        mock.push_packet(0, &rtp(1, false));
        mock.push_packet(1, &[0x80, 0xC8, 0x00, 0x06]);
        mock.push_packet(0, &rtp(2, true));

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events[0], SessionEvent::Connected { .. }));
        let packets = count(&events, |e| matches!(e, SessionEvent::PacketReceived { .. }));
        assert_eq!(packets, 3);

        let frames: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::FrameReceived(f) => Some(f.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame.len(), 2);
        assert_eq!(frames[0].nal_units.len(), 2);
        assert!(frames[0].nal_units[0].is_coded_slice_idr());
        drop(session);
    }

    #[test]
    fn ping_without_session_uses_options() {
        let mock = Arc::new(MockConnection::default());
        let (session, _rx) = session(&mock);
        mock.opened.store(true, Ordering::SeqCst);

        session.ping().unwrap();
        let calls = mock.calls.lock();
        assert_eq!(calls[0].method, Method::Options);
        assert!(calls[0].get_header("Session").is_none());
    }

    #[test]
    fn ping_with_session_uses_keep_alive_method() {
        let mock = Arc::new(MockConnection::default());
        let config = ClientConfig {
            keep_alive_type: KeepAliveType::GetParameter,
            ..config()
        };
        let session = ClientSession::new(config, mock.clone());
        session.open().unwrap();

        session.ping().unwrap();
        let calls = mock.calls.lock();
        let last = calls.last().unwrap();
        assert_eq!(last.method, Method::GetParameter);
        assert_eq!(last.get_header("Session"), Some("DEADBEEF"));
    }

    #[test]
    fn get_parameter_falls_back_when_not_public() {
        let mock = Arc::new(MockConnection::default());
        *mock.public.lock() = Some("OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN".to_string());
        let config = ClientConfig {
            keep_alive_type: KeepAliveType::GetParameter,
            ..config()
        };
        let session = ClientSession::new(config, mock.clone());
        session.open().unwrap();

        session.ping().unwrap();
        assert_eq!(mock.methods().last(), Some(&Method::Options));
    }

    #[test]
    fn ping_failure_is_reported() {
        let mock = MockConnection::failing(&[Method::Options]);
        let (session, rx) = session(&mock);
        mock.opened.store(true, Ordering::SeqCst);

        assert_eq!(
            session.ping().unwrap_err().code,
            ClientErrorCode::KeepAliveFailed
        );
        assert_eq!(
            errors(&rx.try_iter().collect::<Vec<_>>()),
            vec![ClientErrorCode::KeepAliveFailed]
        );
    }

    #[test]
    fn abort_skips_teardown() {
        let mock = Arc::new(MockConnection::default());
        let (session, rx) = session(&mock);
        session.open().unwrap();

        session.abort();
        assert!(!mock.methods().contains(&Method::TearDown));
        assert!(session.session_id().is_none());

        // a close after abort must not repeat Disconnected
        session.close();
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::Disconnected)), 1);
    }

    #[test]
    fn close_without_open_is_quiet() {
        let mock = Arc::new(MockConnection::default());
        let (session, rx) = session(&mock);
        session.close();
        assert!(mock.methods().is_empty());
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn teardown_failure_is_reported_but_close_completes() {
        let mock = MockConnection::failing(&[Method::TearDown]);
        let (session, rx) = session(&mock);
        session.open().unwrap();
        session.close();

        assert!(!session.is_opened());
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(errors(&events), vec![ClientErrorCode::TearDownFailed]);
        assert_eq!(count(&events, |e| matches!(e, SessionEvent::Disconnected)), 1);
    }

    #[test]
    fn guards_track_state() {
        let mock = Arc::new(MockConnection::default());
        let (session, _rx) = session(&mock);
        assert!(session.can_prepare());
        assert!(!session.can_tear_down());

        session.open().unwrap();
        assert!(!session.can_prepare());
        assert!(!session.can_setup());
        assert!(!session.can_play());
        assert!(session.can_tear_down());
    }

    #[test]
    fn udp_mode_starts_and_stops_receiver() {
        let mock = Arc::new(MockConnection::default());
        let config = ClientConfig {
            delivery_mode: DeliveryMode::Udp,
            rtp_port: 0,
            receive_timeout: Duration::from_millis(50),
            ..config()
        };
        let session = ClientSession::new(config, mock.clone());
        session.open().unwrap();
        assert!(session.transport.lock().is_some());

        // copied out so the calls lock is released before TEARDOWN
        let transport = mock.calls.lock()[2]
            .get_header("Transport")
            .map(str::to_string);
        assert_eq!(
            transport.as_deref(),
            Some("RTP/AVP;unicast;client_port=0-1")
        );

        session.close();
        assert!(session.transport.lock().is_none());
    }

    #[test]
    fn bad_multicast_address_is_setup_failure() {
        let mock = Arc::new(MockConnection::default());
        let config = ClientConfig {
            delivery_mode: DeliveryMode::Multicast,
            multicast_address: "not-an-ip".to_string(),
            ..config()
        };
        let session = ClientSession::new(config, mock.clone());
        assert_eq!(
            session.open().unwrap_err().code,
            ClientErrorCode::SetupFailed
        );
        assert!(!mock.methods().contains(&Method::Play));
    }
}
