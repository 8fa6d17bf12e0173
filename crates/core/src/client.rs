use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::media::H264ParserConfig;
use crate::session::{ClientSession, Connection, ObserverId, SessionEvent, SessionObserver, Signal};
use crate::transport::TcpConnection;

/// Grace period used when the client is dropped while communicating.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

struct Worker {
    stop: Arc<Signal>,
    finished: Arc<Signal>,
    handle: JoinHandle<()>,
}

/// Keeps one [`ClientSession`] playing.
///
/// A background worker opens the session, pings it every
/// `keep_alive_interval`, reopens it after `retries_interval` when it
/// fails, and closes it when communication is stopped. Stopping is bounded
/// by a timeout after which the session is aborted.
pub struct RtspClient {
    session: Arc<ClientSession>,
    worker: Mutex<Option<Worker>>,
}

impl RtspClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connection(config, Arc::new(TcpConnection::new()))
    }

    pub fn with_connection(config: ClientConfig, connection: Arc<dyn Connection>) -> Self {
        Self {
            session: Arc::new(ClientSession::new(config, connection)),
            worker: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) -> ObserverId {
        self.session.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.session.dispatcher().unsubscribe(id)
    }

    pub fn events(&self) -> Receiver<SessionEvent> {
        self.session.events()
    }

    pub fn parser_config(&self) -> &Arc<H264ParserConfig> {
        self.session.parser_config()
    }

    pub fn is_communication_started(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn wait_for_connection(&self, timeout: Duration) -> bool {
        self.session.wait_for_connection(timeout)
    }

    /// Spawn the supervising worker. Returns `false` if it already runs.
    pub fn start_communication(&self) -> bool {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return false;
        }

        let stop = Arc::new(Signal::new());
        let finished = Arc::new(Signal::new());
        let session = self.session.clone();
        let (s, f) = (stop.clone(), finished.clone());
        let spawned = thread::Builder::new()
            .name("rtsp-client".to_string())
            .spawn(move || {
                session.dispatcher().dispatch(SessionEvent::CommunicationStarted);
                supervise(&session, &s);
                session.dispatcher().dispatch(SessionEvent::CommunicationStopped);
                f.set();
            });

        match spawned {
            Ok(handle) => {
                tracing::info!(uri = %self.session.config().uri, "communication started");
                *worker = Some(Worker {
                    stop,
                    finished,
                    handle,
                });
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn the client worker");
                false
            }
        }
    }

    /// Stop the worker and wait for it to close the session.
    ///
    /// If that takes longer than `timeout` the session is aborted, which
    /// makes any blocked exchange fail so the worker can exit.
    pub fn stop_communication(&self, timeout: Duration) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        worker.stop.set();
        if !worker.finished.wait_timeout(timeout) {
            tracing::warn!(?timeout, "client worker did not stop in time, aborting session");
            self.session.abort();
        }
        if worker.handle.join().is_err() {
            tracing::warn!("client worker panicked");
        }
        tracing::info!(uri = %self.session.config().uri, "communication stopped");
    }
}

impl Drop for RtspClient {
    fn drop(&mut self) {
        self.stop_communication(DEFAULT_SHUTDOWN_TIMEOUT);
    }
}

/// Worker body: open, keep alive, reopen on failure, until `stop` is set.
fn supervise(session: &ClientSession, stop: &Signal) {
    let config = session.config();

    'outer: while !stop.is_set() {
        if let Err(err) = session.open() {
            tracing::debug!(%err, retry_in = ?config.retries_interval, "open failed");
            if stop.wait_timeout(config.retries_interval) {
                break;
            }
            continue;
        }

        loop {
            if stop.wait_timeout(config.keep_alive_interval) {
                break 'outer;
            }
            if !session.is_connected() {
                tracing::warn!("control connection lost, reconnecting");
                break;
            }
            if session.ping().is_err() {
                break;
            }
        }
        session.close();
    }

    session.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    use crate::error::{ClientErrorCode, Result, RtspError};
    use crate::protocol::auth::Credentials;
    use crate::protocol::request::{Method, RtspRequest};
    use crate::protocol::response::RtspResponse;
    use crate::protocol::uri::RtspUri;
    use crate::session::PacketHandler;

    /// Camera stand-in: fails the first `refuse` opens and can stall
    /// TEARDOWN until aborted.
    #[derive(Default)]
    struct ScriptedConnection {
        refuse: AtomicUsize,
        stall_teardown: AtomicBool,
        opened: AtomicBool,
        aborted: Signal,
        pings: AtomicUsize,
    }

    impl Connection for ScriptedConnection {
        fn open(&self, _uri: &RtspUri, _credentials: &Credentials) -> Result<()> {
            let refuse = self.refuse.load(Ordering::SeqCst);
            if refuse > 0 {
                self.refuse.store(refuse - 1, Ordering::SeqCst);
                return Err(RtspError::ConnectionClosed);
            }
            self.aborted.reset();
            self.opened.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn configure_timeouts(&self, _receive: Duration, _send: Duration) -> Result<()> {
            Ok(())
        }

        fn invoke(&self, request: RtspRequest) -> Result<RtspResponse> {
            let response = match request.method {
                Method::Describe => RtspResponse::ok()
                    .with_body("v=0\r\nm=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\n".into()),
                Method::Setup => RtspResponse::ok().add_header("Session", "42"),
                Method::TearDown if self.stall_teardown.load(Ordering::SeqCst) => {
                    self.aborted.wait_timeout(Duration::from_secs(30));
                    return Err(RtspError::ConnectionClosed);
                }
                Method::Options | Method::GetParameter
                    if request.get_header("Session").is_some() =>
                {
                    self.pings.fetch_add(1, Ordering::SeqCst);
                    RtspResponse::ok()
                }
                _ => RtspResponse::ok(),
            };
            Ok(response)
        }

        fn close(&self) {
            self.opened.store(false, Ordering::SeqCst);
        }

        fn abort(&self) {
            self.opened.store(false, Ordering::SeqCst);
            self.aborted.set();
        }

        fn is_opened(&self) -> bool {
            self.opened.load(Ordering::SeqCst)
        }

        fn is_connected(&self) -> bool {
            self.opened.load(Ordering::SeqCst)
        }

        fn set_packet_handler(&self, _handler: Option<PacketHandler>) {}
    }

    fn config() -> ClientConfig {
        ClientConfig {
            uri: "rtsp://cam/live".to_string(),
            retries_interval: Duration::from_millis(50),
            keep_alive_interval: Duration::from_millis(50),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn start_and_stop_cycle() {
        let connection = Arc::new(ScriptedConnection::default());
        let client = RtspClient::with_connection(config(), connection.clone());
        let rx = client.events();

        assert!(client.start_communication());
        assert!(!client.start_communication());
        assert!(client.wait_for_connection(Duration::from_secs(2)));

        // let a few keep-alives through
        let deadline = Instant::now() + Duration::from_secs(2);
        while connection.pings.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(connection.pings.load(Ordering::SeqCst) >= 2);

        client.stop_communication(Duration::from_secs(2));
        assert!(!client.is_communication_started());
        assert!(!client.is_connected());

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events.first(), Some(SessionEvent::CommunicationStarted)));
        assert!(matches!(events.last(), Some(SessionEvent::CommunicationStopped)));
        let connected = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Connected { .. }))
            .count();
        let disconnected = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Disconnected))
            .count();
        assert_eq!((connected, disconnected), (1, 1));
    }

    #[test]
    fn retries_until_open_succeeds() {
        let connection = Arc::new(ScriptedConnection::default());
        connection.refuse.store(2, Ordering::SeqCst);
        let client = RtspClient::with_connection(config(), connection.clone());
        let rx = client.events();

        client.start_communication();
        assert!(client.wait_for_connection(Duration::from_secs(2)));
        client.stop_communication(Duration::from_secs(2));

        let failures = rx
            .try_iter()
            .filter(|e| {
                matches!(e, SessionEvent::Error(err) if err.code == ClientErrorCode::ConnectionFailed)
            })
            .count();
        assert_eq!(failures, 2);
    }

    #[test]
    fn stop_aborts_after_timeout() {
        let connection = Arc::new(ScriptedConnection::default());
        connection.stall_teardown.store(true, Ordering::SeqCst);
        let client = RtspClient::with_connection(config(), connection.clone());

        client.start_communication();
        assert!(client.wait_for_connection(Duration::from_secs(2)));

        let started = Instant::now();
        client.stop_communication(Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!connection.is_opened());
    }

    #[test]
    fn stop_without_start_is_noop() {
        let client = RtspClient::with_connection(config(), Arc::new(ScriptedConnection::default()));
        client.stop_communication(Duration::from_millis(10));
        assert!(!client.is_communication_started());
    }
}
