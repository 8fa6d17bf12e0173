use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, RtspError};
use crate::protocol::auth::{Challenge, Credentials};
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::uri::RtspUri;
use crate::session::{Connection, PacketHandler};

/// Used for connect and response waits until timeouts are configured.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest message body accepted from the peer. SDP bodies are a few KiB.
const MAX_BODY_LEN: usize = 1024 * 1024;

/// Largest single header line, and largest complete message head.
const MAX_LINE_LEN: usize = 8 * 1024;
const MAX_HEAD_LEN: usize = 64 * 1024;

/// One message read off the control connection.
enum Inbound {
    Response(RtspResponse),
    /// `$` framed data (RFC 2326 §10.12).
    Interleaved { channel: u8, data: Vec<u8> },
    /// Something we do not act on, e.g. a server-to-client request.
    Ignored,
    Eof,
}

/// The accepted challenge and how many requests have used its nonce.
struct AuthState {
    challenge: Challenge,
    nonce_count: u32,
}

/// Write side of an open connection plus the reader's response queue.
struct Link {
    writer: TcpStream,
    responses: Receiver<RtspResponse>,
    reader: Option<JoinHandle<()>>,
}

/// RTSP control connection over TCP.
///
/// A reader thread demultiplexes the stream: responses are queued for the
/// caller of [`invoke`](Connection::invoke) and interleaved frames go
/// straight to the installed [`PacketHandler`]. Requests are serialized by
/// holding the link for the whole exchange and are matched to responses
/// by `CSeq`.
///
/// A `401` is answered once per request with credentials, using the
/// strongest challenge offered (Digest before Basic). The accepted
/// challenge is reused for later requests with an increasing nonce count
/// and replaced whenever the server challenges again, e.g. on a stale
/// nonce.
pub struct TcpConnection {
    link: Mutex<Option<Link>>,
    /// Clone of the stream used to shut it down from any thread.
    control: Mutex<Option<TcpStream>>,
    handler: Arc<RwLock<Option<PacketHandler>>>,
    credentials: Mutex<Credentials>,
    auth: Mutex<Option<AuthState>>,
    receive_timeout: Mutex<Duration>,
    opened: AtomicBool,
    connected: Arc<AtomicBool>,
    cseq: AtomicU32,
}

impl Default for TcpConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpConnection {
    pub fn new() -> Self {
        Self {
            link: Mutex::new(None),
            control: Mutex::new(None),
            handler: Arc::new(RwLock::new(None)),
            credentials: Mutex::new(Credentials::default()),
            auth: Mutex::new(None),
            receive_timeout: Mutex::new(DEFAULT_TIMEOUT),
            opened: AtomicBool::new(false),
            connected: Arc::new(AtomicBool::new(false)),
            cseq: AtomicU32::new(1),
        }
    }

    fn exchange(&self, link: &mut Link, mut request: RtspRequest) -> Result<RtspResponse> {
        let cseq = self.cseq.fetch_add(1, Ordering::SeqCst);
        request.set_header("CSeq", &cseq.to_string());
        if let Some(auth) = self.auth.lock().as_mut() {
            auth.nonce_count = auth.nonce_count.wrapping_add(1);
            let value = auth.challenge.authorization(
                &self.credentials.lock(),
                request.method,
                &request.uri,
                auth.nonce_count,
            );
            request.set_header("Authorization", &value);
        }

        tracing::debug!(method = %request.method, uri = %request.uri, cseq, "request");
        link.writer.write_all(request.serialize().as_bytes())?;

        let deadline = Instant::now() + *self.receive_timeout.lock();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match link.responses.recv_timeout(remaining) {
                Ok(response) if response.cseq().is_none_or(|c| c == cseq) => {
                    tracing::debug!(
                        cseq,
                        status = response.status_code,
                        reason = %response.status_text,
                        "response"
                    );
                    return Ok(response);
                }
                Ok(stale) => {
                    tracing::debug!(expected = cseq, got = ?stale.cseq(), "dropping stale response");
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(RtspError::Timeout {
                        method: request.method.to_string(),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => return Err(RtspError::ConnectionClosed),
            }
        }
    }

    fn shutdown(&self) {
        if let Some(stream) = self.control.lock().take() {
            // already-closed sockets report NotConnected here
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.opened.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Connection for TcpConnection {
    fn open(&self, uri: &RtspUri, credentials: &Credentials) -> Result<()> {
        if self.opened.load(Ordering::SeqCst) {
            return Err(RtspError::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                "connection already open",
            )));
        }

        let timeout = *self.receive_timeout.lock();
        let addr = uri
            .authority()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| RtspError::InvalidUri(uri.to_string()))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;

        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        let (tx, rx) = mpsc::channel();
        let handler = self.handler.clone();
        let connected = self.connected.clone();
        connected.store(true, Ordering::SeqCst);
        let reader = thread::Builder::new()
            .name("rtsp-tcp-reader".to_string())
            .spawn(move || read_loop(BufReader::new(reader), tx, handler, connected))?;

        *self.credentials.lock() = credentials.clone();
        *self.auth.lock() = None;
        *self.control.lock() = Some(control);
        *self.link.lock() = Some(Link {
            writer: stream,
            responses: rx,
            reader: Some(reader),
        });
        self.opened.store(true, Ordering::SeqCst);

        tracing::info!(%addr, "control connection opened");
        Ok(())
    }

    fn configure_timeouts(&self, receive: Duration, send: Duration) -> Result<()> {
        let guard = self.link.lock();
        let link = guard.as_ref().ok_or(RtspError::NotConnected)?;
        link.writer.set_write_timeout(Some(send))?;
        *self.receive_timeout.lock() = receive;
        Ok(())
    }

    fn invoke(&self, request: RtspRequest) -> Result<RtspResponse> {
        let mut guard = self.link.lock();
        let link = guard.as_mut().ok_or(RtspError::NotConnected)?;

        let retry = request.clone();
        let response = self.exchange(link, request)?;
        if response.status_code != 401 || self.credentials.lock().is_empty() {
            return Ok(response);
        }

        let offered = response
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("WWW-Authenticate"))
            .map(|(_, value)| value.as_str());
        let challenge = Challenge::select(offered)?;
        let replaced = self
            .auth
            .lock()
            .replace(AuthState {
                challenge,
                nonce_count: 0,
            })
            .is_some();
        tracing::debug!(replaced, "retrying with credentials");

        self.exchange(link, retry)
    }

    fn close(&self) {
        self.shutdown();
        let link = self.link.lock().take();
        if let Some(mut link) = link
            && let Some(reader) = link.reader.take()
            && reader.join().is_err()
        {
            tracing::warn!("control reader thread panicked");
        }
        tracing::debug!("control connection closed");
    }

    fn abort(&self) {
        self.shutdown();
        // An exchange in flight holds the link; it fails on its own once
        // the socket is shut down and the next open replaces the link.
        if let Some(mut guard) = self.link.try_lock() {
            guard.take();
        }
        tracing::debug!("control connection aborted");
    }

    fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.opened.load(Ordering::SeqCst) && self.connected.load(Ordering::SeqCst)
    }

    fn set_packet_handler(&self, handler: Option<PacketHandler>) {
        *self.handler.write() = handler;
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reader thread body. Exits on EOF, read error, or once the connection
/// is dropped.
fn read_loop(
    mut reader: BufReader<TcpStream>,
    responses: Sender<RtspResponse>,
    handler: Arc<RwLock<Option<PacketHandler>>>,
    connected: Arc<AtomicBool>,
) {
    let reason = loop {
        match read_inbound(&mut reader) {
            Ok(Inbound::Response(response)) => {
                if responses.send(response).is_err() {
                    break "connection dropped";
                }
            }
            Ok(Inbound::Interleaved { channel, data }) => {
                let handler = handler.read().clone();
                if let Some(handler) = handler {
                    handler(channel, &data);
                }
            }
            Ok(Inbound::Ignored) => {}
            Ok(Inbound::Eof) => break "connection closed by server",
            Err(e) => {
                tracing::debug!(error = %e, "control read failed");
                break "read error";
            }
        }
    };

    connected.store(false, Ordering::SeqCst);
    tracing::debug!(reason, "control reader exited");
}

fn read_inbound(reader: &mut BufReader<TcpStream>) -> std::io::Result<Inbound> {
    let first = match reader.fill_buf()? {
        [] => return Ok(Inbound::Eof),
        [b, ..] => *b,
    };

    if first == b'$' {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header)?;
        let len = u16::from_be_bytes([header[2], header[3]]) as usize;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        return Ok(Inbound::Interleaved {
            channel: header[1],
            data,
        });
    }

    let mut head = String::new();
    loop {
        let mut line = String::new();
        if read_line_bounded(reader, &mut line)? == 0 {
            return Ok(Inbound::Eof);
        }
        if head.is_empty() && line.trim().is_empty() {
            // stray CRLF between messages
            return Ok(Inbound::Ignored);
        }
        head.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
        if head.len() > MAX_HEAD_LEN {
            return Err(invalid_data(format!("message head exceeds {MAX_HEAD_LEN} bytes")));
        }
    }

    match RtspResponse::parse_head(&head) {
        Ok(mut response) => {
            let len = body_len(response.content_length())?;
            if len > 0 {
                let mut body = vec![0u8; len];
                reader.read_exact(&mut body)?;
                response.body = Some(String::from_utf8_lossy(&body).into_owned());
            }
            Ok(Inbound::Response(response))
        }
        Err(e) => {
            // Server requests (ANNOUNCE, SET_PARAMETER) are not answered,
            // but their bodies still have to be consumed.
            let len = body_len(content_length(&head))?;
            if len > 0 {
                let mut body = vec![0u8; len];
                reader.read_exact(&mut body)?;
            }
            tracing::debug!(error = %e, "ignoring inbound message");
            Ok(Inbound::Ignored)
        }
    }
}

/// `read_line` that refuses lines longer than [`MAX_LINE_LEN`].
fn read_line_bounded(reader: &mut BufReader<TcpStream>, line: &mut String) -> std::io::Result<usize> {
    let read = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64 + 1)
        .read_line(line)?;
    if line.len() > MAX_LINE_LEN && !line.ends_with('\n') {
        return Err(invalid_data(format!("header line exceeds {MAX_LINE_LEN} bytes")));
    }
    Ok(read)
}

fn body_len(len: usize) -> std::io::Result<usize> {
    if len > MAX_BODY_LEN {
        return Err(invalid_data(format!(
            "Content-Length {len} exceeds {MAX_BODY_LEN} bytes"
        )));
    }
    Ok(len)
}

fn invalid_data(message: String) -> std::io::Error {
    std::io::Error::new(ErrorKind::InvalidData, message)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}
