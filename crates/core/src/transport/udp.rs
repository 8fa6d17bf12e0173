use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::Result;

/// Largest datagram a UDP socket can hand back.
const MAX_DATAGRAM: usize = 65_536;

/// Where RTP datagrams are received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unicast {
        port: u16,
    },
    Multicast {
        group: Ipv4Addr,
        port: u16,
        ttl: u32,
    },
}

impl Endpoint {
    fn port(&self) -> u16 {
        match self {
            Self::Unicast { port } | Self::Multicast { port, .. } => *port,
        }
    }
}

/// UDP transport for inbound RTP delivery.
///
/// Binds `0.0.0.0:<port>` (joining the group for multicast) and hands every
/// datagram to a callback on a dedicated receive thread. The socket is
/// polled with the receive timeout so that [`stop`](Self::stop) returns
/// within one timeout period.
pub struct UdpReceiver {
    endpoint: Endpoint,
    receive_timeout: Duration,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl UdpReceiver {
    pub fn new(endpoint: Endpoint, receive_timeout: Duration) -> Self {
        Self {
            endpoint,
            receive_timeout,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            local_addr: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Bind the socket and start the receive thread. Starting a running
    /// receiver is a no-op.
    pub fn start<F>(&mut self, on_datagram: F) -> Result<()>
    where
        F: Fn(&[u8]) + Send + 'static,
    {
        if self.worker.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            self.endpoint.port(),
        ))?;
        // a zero read timeout is rejected by the OS
        socket.set_read_timeout(Some(self.receive_timeout.max(Duration::from_millis(10))))?;

        if let Endpoint::Multicast { group, ttl, .. } = &self.endpoint {
            socket.join_multicast_v4(group, &Ipv4Addr::UNSPECIFIED)?;
            socket.set_multicast_ttl_v4(*ttl)?;
        }

        let local_addr = socket.local_addr()?;
        tracing::info!(%local_addr, endpoint = ?self.endpoint, "RTP receiver started");

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let endpoint = self.endpoint.clone();
        let worker = thread::Builder::new()
            .name("rtp-udp-receiver".to_string())
            .spawn(move || receive_loop(socket, endpoint, running, on_datagram))?;

        self.worker = Some(worker);
        self.local_addr = Some(local_addr);
        Ok(())
    }

    /// Stop the receive thread and release the socket. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("RTP receive thread panicked");
            }
            tracing::info!(local_addr = ?self.local_addr, "RTP receiver stopped");
        }
        self.local_addr = None;
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop<F>(socket: UdpSocket, endpoint: Endpoint, running: Arc<AtomicBool>, on_datagram: F)
where
    F: Fn(&[u8]),
{
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => on_datagram(&buf[..len]),
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "UDP receive error");
                }
            }
        }
    }

    if let Endpoint::Multicast { group, .. } = endpoint
        && let Err(e) = socket.leave_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
    {
        tracing::debug!(error = %e, %group, "leaving multicast group failed");
    }
    tracing::debug!("receive loop exited");
}
