// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! TCP implementation of [`Transport`].
//!
//! Connection attempts run on a background thread, name resolution included,
//! so a slow resolver never holds up the caller. A failed attempt moves the
//! channel to `TransientFailure` and retries after an exponential backoff
//! (1s doubling up to 30s) until it connects or the channel shuts down. Once
//! connected, a monitor thread watches the socket for EOF so a dropped server
//! is noticed without waiting for the next send.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::lock;
use crate::transport::{ChannelState, StateCell, Transport, WatchQueue, WatchTag};
use crate::TransportError;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Client channel to a gvs server over TCP.
#[derive(Debug, Clone)]
pub struct TcpChannel {
    inner: Arc<TcpInner>,
}

#[derive(Debug)]
struct TcpInner {
    address: String,
    connect_timeout: Duration,
    cell: Arc<StateCell>,
    link: Mutex<Link>,
}

#[derive(Debug, Default)]
struct Link {
    stream: Option<TcpStream>,
    /// Bumped on every installed stream so stale monitors can tell they lost.
    generation: u64,
    attempting: bool,
}

impl TcpChannel {
    /// Start connecting to `address` in the background. Only the `host:port`
    /// shape is checked here; the host is resolved again on every attempt, and
    /// each individual connect is bounded by `connect_timeout`.
    pub fn open(address: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        if !is_host_port(address) {
            return Err(TransportError::NoAddress(address.to_string()));
        }
        let channel = Self {
            inner: Arc::new(TcpInner {
                address: address.to_string(),
                connect_timeout: connect_timeout.max(Duration::from_millis(1)),
                cell: Arc::new(StateCell::new(ChannelState::Idle)),
                link: Mutex::new(Link::default()),
            }),
        };
        TcpInner::start_connecting(&channel.inner);
        Ok(channel)
    }

    /// Address the channel was opened with.
    pub fn address(&self) -> &str {
        &self.inner.address
    }
}

impl TcpInner {
    fn start_connecting(this: &Arc<Self>) {
        {
            let mut link = lock(&this.link);
            if link.attempting || this.cell.get() == ChannelState::Shutdown {
                return;
            }
            link.attempting = true;
        }
        let worker = Arc::clone(this);
        let spawned = thread::Builder::new()
            .name("gvs-tcp-connect".into())
            .spawn(move || worker.connect_loop());
        if let Err(err) = spawned {
            warn!(%err, "could not spawn connect thread");
            lock(&this.link).attempting = false;
            this.cell.set(ChannelState::TransientFailure);
        }
    }

    fn connect_loop(self: Arc<Self>) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if !self.cell.set(ChannelState::Connecting) {
                break;
            }
            match self.try_connect() {
                Ok(stream) => {
                    self.install(stream);
                    break;
                }
                Err(err) => {
                    debug!(address = %self.address, %err, retry_in = ?backoff, "connect attempt failed");
                    self.cell.set(ChannelState::TransientFailure);
                    if self.cell.wait_for_shutdown(backoff) {
                        break;
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
        lock(&self.link).attempting = false;
    }

    fn try_connect(&self) -> Result<TcpStream, TransportError> {
        let addrs: Vec<SocketAddr> = self
            .address
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                address: self.address.clone(),
                source,
            })?
            .collect();
        let mut last_err = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.map_or_else(
            || TransportError::NoAddress(self.address.clone()),
            TransportError::Io,
        ))
    }

    fn install(self: &Arc<Self>, stream: TcpStream) {
        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(err) => {
                warn!(%err, "could not clone socket for monitoring");
                self.cell.set(ChannelState::TransientFailure);
                return;
            }
        };
        let generation = {
            let mut link = lock(&self.link);
            if self.cell.get() == ChannelState::Shutdown {
                let _ = stream.shutdown(Shutdown::Both);
                return;
            }
            link.generation += 1;
            link.stream = Some(stream);
            link.generation
        };
        info!(address = %self.address, "connected");
        self.cell.set(ChannelState::Ready);

        let monitor = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("gvs-tcp-monitor".into())
            .spawn(move || monitor.monitor(reader, generation));
        if let Err(err) = spawned {
            // sends still detect a dead peer
            warn!(%err, "could not spawn socket monitor");
        }
    }

    /// Read until EOF or error; the server never writes to clients.
    fn monitor(&self, mut reader: TcpStream, generation: u64) {
        let mut scratch = [0u8; 256];
        loop {
            match reader.read(&mut scratch) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        self.drop_link(generation);
    }

    fn drop_link(&self, generation: u64) {
        let mut link = lock(&self.link);
        if link.generation != generation {
            return;
        }
        let stream = link.stream.take();
        drop(link);
        if let Some(stream) = stream {
            let _ = stream.shutdown(Shutdown::Both);
            info!(address = %self.address, "connection lost");
            self.cell.set(ChannelState::TransientFailure);
        }
    }
}

/// `ip:port`, `[v6]:port` or `host:port` with a numeric port.
fn is_host_port(address: &str) -> bool {
    if address.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match address.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(char::is_whitespace) && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

impl Transport for TcpChannel {
    fn state(&self, try_to_connect: bool) -> ChannelState {
        let state = self.inner.cell.get();
        if try_to_connect && matches!(state, ChannelState::Idle | ChannelState::TransientFailure)
        {
            TcpInner::start_connecting(&self.inner);
        }
        state
    }

    fn wait_for_connected(&self, deadline: Instant) -> bool {
        self.state(true);
        self.inner
            .cell
            .wait_until(deadline, |s| {
                matches!(s, ChannelState::Ready | ChannelState::Shutdown)
            })
            == Some(ChannelState::Ready)
    }

    fn notify_on_state_change(
        &self,
        last_observed: ChannelState,
        deadline: Instant,
        queue: &Arc<WatchQueue>,
        tag: WatchTag,
    ) {
        self.inner.cell.watch(last_observed, deadline, queue, tag);
    }

    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut link = lock(&self.inner.link);
        let generation = link.generation;
        let Some(stream) = link.stream.as_mut() else {
            return Err(TransportError::NotReady);
        };
        match stream.write_all(bytes).and_then(|()| stream.flush()) {
            Ok(()) => Ok(()),
            Err(err) => {
                drop(link);
                self.inner.drop_link(generation);
                Err(err.into())
            }
        }
    }

    fn shutdown(&self) {
        self.inner.cell.set(ChannelState::Shutdown);
        if let Some(stream) = lock(&self.inner.link).stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        debug!(address = %self.inner.address, "channel shut down");
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connects_to_a_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let channel = TcpChannel::open(&addr, Duration::from_secs(1)).unwrap();
        assert!(channel.wait_for_connected(Instant::now() + Duration::from_secs(2)));
        assert_eq!(channel.state(false), ChannelState::Ready);

        let (mut accepted, _) = listener.accept().unwrap();
        channel.send(b"ping").unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        channel.shutdown();
        assert_eq!(channel.state(true), ChannelState::Shutdown);
    }

    #[test]
    fn refused_connection_is_a_transient_failure() {
        // grab a free port, then close it so nothing listens there
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let channel =
            TcpChannel::open(&format!("127.0.0.1:{port}"), Duration::from_millis(100)).unwrap();
        let start = Instant::now();
        assert!(!channel.wait_for_connected(start + Duration::from_millis(100)));
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(matches!(
            channel.send(b"x"),
            Err(TransportError::NotReady)
        ));
        channel.shutdown();
    }

    #[test]
    fn peer_close_is_noticed_by_the_monitor() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let channel = TcpChannel::open(&addr, Duration::from_secs(1)).unwrap();
        assert!(channel.wait_for_connected(Instant::now() + Duration::from_secs(2)));
        let (accepted, _) = listener.accept().unwrap();
        drop(accepted);
        drop(listener);

        let lost = channel.inner.cell.wait_until(
            Instant::now() + Duration::from_secs(2),
            |s| s != ChannelState::Ready,
        );
        assert!(matches!(
            lost,
            Some(ChannelState::TransientFailure | ChannelState::Connecting)
        ));
        channel.shutdown();
    }

    #[test]
    fn malformed_addresses_are_rejected_up_front() {
        for bad in ["not an address", "localhost", ":50055", "host:port", "a b:1"] {
            assert!(
                matches!(
                    TcpChannel::open(bad, Duration::from_millis(10)),
                    Err(TransportError::NoAddress(_))
                ),
                "{bad}"
            );
        }
        assert!(is_host_port("127.0.0.1:0"));
        assert!(is_host_port("[::1]:50055"));
        assert!(is_host_port("localhost:50055"));
    }

    #[test]
    fn name_resolution_happens_off_the_caller_thread() {
        // `.invalid` never resolves; the lookup runs on the connect thread
        let start = Instant::now();
        let channel = TcpChannel::open("gvs-hub.invalid:50055", Duration::from_millis(50)).unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(!channel.wait_for_connected(start + Duration::from_millis(150)));
        assert!(start.elapsed() < Duration::from_millis(600));
        assert_ne!(channel.state(false), ChannelState::Ready);
        channel.shutdown();
    }
}
