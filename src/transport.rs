use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Capability set every family's control/video transport implements.
/// `recv` blocks up to its own bounded timeout and returns `None` on timeout
/// or on a transient error (e.g. a shared socket mid-swap); callers treat
/// both identically.
pub trait Transport: Send {
    fn send(&self, bytes: &[u8]) -> bool;
    fn recv(&self) -> Option<Vec<u8>>;
    fn close(&self);
}

/// A UDP socket paired with a fixed remote address. Covers the owned-socket
/// shape used by family A's control and video sockets, family C's control
/// and heartbeat sockets, and family B's duplex video/RC socket; family B's
/// broker-arbitrated RC side has its own `Transport` impl in `broker.rs`
/// since it never owns the socket outright.
///
/// `close` is a flag, not a syscall: the underlying socket still closes on
/// drop. Setting it makes further `send`/`recv` calls no-ops so a transport
/// that outlives its owning loop by a few instructions can't keep talking.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    addr: SocketAddr,
    closed: AtomicBool,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>, addr: SocketAddr) -> UdpTransport {
        UdpTransport { socket, addr, closed: AtomicBool::new(false) }
    }

    /// Hands out the underlying socket handle, e.g. to install into
    /// family B's `SocketBroker` for the RC side to send through.
    pub fn socket_handle(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }
}

impl Transport for UdpTransport {
    fn send(&self, bytes: &[u8]) -> bool {
        !self.closed.load(Ordering::Relaxed) && self.socket.send_to(bytes, self.addr).is_ok()
    }

    fn recv(&self) -> Option<Vec<u8>> {
        if self.closed.load(Ordering::Relaxed) {
            return None;
        }
        let mut buf = [0u8; 2048];
        match self.socket.recv(&mut buf) {
            Ok(n) => Some(buf[..n].to_vec()),
            Err(_) => None,
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Link-health counters, updated by a transport and its watchdog.
#[derive(Debug, Default)]
pub struct LinkHealth {
    last_frame_micros: AtomicU64,
    last_packet_micros: AtomicU64,
    retry_attempts: AtomicU64,
    retry_successes: AtomicU64,
    frames_ok: AtomicU64,
    frames_dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl LinkHealth {
    pub fn new() -> LinkHealth {
        LinkHealth::default()
    }

    pub fn note_packet(&self, epoch: Instant) {
        self.last_packet_micros.store(elapsed_micros(epoch), Ordering::Relaxed);
    }

    pub fn note_frame(&self, epoch: Instant) {
        self.frames_ok.fetch_add(1, Ordering::Relaxed);
        self.last_frame_micros.store(elapsed_micros(epoch), Ordering::Relaxed);
    }

    pub fn note_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_retry_attempt(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_retry_success(&self) {
        self.retry_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the last packet was seen, relative to `epoch`.
    pub fn silence_since(&self, epoch: Instant) -> Duration {
        let last = self.last_packet_micros.load(Ordering::Relaxed);
        Duration::from_micros(elapsed_micros(epoch).saturating_sub(last))
    }

    pub fn frames_ok(&self) -> u64 {
        self.frames_ok.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

fn elapsed_micros(epoch: Instant) -> u64 {
    Instant::now().saturating_duration_since(epoch).as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_grows_until_a_packet_is_noted() {
        let epoch = Instant::now();
        let health = LinkHealth::new();
        std::thread::sleep(Duration::from_millis(5));
        assert!(health.silence_since(epoch) >= Duration::from_millis(5));
        health.note_packet(epoch);
        assert!(health.silence_since(epoch) < Duration::from_millis(5));
    }

    #[test]
    fn udp_transport_round_trips_until_closed() {
        let a = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let b = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        b.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        let b_addr = b.local_addr().unwrap();

        let to_b = UdpTransport::new(a, b_addr);
        assert!(to_b.send(&[1, 2, 3]));

        let mut buf = [0u8; 8];
        let n = b.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);

        to_b.close();
        assert!(!to_b.send(&[4, 5, 6]));
        assert!(to_b.recv().is_none());
    }
}
