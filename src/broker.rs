use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};

use crate::transport::Transport;

/// Arbitrates family B's single duplex UDP socket between the video
/// transport (which owns creation/close/replacement) and the RC transport
/// (which only ever holds a borrowed reference). No locks are needed on the
/// hot path beyond this one: only the scheduler calls `send_to`, only the
/// video receive loop calls `recv`, and replacement is serialized by the
/// supervisor through `set_socket`.
#[derive(Default)]
pub struct SocketBroker {
    current: Mutex<Option<Arc<UdpSocket>>>,
}

impl SocketBroker {
    pub fn new() -> SocketBroker {
        SocketBroker::default()
    }

    pub fn set_socket(&self, socket: Arc<UdpSocket>) {
        *self.current.lock().expect("broker lock poisoned") = Some(socket);
    }

    pub fn clear(&self) {
        *self.current.lock().expect("broker lock poisoned") = None;
    }

    pub fn current(&self) -> Option<Arc<UdpSocket>> {
        self.current.lock().expect("broker lock poisoned").clone()
    }

    /// Sends through whichever socket is current. Any failure, including the
    /// window where the video layer just tore the socket down, is swallowed:
    /// the caller simply skips this tick's packet.
    pub fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> bool {
        match self.current() {
            Some(sock) => sock.send_to(bytes, addr).is_ok(),
            None => false,
        }
    }
}

/// `Transport` for the RC side of family B's shared socket. Send goes
/// through whichever socket the video transport currently has installed;
/// this side never receives, since the video receive loop owns `recv` on
/// the one socket both sides share. `close` clears the broker outright,
/// which is safe even if the video side already tore it down first.
pub struct BrokeredTransport {
    broker: Arc<SocketBroker>,
    addr: SocketAddr,
}

impl BrokeredTransport {
    pub fn new(broker: Arc<SocketBroker>, addr: SocketAddr) -> BrokeredTransport {
        BrokeredTransport { broker, addr }
    }
}

impl Transport for BrokeredTransport {
    fn send(&self, bytes: &[u8]) -> bool {
        self.broker.send_to(bytes, self.addr)
    }

    fn recv(&self) -> Option<Vec<u8>> {
        None
    }

    fn close(&self) {
        self.broker.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_is_a_noop_before_any_socket_is_set() {
        let broker = SocketBroker::new();
        assert!(!broker.send_to(&[1, 2, 3], "127.0.0.1:9".parse().unwrap()));
    }

    #[test]
    fn send_succeeds_once_a_socket_is_installed() {
        let broker = SocketBroker::new();
        let sock = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let target = sock.local_addr().unwrap();
        broker.set_socket(sock);
        assert!(broker.send_to(&[1, 2, 3], target));
    }

    #[test]
    fn brokered_transport_close_clears_the_broker() {
        let broker = Arc::new(SocketBroker::new());
        let sock = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let target = sock.local_addr().unwrap();
        broker.set_socket(sock);

        let transport = BrokeredTransport::new(broker.clone(), target);
        assert!(transport.send(&[1, 2, 3]));
        assert!(transport.recv().is_none());

        transport.close();
        assert!(!transport.send(&[1, 2, 3]));
    }
}
