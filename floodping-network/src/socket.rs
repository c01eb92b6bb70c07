use std::io;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, Shutdown, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::sync::mpsc::{channel, error::TrySendError, Receiver, Sender};
use tokio::time::Instant;

use crate::error::PingError;

const RECV_BUFFER_SIZE: usize = 1024;
const RECV_QUEUE_DEPTH: usize = 1024;

/// A raw frame as the socket handed it over.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub data: Vec<u8>,
    pub source: Ipv4Addr,
    /// Taken by whoever read the frame off the socket, before any queueing.
    pub received_at: Instant,
}

type Received = io::Result<InboundFrame>;

/// What the echo loop needs from a transport.
#[async_trait]
pub trait EchoSocket: Send + Sync {
    async fn send_to_addr(&self, frame: &[u8], destination: Ipv4Addr) -> io::Result<usize>;
    /// Next raw frame with the address it came from. Pending until one arrives.
    async fn recv_from_addr(&self) -> Received;
    /// Releases the transport. Calling it again does nothing.
    fn close(&self);
}

/// A raw ICMP socket.
///
/// A dedicated reader thread blocks on the socket with `SO_RCVTIMEO` and
/// forwards every frame into a channel, so waiting for a frame is an
/// ordinary cancellable future. The reader wakes at least once per receive
/// timeout to notice `close`.
pub struct IcmpSocket {
    socket: Arc<Socket>,
    recv_receiver: tokio::sync::Mutex<Receiver<Received>>,
    closed: Arc<AtomicBool>,
}

impl IcmpSocket {
    pub fn open(receive_timeout: Duration) -> Result<Self, PingError> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(|err| {
            match err.kind() {
                io::ErrorKind::PermissionDenied => PingError::PermissionDenied(err),
                _ => PingError::SocketConfig(err),
            }
        })?;
        socket
            .set_read_timeout(Some(receive_timeout))
            .map_err(PingError::SocketConfig)?;

        let socket = Arc::new(socket);
        let closed = Arc::new(AtomicBool::new(false));
        let (recv_sender, recv_receiver) = channel(RECV_QUEUE_DEPTH);

        let socket_for_recv = socket.clone();
        let closed_for_recv = closed.clone();
        std::thread::Builder::new()
            .name("icmp-recv".into())
            .spawn(move || recv_loop(&socket_for_recv, &closed_for_recv, recv_sender))
            .map_err(PingError::SocketConfig)?;
        debug!("raw icmp socket open, receive timeout {:?}", receive_timeout);

        Ok(IcmpSocket {
            socket,
            recv_receiver: tokio::sync::Mutex::new(recv_receiver),
            closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn recv_loop(socket: &Socket, closed: &AtomicBool, recv_sender: Sender<Received>) {
    let mut buf = [MaybeUninit::<u8>::uninit(); RECV_BUFFER_SIZE];
    loop {
        if closed.load(Ordering::Acquire) {
            return;
        }
        let result = match socket.recv_from(&mut buf) {
            Ok((len, addr)) => {
                let received_at = Instant::now();
                // recv_from initialised the first `len` bytes
                let data: Vec<u8> = buf[..len]
                    .iter()
                    .map(|u| unsafe { u.assume_init() })
                    .collect();
                let source = addr
                    .as_socket_ipv4()
                    .map(|addr| *addr.ip())
                    .unwrap_or(Ipv4Addr::UNSPECIFIED);
                Ok(InboundFrame {
                    data,
                    source,
                    received_at,
                })
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(err) => {
                if closed.load(Ordering::Acquire) {
                    return;
                }
                Err(err)
            }
        };
        match recv_sender.try_send(result) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("receive queue full, dropping frame"),
            Err(TrySendError::Closed(_)) => return,
        }
    }
}

#[async_trait]
impl EchoSocket for IcmpSocket {
    async fn send_to_addr(&self, frame: &[u8], destination: Ipv4Addr) -> io::Result<usize> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "icmp session closed"));
        }
        let addr = SockAddr::from(SocketAddrV4::new(destination, 0));
        self.socket.send_to(frame, &addr)
    }

    async fn recv_from_addr(&self) -> Received {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "icmp session closed"));
        }
        let mut guard = self.recv_receiver.lock().await;
        match guard.recv().await {
            Some(result) => result,
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "icmp session closed")),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // raw sockets are never connected, a failure here is expected
        if let Err(err) = self.socket.shutdown(Shutdown::Both) {
            trace!("shutdown on raw socket: {}", err);
        }
        match self.recv_receiver.try_lock() {
            Ok(mut guard) => guard.close(),
            Err(_) => debug!("closing icmp session while a receive is in flight"),
        }
        debug!("raw icmp socket closed");
    }
}
