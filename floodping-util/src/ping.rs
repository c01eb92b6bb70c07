use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use pnet::packet::icmp::IcmpTypes;
use tokio::time::{sleep, timeout_at, Instant};

use floodping_network::error::PingError;
use floodping_network::icmp::{build_echo_request, parse_reply, ReplyFrame};
use floodping_network::socket::EchoSocket;

use crate::context::RunContext;

// What tokio's sleep falls back to when a deadline does not fit in an Instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// A matched echo reply.
#[derive(Debug, Clone, PartialEq)]
pub struct EchoReply {
    /// ICMP bytes, IP header excluded.
    pub bytes: usize,
    pub source: Ipv4Addr,
    pub sequence: u16,
    pub ttl: u8,
    pub round_trip_ms: f64,
}

impl fmt::Display for EchoReply {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} bytes from {}: icmp_seq={} ttl={} time={:.3} ms",
            self.bytes, self.source, self.sequence, self.ttl, self.round_trip_ms
        )
    }
}

/// The identifier every request of this process carries.
pub fn process_identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}

/// Sends echo requests to one destination and waits for the matching replies.
pub struct Pinger<S: EchoSocket> {
    socket: Arc<S>,
    context: Arc<RunContext>,
    destination: Ipv4Addr,
    identifier: u16,
    sequence_number: u16,
    receive_timeout: Duration,
    send_interval: Duration,
}

impl<S: EchoSocket> Pinger<S> {
    pub fn new(
        socket: Arc<S>,
        context: Arc<RunContext>,
        destination: Ipv4Addr,
        identifier: u16,
        receive_timeout: Duration,
        send_interval: Duration,
    ) -> Self {
        Pinger {
            socket,
            context,
            destination,
            identifier,
            sequence_number: 0,
            receive_timeout,
            send_interval,
        }
    }

    /// Pings until the run is stopped, printing one line per request.
    pub async fn run(&mut self) {
        while self.context.is_running() {
            match self.ping_once().await {
                Ok(reply) => println!("{}", reply),
                Err(err @ PingError::ReceiveTimeout { .. }) => println!("{}", err),
                Err(PingError::Interrupted) => break,
                Err(err) => warn!("{}", err),
            }
            tokio::select! {
                _ = self.context.stopped() => break,
                _ = sleep(self.send_interval) => {}
            }
        }
        debug!("echo loop stopped after {} requests", self.sequence_number);
    }

    /// Sends the next request and waits for its reply or the receive timeout.
    ///
    /// The transmitted counter counts the attempt even when sending fails.
    /// Frames that are not the reply to this request are dropped without
    /// extending the wait.
    pub async fn ping_once(&mut self) -> Result<EchoReply, PingError> {
        let sequence = self.sequence_number;
        self.sequence_number = self.sequence_number.wrapping_add(1);

        let frame = build_echo_request(sequence, self.identifier);
        let sent_at = Instant::now();
        self.context.record_transmit();
        self.socket
            .send_to_addr(&frame, self.destination)
            .await
            .map_err(PingError::Send)?;

        let deadline = sent_at
            .checked_add(self.receive_timeout)
            .unwrap_or_else(|| sent_at + FAR_FUTURE);
        loop {
            let received = tokio::select! {
                _ = self.context.stopped() => return Err(PingError::Interrupted),
                received = timeout_at(deadline, self.socket.recv_from_addr()) => received,
            };
            let inbound = match received {
                Err(_) => return Err(PingError::ReceiveTimeout { sequence }),
                Ok(Err(err)) => return Err(PingError::Receive(err)),
                Ok(Ok(received)) => received,
            };
            let frame = match self.match_reply(&inbound.data, sequence) {
                Some(frame) => frame,
                None => continue,
            };

            self.context.record_reply();
            let round_trip = inbound.received_at.saturating_duration_since(sent_at);
            return Ok(EchoReply {
                bytes: frame.icmp_length,
                source: inbound.source,
                sequence,
                ttl: frame.ttl,
                round_trip_ms: round_trip.as_secs_f64() * 1000.0,
            });
        }
    }

    // Only an echo reply carrying our identifier and the pending sequence
    // counts. Late replies to earlier requests are dropped.
    fn match_reply(&self, buf: &[u8], sequence: u16) -> Option<ReplyFrame> {
        let frame = match parse_reply(buf) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("discarding frame: {}", err);
                return None;
            }
        };
        if frame.icmp_type != IcmpTypes::EchoReply {
            debug!(
                "discarding icmp type {} code {} from {}",
                frame.icmp_type.0, frame.icmp_code.0, frame.source
            );
            return None;
        }
        if frame.identifier != self.identifier {
            trace!("discarding reply for identifier {}", frame.identifier);
            return None;
        }
        if frame.sequence != sequence {
            debug!(
                "discarding stale reply icmp_seq={} while waiting for icmp_seq={}",
                frame.sequence, sequence
            );
            return None;
        }
        Some(frame)
    }
}
