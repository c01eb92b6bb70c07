use std::{fmt, io};

/// Everything that can go wrong during a run.
///
/// Only the setup classes (`Argument`, `PermissionDenied`, `SocketConfig`)
/// end the process; the others are absorbed by the loop that produced them.
#[derive(Debug)]
pub enum PingError {
    Argument(String),
    PermissionDenied(io::Error),
    SocketConfig(io::Error),
    Send(io::Error),
    ReceiveTimeout { sequence: u16 },
    Receive(io::Error),
    MalformedFrame(String),
    MonitorSampleUnavailable(String),
    /// The pending request was abandoned because the run is shutting down.
    Interrupted,
}

impl PingError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PingError::Argument(_) | PingError::PermissionDenied(_) | PingError::SocketConfig(_)
        )
    }
}

impl fmt::Display for PingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PingError::Argument(reason) => write!(f, "invalid argument: {}", reason),
            PingError::PermissionDenied(err) => {
                write!(f, "socket: {} (must run as root or have CAP_NET_RAW)", err)
            }
            PingError::SocketConfig(err) => write!(f, "socket configuration rejected: {}", err),
            PingError::Send(err) => write!(f, "sendto: {}", err),
            PingError::ReceiveTimeout { sequence } => {
                write!(f, "Request timeout for icmp_seq={}", sequence)
            }
            PingError::Receive(err) => write!(f, "recvfrom: {}", err),
            PingError::MalformedFrame(reason) => write!(f, "malformed frame: {}", reason),
            PingError::MonitorSampleUnavailable(reason) => {
                write!(f, "icmp counter unavailable: {}", reason)
            }
            PingError::Interrupted => write!(f, "echo request interrupted by shutdown"),
        }
    }
}

impl std::error::Error for PingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PingError::PermissionDenied(err)
            | PingError::SocketConfig(err)
            | PingError::Send(err)
            | PingError::Receive(err) => Some(err),
            _ => None,
        }
    }
}
