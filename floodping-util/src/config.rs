use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
pub const SEND_INTERVAL: Duration = Duration::from_secs(1);
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(5);
/// Inbound ICMP messages per monitor interval above which an alert is raised.
pub const FLOOD_THRESHOLD: u64 = 100;
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
pub const SNMP_PATH: &str = "/proc/net/snmp";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub destination: Ipv4Addr,
    pub receive_timeout: Duration,
    pub send_interval: Duration,
    pub monitor_interval: Duration,
    pub flood_threshold: u64,
    pub shutdown_grace: Duration,
    pub snmp_path: PathBuf,
}

impl Config {
    pub fn new(destination: Ipv4Addr) -> Self {
        Config {
            destination,
            receive_timeout: RECEIVE_TIMEOUT,
            send_interval: SEND_INTERVAL,
            monitor_interval: MONITOR_INTERVAL,
            flood_threshold: FLOOD_THRESHOLD,
            shutdown_grace: SHUTDOWN_GRACE,
            snmp_path: PathBuf::from(SNMP_PATH),
        }
    }
}
