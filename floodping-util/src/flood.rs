use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::sleep;

use floodping_network::error::PingError;

use crate::context::RunContext;

/// Where the host-wide inbound ICMP message count comes from.
pub trait CounterSource: Send {
    fn read_in_msgs(&mut self) -> Result<u64, PingError>;
}

/// Reads `InMsgs` from the `Icmp:` section of `/proc/net/snmp`.
pub struct SnmpCounter {
    path: PathBuf,
}

impl SnmpCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnmpCounter { path: path.into() }
    }
}

impl CounterSource for SnmpCounter {
    fn read_in_msgs(&mut self) -> Result<u64, PingError> {
        let content = fs::read_to_string(&self.path).map_err(|err| {
            PingError::MonitorSampleUnavailable(format!("{}: {}", self.path.display(), err))
        })?;
        parse_icmp_in_msgs(&content)
    }
}

/// The first `Icmp:` line names the columns, the second holds the values.
pub fn parse_icmp_in_msgs(snmp: &str) -> Result<u64, PingError> {
    let mut icmp_lines = snmp
        .lines()
        .filter_map(|line| line.strip_prefix("Icmp:"))
        .map(|rest| rest.split_whitespace());
    let (header, values) = match (icmp_lines.next(), icmp_lines.next()) {
        (Some(header), Some(values)) => (header, values),
        _ => {
            return Err(PingError::MonitorSampleUnavailable(
                "no Icmp section".to_string(),
            ))
        }
    };
    let value = header
        .zip(values)
        .find(|(name, _)| *name == "InMsgs")
        .map(|(_, value)| value)
        .ok_or_else(|| PingError::MonitorSampleUnavailable("no InMsgs column".to_string()))?;
    value.parse().map_err(|_| {
        PingError::MonitorSampleUnavailable(format!("InMsgs value {:?} is not a number", value))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodAlert {
    pub delta: u64,
    pub interval: Duration,
    pub threshold: u64,
}

impl fmt::Display for FloodAlert {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[ICMP ALERT] {} InMsgs in last {} sec (threshold={})",
            self.delta,
            self.interval.as_secs_f64(),
            self.threshold
        )
    }
}

/// Samples the inbound ICMP counter every interval and alerts on spikes.
pub struct FloodMonitor<C: CounterSource> {
    source: C,
    interval: Duration,
    threshold: u64,
    previous: Option<u64>,
    degraded: bool,
}

impl<C: CounterSource> FloodMonitor<C> {
    pub fn new(source: C, interval: Duration, threshold: u64) -> Self {
        FloodMonitor {
            source,
            interval,
            threshold,
            previous: None,
            degraded: false,
        }
    }

    /// An unreadable counter counts as 0.
    fn sample(&mut self) -> u64 {
        match self.source.read_in_msgs() {
            Ok(value) => {
                if self.degraded {
                    info!("icmp counter readable again");
                    self.degraded = false;
                }
                value
            }
            Err(err) => {
                if !self.degraded {
                    warn!("{}, flood monitor continues with zero samples", err);
                    self.degraded = true;
                }
                0
            }
        }
    }

    /// Feeds one sample. The first sample only sets the baseline.
    ///
    /// A counter that went backwards was reset, its delta is 0.
    pub fn observe(&mut self, current: u64) -> Option<FloodAlert> {
        let previous = self.previous.replace(current)?;
        let delta = current.saturating_sub(previous);
        if delta > self.threshold {
            Some(FloodAlert {
                delta,
                interval: self.interval,
                threshold: self.threshold,
            })
        } else {
            None
        }
    }

    /// Samples until the run stops. Returns the number of alerts raised.
    pub async fn run(mut self, context: Arc<RunContext>) -> u64 {
        let baseline = self.sample();
        self.observe(baseline);
        let mut alerts = 0;
        loop {
            tokio::select! {
                _ = context.stopped() => break,
                _ = sleep(self.interval) => {}
            }
            if !context.is_running() {
                break;
            }
            let current = self.sample();
            if let Some(alert) = self.observe(current) {
                eprintln!("{}", alert);
                alerts += 1;
            }
        }
        debug!("flood monitor stopped, {} alerts", alerts);
        alerts
    }
}
