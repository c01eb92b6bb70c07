use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// State shared by the echo loop, the flood monitor and shutdown.
///
/// The counters are only ever incremented by the echo loop. Run state is
/// the cancellation token: running until it is cancelled, exactly once.
#[derive(Debug, Default)]
pub struct RunContext {
    transmitted: AtomicU64,
    received: AtomicU64,
    stopping: AtomicBool,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Ends the run. Returns false if it had already been ended.
    pub fn stop(&self) -> bool {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Resolves once the run has been stopped.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    pub(crate) fn record_transmit(&self) {
        self.transmitted.fetch_add(1, Ordering::AcqRel);
    }

    /// Must follow the `record_transmit` of the request being answered.
    pub(crate) fn record_reply(&self) {
        self.received.fetch_add(1, Ordering::AcqRel);
    }

    pub fn statistics(&self) -> Statistics {
        // received first, so a concurrent transmit can only widen the gap
        let received = self.received.load(Ordering::Acquire);
        let transmitted = self.transmitted.load(Ordering::Acquire);
        Statistics {
            transmitted,
            received,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    pub transmitted: u64,
    pub received: u64,
}

impl Statistics {
    /// Percentage of requests without a reply, 0 when nothing was sent.
    pub fn loss_percent(&self) -> f64 {
        if self.transmitted == 0 {
            return 0.0;
        }
        let lost = self.transmitted.saturating_sub(self.received);
        100.0 * lost as f64 / self.transmitted as f64
    }
}

/// The banner printed when the run ends.
pub struct Summary {
    pub destination: Ipv4Addr,
    pub statistics: Statistics,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let loss = self.statistics.loss_percent();
        writeln!(f, "--- {} ping statistics ---", self.destination)?;
        write!(
            f,
            "{} packets transmitted, {} received, ",
            self.statistics.transmitted, self.statistics.received
        )?;
        if loss.fract() == 0.0 {
            write!(f, "{}% packet loss", loss)
        } else {
            write!(f, "{:.1}% packet loss", loss)
        }
    }
}
