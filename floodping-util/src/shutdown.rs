use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use floodping_network::socket::EchoSocket;

use crate::context::{RunContext, Statistics, Summary};

/// Turns SIGINT and SIGTERM into a stop of the run.
///
/// The listener only posts the stop; repeated signals are ignored.
pub fn spawn_interrupt_listener(context: Arc<RunContext>) -> io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                received = interrupt.recv() => match received {
                    Some(()) => "SIGINT",
                    None => return,
                },
                received = terminate.recv() => match received {
                    Some(()) => "SIGTERM",
                    None => return,
                },
            };
            if context.stop() {
                info!("{} received, shutting down", name);
            } else {
                debug!("{} received while already shutting down", name);
            }
        }
    }))
}

/// Ends a run: stops both tasks, prints the summary and releases the session.
pub struct ShutdownCoordinator<S: EchoSocket> {
    context: Arc<RunContext>,
    session: Arc<S>,
    destination: Ipv4Addr,
    grace: Duration,
}

impl<S: EchoSocket> ShutdownCoordinator<S> {
    pub fn new(
        context: Arc<RunContext>,
        session: Arc<S>,
        destination: Ipv4Addr,
        grace: Duration,
    ) -> Self {
        ShutdownCoordinator {
            context,
            session,
            destination,
            grace,
        }
    }

    /// The echo loop is joined before the counters are read, so the summary
    /// sees every request it sent.
    pub async fn finish(self, pinger: JoinHandle<()>, monitor: JoinHandle<u64>) -> Statistics {
        self.context.stop();
        if let Err(err) = pinger.await {
            error!("echo loop ended abnormally: {}", err);
        }

        let statistics = self.context.statistics();
        println!();
        println!(
            "{}",
            Summary {
                destination: self.destination,
                statistics,
            }
        );

        self.session.close();

        match tokio::time::timeout(self.grace, monitor).await {
            Ok(Ok(alerts)) => debug!("flood monitor joined, {} alerts", alerts),
            Ok(Err(err)) => error!("flood monitor ended abnormally: {}", err),
            Err(_) => warn!("flood monitor still running after {:?}", self.grace),
        }
        statistics
    }
}
