use std::sync::Arc;

use floodping_network::icmp::ECHO_PAYLOAD_SIZE;
use floodping_network::socket::IcmpSocket;
use floodping_util::context::RunContext;
use floodping_util::flood::{FloodMonitor, SnmpCounter};
use floodping_util::ping::{process_identifier, Pinger};
use floodping_util::shutdown::{spawn_interrupt_listener, ShutdownCoordinator};
use log::debug;

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.format_timestamp_millis().init();

    let config = args::parse(std::env::args_os())?;
    // an interrupt while the socket is being opened must still end in a summary
    let context = RunContext::new();
    spawn_interrupt_listener(context.clone())?;
    let session = Arc::new(IcmpSocket::open(config.receive_timeout)?);
    debug!("{:?}", config);

    println!("PING {}: {} data bytes", config.destination, ECHO_PAYLOAD_SIZE);

    let monitor = FloodMonitor::new(
        SnmpCounter::new(config.snmp_path.clone()),
        config.monitor_interval,
        config.flood_threshold,
    );
    let monitor = tokio::spawn(monitor.run(context.clone()));

    let mut pinger = Pinger::new(
        session.clone(),
        context.clone(),
        config.destination,
        process_identifier(),
        config.receive_timeout,
        config.send_interval,
    );
    let pinger = tokio::spawn(async move { pinger.run().await });

    context.stopped().await;
    ShutdownCoordinator::new(context, session, config.destination, config.shutdown_grace)
        .finish(pinger, monitor)
        .await;
    Ok(())
}
