use std::ffi::OsString;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{App, Arg, ErrorKind};

use floodping_network::error::PingError;
use floodping_util::config::Config;

fn app() -> App<'static, 'static> {
    App::new("ping")
        .about("ICMP echo client with inbound ICMP flood detection")
        .arg(
            Arg::with_name("destination")
                .help("IPv4 address to ping, dotted decimal")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("timeout")
                .short("W")
                .long("timeout")
                .value_name("SECS")
                .takes_value(true)
                .help("Time to wait for each reply"),
        )
        .arg(
            Arg::with_name("interval")
                .short("i")
                .long("interval")
                .value_name("SECS")
                .takes_value(true)
                .help("Pause between echo requests"),
        )
        .arg(
            Arg::with_name("monitor-interval")
                .long("monitor-interval")
                .value_name("SECS")
                .takes_value(true)
                .help("Flood monitor sampling interval"),
        )
        .arg(
            Arg::with_name("flood-threshold")
                .long("flood-threshold")
                .value_name("COUNT")
                .takes_value(true)
                .help("Inbound ICMP messages per interval that raise an alert"),
        )
        .arg(
            Arg::with_name("snmp-path")
                .long("snmp-path")
                .value_name("PATH")
                .takes_value(true)
                .help("Statistics file holding the Icmp InMsgs counter"),
        )
}

// One day.
const MAX_SECONDS: f64 = 86_400.0;

fn parse_seconds(name: &str, value: &str) -> Result<Duration, PingError> {
    f64::from_str(value)
        .ok()
        .filter(|secs| *secs > 0.0 && *secs <= MAX_SECONDS)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            PingError::Argument(format!(
                "--{} expects a number of seconds in (0, {}], got {:?}",
                name, MAX_SECONDS, value
            ))
        })
}

pub fn parse<I, T>(args: I) -> Result<Config, PingError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match app().get_matches_from_safe(args) {
        Ok(matches) => matches,
        Err(err) if matches!(err.kind, ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed) => {
            err.exit()
        }
        Err(err) => return Err(PingError::Argument(err.message)),
    };

    let destination = matches.value_of("destination").unwrap_or_default();
    let destination = Ipv4Addr::from_str(destination)
        .map_err(|_| PingError::Argument(format!("invalid address: {}", destination)))?;
    let mut config = Config::new(destination);

    if let Some(value) = matches.value_of("timeout") {
        config.receive_timeout = parse_seconds("timeout", value)?;
    }
    if let Some(value) = matches.value_of("interval") {
        config.send_interval = parse_seconds("interval", value)?;
    }
    if let Some(value) = matches.value_of("monitor-interval") {
        config.monitor_interval = parse_seconds("monitor-interval", value)?;
    }
    if let Some(value) = matches.value_of("flood-threshold") {
        config.flood_threshold = value.parse().map_err(|_| {
            PingError::Argument(format!("--flood-threshold expects a count, got {:?}", value))
        })?;
    }
    if let Some(value) = matches.value_of("snmp-path") {
        config.snmp_path = PathBuf::from(value);
    }
    Ok(config)
}
