//! CLI command implementations

use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use clap::{Subcommand, ValueEnum};
use rtbridge_core::{
    BridgeConfig, BridgeError, ClockResolution, DataIndicationHeader, DataRequestHeader,
    PauseHandle, Result, SchedulerError, SimTime,
};
use rtbridge_sim::{
    BeaconConfig, BeaconEntity, EmulatorError, HardwareEmulator, RunOutcome, SimulationRunner,
};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run beacon stations bridged to the radio unit
    Run {
        /// Logical run time in milliseconds; runs until interrupted when omitted
        #[arg(short, long)]
        duration_ms: Option<i64>,
        /// Number of beacon stations
        #[arg(short, long, default_value = "1")]
        stations: u32,
        /// Beacon interval in milliseconds
        #[arg(long, default_value = "100")]
        interval_ms: u64,
        /// Random payload bytes per beacon
        #[arg(long, default_value = "32")]
        payload_len: usize,
        /// Payload generator seed
        #[arg(long, default_value = "0")]
        seed: u64,
        /// Radio unit address
        #[arg(long)]
        remote: Option<SocketAddr>,
        /// Local receive address
        #[arg(long)]
        local: Option<SocketAddr>,
        /// Logical clock resolution
        #[arg(long)]
        resolution: Option<ClockResolution>,
        /// Derive the application id from the destination port
        #[arg(long)]
        port_classification: bool,
    },
    /// Emulate the radio unit, reflecting every request back to a station
    Emulate {
        /// Address to receive data requests on
        #[arg(long, default_value = "127.0.0.1:4401")]
        bind: SocketAddr,
        /// Station receive address that indications are sent to
        #[arg(long)]
        target: SocketAddr,
        /// Stop after this many requests; 0 reflects until idle
        #[arg(short, long, default_value = "0")]
        count: usize,
        /// Stop after this many seconds without a request
        #[arg(long, default_value = "30")]
        idle_secs: u64,
        /// Certificate id stamped on indications, 16 hex digits
        #[arg(long, value_parser = parse_certificate_id, default_value = "0000000000000000")]
        cert_id: [u8; 8],
    },
    /// Decode a hex-encoded hardware header and print it as JSON
    Decode {
        /// Header bytes, optionally followed by payload
        hex: String,
        /// Header type
        #[arg(long, value_enum, default_value_t = HeaderKind::Indication)]
        kind: HeaderKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HeaderKind {
    Request,
    Indication,
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            duration_ms,
            stations,
            interval_ms,
            payload_len,
            seed,
            remote,
            local,
            resolution,
            port_classification,
        } => {
            let mut config = BridgeConfig::from_env();
            if let Some(remote) = remote {
                config.agent.remote_addr = remote;
            }
            if local.is_some() {
                config.agent.local_addr = local;
            }
            if let Some(resolution) = resolution {
                config.scheduler.clock_resolution = resolution;
            }
            config.agent.use_port_classification |= port_classification;

            let beacon = BeaconConfig {
                interval: Duration::from_millis(interval_ms),
                payload_len,
                seed,
                agent: config.agent.clone(),
                ..BeaconConfig::default()
            };
            run_beacons(config, beacon, stations, duration_ms.map(SimTime::from_millis))
        }
        Commands::Emulate {
            bind,
            target,
            count,
            idle_secs,
            cert_id,
        } => emulate(bind, target, count, Duration::from_secs(idle_secs), cert_id),
        Commands::Decode { hex, kind } => {
            let bytes = hex::decode(hex.trim()).map_err(|e| BridgeError::Configuration {
                reason: format!("input is not valid hex: {e}"),
            })?;
            println!("{}", decode_header(&bytes, kind)?);
            Ok(())
        }
    }
}

/// Runs `stations` beacons until `limit` or Ctrl-C.
///
/// # Errors
/// - `BridgeError::Configuration` - No stations or a zero beacon interval
/// - `BridgeError::Scheduler` - Scheduler setup failed or the hardware link was lost
pub fn run_beacons(
    config: BridgeConfig,
    beacon: BeaconConfig,
    stations: u32,
    limit: Option<SimTime>,
) -> Result<()> {
    if stations == 0 {
        return Err(BridgeError::Configuration {
            reason: "at least one station is required".to_string(),
        });
    }
    if beacon.interval.is_zero() {
        return Err(BridgeError::Configuration {
            reason: "beacon interval must be positive".to_string(),
        });
    }

    let mut runner = SimulationRunner::new(config.scheduler)?;
    let mut stats = Vec::new();
    for station in 0..stations {
        let entity = BeaconEntity::new(BeaconConfig {
            seed: beacon.seed.wrapping_add(u64::from(station)),
            ..beacon.clone()
        });
        stats.push(entity.stats());
        runner.add_entity(Box::new(entity));
    }

    watch_for_interrupt(runner.pause_handle())?;
    println!("{}", runner.scheduler().info());

    let report = runner.run(limit)?;
    if report.outcome == RunOutcome::Paused {
        runner.shutdown();
    }

    print!("{}", report.summary());
    for (station, stats) in stats.iter().enumerate() {
        println!(
            "  Station {station}: sent {}, received {}, dropped {}",
            stats.sent(),
            stats.received(),
            stats.dropped()
        );
    }
    Ok(())
}

/// Reflects requests received on `bind` to `target`.
///
/// # Errors
/// - `BridgeError::Endpoint` - Bind or send failed
/// - `BridgeError::Scheduler` - Emulator runtime could not be built
pub fn emulate(
    bind: SocketAddr,
    target: SocketAddr,
    count: usize,
    idle: Duration,
    certificate_id: [u8; 8],
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SchedulerError::Runtime)?;

    runtime.block_on(async move {
        let emulator = HardwareEmulator::bind(bind)
            .await?
            .with_receive_timeout(idle)
            .with_certificate_id(certificate_id);

        let mut reflected = 0usize;
        while count == 0 || reflected < count {
            match emulator.reflect_to(target, 1).await {
                Ok(_) => reflected += 1,
                Err(EmulatorError::Timeout { after }) => {
                    tracing::info!("No data request for {:?}, stopping", after);
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        println!("Reflected {reflected} requests to {target}");
        Ok(())
    })
}

/// Renders a header as pretty JSON, followed by any trailing payload in hex.
///
/// # Errors
/// - `BridgeError::Codec` - Input is shorter than the header
pub fn decode_header(bytes: &[u8], kind: HeaderKind) -> Result<String> {
    let header_len = match kind {
        HeaderKind::Request => DataRequestHeader::SIZE,
        HeaderKind::Indication => DataIndicationHeader::SIZE,
    };
    let (header, payload) = bytes.split_at(bytes.len().min(header_len));

    let json = match kind {
        HeaderKind::Request => serde_json::to_string_pretty(&DataRequestHeader::deserialize(header)?),
        HeaderKind::Indication => {
            serde_json::to_string_pretty(&DataIndicationHeader::deserialize(header)?)
        }
    };
    let mut output = json.map_err(|e| BridgeError::Configuration {
        reason: format!("header not representable as JSON: {e}"),
    })?;
    if !payload.is_empty() {
        output.push_str(&format!(
            "\npayload ({} bytes): {}",
            payload.len(),
            hex::encode(payload)
        ));
    }
    Ok(output)
}

fn parse_certificate_id(input: &str) -> std::result::Result<[u8; 8], String> {
    let bytes = hex::decode(input).map_err(|e| format!("Invalid certificate id: {e}"))?;
    <[u8; 8]>::try_from(bytes.as_slice())
        .map_err(|_| format!("Certificate id must be 8 bytes, got {}", bytes.len()))
}

fn watch_for_interrupt(pause: PauseHandle) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SchedulerError::Runtime)?;

    thread::Builder::new()
        .name("interrupt-watch".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, pausing run");
                    pause.request_pause();
                }
            });
        })
        .map_err(SchedulerError::Runtime)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rtbridge_core::wire::{Destination, ItsAid};

    use super::*;

    #[test]
    fn test_decode_indication_with_payload() {
        let mut bytes = DataIndicationHeader {
            its_aid: ItsAid::Cam,
            destination: Destination::circle(10, 20, 30, 0),
            data_length: 2,
            ..Default::default()
        }
        .serialize()
        .to_vec();
        bytes.extend_from_slice(&[0xAB, 0xCD]);

        let output = decode_header(&bytes, HeaderKind::Indication).unwrap();
        assert!(output.contains("\"its_aid\": \"Cam\""));
        assert!(output.ends_with("payload (2 bytes): abcd"));
    }

    #[test]
    fn test_decode_short_input_fails() {
        assert!(matches!(
            decode_header(&[0u8; 12], HeaderKind::Request),
            Err(BridgeError::Codec(_))
        ));
    }

    #[test]
    fn test_run_rejects_zero_interval_and_no_stations() {
        let beacon = BeaconConfig {
            interval: Duration::ZERO,
            ..BeaconConfig::default()
        };
        let error = run_beacons(BridgeConfig::for_testing(), beacon, 1, None).unwrap_err();
        assert_eq!(
            error.user_message(),
            "Invalid configuration: beacon interval must be positive"
        );

        let error = run_beacons(
            BridgeConfig::for_testing(),
            BeaconConfig::default(),
            0,
            None,
        )
        .unwrap_err();
        assert!(matches!(error, BridgeError::Configuration { .. }));
    }

    #[test]
    fn test_parse_certificate_id() {
        assert_eq!(
            parse_certificate_id("0102030405060708").unwrap(),
            [1, 2, 3, 4, 5, 6, 7, 8]
        );
        assert!(parse_certificate_id("0102").is_err());
        assert!(parse_certificate_id("zz").is_err());
    }
}
