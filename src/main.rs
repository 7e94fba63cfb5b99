//! z21link - Command line client for the Z21 command station
//!
//! Sends single commands to the station or monitors everything it reports.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use z21link::config::{self, Config};
use z21link::protocol::{hex_dump, Direction, FunctionCommand, LocoAddress, LocoDrive, ToggleMode};
use z21link::{ClientResult, Z21Client, Z21Event};

/// How long one-shot queries wait for the station's reply
const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// z21link - Z21 command station client
#[derive(Parser)]
#[command(name = "z21link")]
#[command(author = "z21link Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Control and monitor a Z21 command station over the LAN", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Station host name or IP address
    #[arg(short = 'H', long, global = true)]
    host: Option<String>,

    /// Station UDP port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every event the station reports until Ctrl+C
    Monitor {
        /// One JSON object per line
        #[arg(long)]
        json: bool,

        /// Also print raw datagrams
        #[arg(long)]
        raw: bool,
    },

    /// Query the track power status
    Status,

    /// Query the X-Bus version
    Version,

    /// Query the firmware version
    Firmware,

    /// Query the serial number
    Serial,

    /// Query hardware type and firmware
    Hardware,

    /// Query the feature lock state
    LanCode,

    /// Query currents, voltages and temperature
    SystemState,

    /// Switch track power
    Power {
        #[arg(value_enum)]
        state: PowerSwitch,
    },

    /// Emergency stop of all locomotives
    Stop,

    /// Query the state of a locomotive
    LocoInfo {
        address: u16,
    },

    /// Set speed and direction of a locomotive
    Drive {
        address: u16,

        /// Speed step 0-127
        speed: u8,

        /// Drive in reverse
        #[arg(short, long)]
        reverse: bool,
    },

    /// Switch a locomotive function
    Function {
        address: u16,

        /// Function index 0-31
        index: u8,

        #[arg(value_enum)]
        mode: FunctionSwitch,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PowerSwitch {
    On,
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FunctionSwitch {
    On,
    Off,
    Toggle,
}

impl From<FunctionSwitch> for ToggleMode {
    fn from(switch: FunctionSwitch) -> Self {
        match switch {
            FunctionSwitch::On => ToggleMode::On,
            FunctionSwitch::Off => ToggleMode::Off,
            FunctionSwitch::Toggle => ToggleMode::Toggle,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = match &config.general.log_filter {
        Some(directive) if !cli.verbose => EnvFilter::new(directive),
        _ if cli.verbose || config.general.verbose => EnvFilter::new("debug"),
        _ => EnvFilter::new("info"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if let Some(host) = cli.host {
        config.station.host = Some(host);
    }
    if let Some(port) = cli.port {
        config.station.port = port;
    }

    match cli.command {
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Monitor { json, raw } => {
            let client = connect(&config).await?;
            let result = run_monitor(&client, json, raw).await;
            client.dispose().await?;
            result?;
        }
        command => {
            let client = connect(&config).await?;
            let result = run_command(&client, command).await;
            client.dispose().await?;
            result?;
        }
    }

    Ok(())
}

/// Connect to the configured station
async fn connect(config: &Config) -> anyhow::Result<Z21Client> {
    let Some(host) = config.station.host.as_deref() else {
        anyhow::bail!("Please specify --host or set station.host in the config file");
    };

    let client = Z21Client::new(config.network_config());
    match host.parse::<IpAddr>() {
        Ok(ip) => client.connect(ip).await?,
        Err(_) => client.connect_hostname(host).await?,
    }

    tracing::info!("Connected to Z21 at {}:{}", host, config.station.port);
    Ok(client)
}

/// Run a one-shot command or query
async fn run_command(client: &Z21Client, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Status => {
            let event = query(client, Z21Client::get_status, |e| {
                matches!(e, Z21Event::StatusChanged(_))
            })
            .await?;
            println!("{}", describe(&event));
        }
        Commands::Version => {
            let event = query(client, Z21Client::get_version, |e| {
                matches!(e, Z21Event::Version(_))
            })
            .await?;
            println!("{}", describe(&event));
        }
        Commands::Firmware => {
            let event = query(client, Z21Client::get_firmware_version, |e| {
                matches!(e, Z21Event::FirmwareVersion(_))
            })
            .await?;
            println!("{}", describe(&event));
        }
        Commands::Serial => {
            let event = query(client, Z21Client::get_serial_number, |e| {
                matches!(e, Z21Event::SerialNumber(_))
            })
            .await?;
            println!("{}", describe(&event));
        }
        Commands::Hardware => {
            let event = query(client, Z21Client::get_hardware_info, |e| {
                matches!(e, Z21Event::HardwareInfo(_))
            })
            .await?;
            println!("{}", describe(&event));
        }
        Commands::LanCode => {
            let event = query(client, Z21Client::get_lan_code, |e| {
                matches!(e, Z21Event::LanCode(_))
            })
            .await?;
            println!("{}", describe(&event));
        }
        Commands::SystemState => {
            let event = query(client, Z21Client::system_state_get_data, |e| {
                matches!(e, Z21Event::SystemStateChanged(_))
            })
            .await?;
            println!("{}", describe(&event));
        }
        Commands::LocoInfo { address } => {
            let event = query(
                client,
                |c| c.get_loco_info(address),
                |e| matches!(e, Z21Event::LocoInfo(info) if info.address.value() == address),
            )
            .await?;
            println!("{}", describe(&event));
        }
        Commands::Power { state } => {
            match state {
                PowerSwitch::On => client.set_track_power_on()?,
                PowerSwitch::Off => client.set_track_power_off()?,
            }
            println!("Track power {:?} sent", state);
        }
        Commands::Stop => {
            client.set_stop()?;
            println!("Emergency stop sent");
        }
        Commands::Drive {
            address,
            speed,
            reverse,
        } => {
            let direction = if reverse {
                Direction::Reverse
            } else {
                Direction::Forward
            };
            let drive = LocoDrive::new(LocoAddress::new(address)?, speed, direction)?;
            client.set_loco_drive(drive)?;
            println!("Loco {}: speed {} {:?}", drive.address, drive.speed(), direction);
        }
        Commands::Function {
            address,
            index,
            mode,
        } => {
            let function = FunctionCommand::new(LocoAddress::new(address)?, index, mode.into())?;
            client.set_loco_function(function)?;
            println!("Loco {}: F{} {}", function.address, index, function.mode);
        }
        Commands::Monitor { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}

/// Send a request and wait for the first event it matches
async fn query<S, R>(client: &Z21Client, send: S, is_reply: R) -> anyhow::Result<Z21Event>
where
    S: FnOnce(&Z21Client) -> ClientResult<()>,
    R: Fn(&Z21Event) -> bool,
{
    // Subscribe first so the reply cannot slip past
    let mut events = client.subscribe();
    send(client)?;

    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if is_reply(&event) => return Ok(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} events", skipped);
                }
                Err(RecvError::Closed) => anyhow::bail!("Event stream closed"),
            }
        }
    };

    match tokio::time::timeout(QUERY_TIMEOUT, wait).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("No reply from the station within {:?}", QUERY_TIMEOUT),
    }
}

/// Print events until Ctrl+C
async fn run_monitor(client: &Z21Client, json: bool, raw: bool) -> anyhow::Result<()> {
    let mut events = client.subscribe();

    // The broadcast subscription follows reachability; ask once up front
    client.get_status()?;

    if !json {
        println!("\n========================================");
        println!("  z21link Monitor");
        println!("========================================");
        if let Some(remote) = client.remote() {
            println!("  Station: {}", remote);
        }
        println!("========================================");
        println!("\nPress Ctrl+C to stop.\n");
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(Z21Event::RawReceived(_)) if !raw => {}
                    Ok(event) => {
                        if json {
                            println!("{}", serde_json::to_string(&event)?);
                        } else {
                            println!("[{}] {}", event.kind(), describe(&event));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Monitor fell behind, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                break;
            }
        }
    }

    Ok(())
}

/// Human readable rendering of an event
fn describe(event: &Z21Event) -> String {
    match event {
        Z21Event::HardwareInfo(info) => format!(
            "Hardware: {:?}, firmware {:X}.{:02X}",
            info.hardware_type,
            (info.firmware >> 8) & 0xFF,
            info.firmware & 0xFF
        ),
        Z21Event::SerialNumber(serial) => format!("Serial number: {}", serial),
        Z21Event::LanCode(code) => {
            let lock = if code.is_locked() { " (locked)" } else { "" };
            format!("LAN code: {:?}{}", code, lock)
        }
        Z21Event::LocoInfo(info) => {
            let on: Vec<String> = info
                .functions
                .iter()
                .filter(|f| f.on)
                .map(|f| format!("F{}", f.index))
                .collect();
            format!(
                "Loco {}: speed {} {:?}{}, functions on: [{}]",
                info.address,
                info.speed,
                info.direction,
                if info.in_use { " (in use)" } else { "" },
                on.join(" ")
            )
        }
        Z21Event::Version(version) => format!(
            "X-Bus version 0x{:02X}, station {:?}",
            version.xbus_version, version.variant
        ),
        Z21Event::FirmwareVersion(version) => format!("Firmware {}", version),
        Z21Event::TrackPowerChanged(state) => format!("Track power: {:?}", state),
        Z21Event::StatusChanged(state) => format!("Status: {:?}", state),
        Z21Event::SystemStateChanged(state) => format!(
            "Main {} mA, prog {} mA, filtered {} mA, {} °C, supply {} mV, VCC {} mV, flags {:?}",
            state.main_current,
            state.prog_current,
            state.filtered_main_current,
            state.temperature,
            state.supply_voltage,
            state.vcc_voltage,
            state.flags
        ),
        Z21Event::Stopped => "Emergency stop".to_string(),
        Z21Event::RawReceived(bytes) => hex_dump(bytes),
        Z21Event::ReachabilityChanged(reachability) => format!("Station {:?}", reachability),
    }
}
