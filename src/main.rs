//! AIR780E SMS daemon
//!
//! CLI for listening, sending and poking the modem by hand.

use air780e_sms::client::SmsClient;
use air780e_sms::codec::{Charset, ValidityPeriod};
use air780e_sms::config::Config;
use air780e_sms::control::{send_via_socket, ControlServer, SendRequest, SendResponse};
use air780e_sms::forwarder::{self, JsonlForwarder};
use air780e_sms::frame::FrameStatus;
use air780e_sms::listener::Listener;
use air780e_sms::ports;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// AIR780E SMS daemon
#[derive(Parser)]
#[command(name = "air780e-sms")]
#[command(about = "Receive and send SMS through an AIR780E USB modem")]
struct Cli {
    /// Config file (default: ./.air780e.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with defaults
    Init {
        /// Serial device (discovered when omitted)
        #[arg(long)]
        port: Option<String>,

        /// Use text mode with this character set (IRA, GSM, UCS2, GBK) instead of PDU mode
        #[arg(long)]
        charset: Option<String>,

        /// How long the network keeps undelivered messages (rounded up to the next step)
        #[arg(long, value_name = "HOURS")]
        validity_hours: Option<u64>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Forward incoming messages until interrupted
    Listen {
        /// Serial device (overrides config)
        #[arg(long)]
        port: Option<String>,
    },

    /// Send a message
    Send {
        /// Destination number
        #[arg(short, long)]
        phone: String,

        /// Message text
        #[arg(short, long)]
        message: String,

        /// Open the device even if a listener is running
        #[arg(long)]
        direct: bool,

        /// Serial device (overrides config)
        #[arg(long)]
        port: Option<String>,
    },

    /// Type raw AT commands and print the replies
    Console {
        /// Serial device (overrides config)
        #[arg(long)]
        port: Option<String>,
    },

    /// List connected AIR780E AT interfaces
    Ports,

    /// Show the newest forwarded messages
    Recent {
        /// Regex matched against body and sender
        #[arg(short, long)]
        pattern: Option<String>,

        /// Number of messages to show
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.unwrap_or_else(Config::default_path);

    let load = || {
        Config::load(&config_path).with_context(|| format!("loading {}", config_path.display()))
    };

    match cli.command {
        Commands::Init {
            port,
            charset,
            validity_hours,
            force,
        } => cmd_init(&config_path, port, charset, validity_hours, force),
        Commands::Listen { port } => cmd_listen(load()?, port).await,
        Commands::Send {
            phone,
            message,
            direct,
            port,
        } => cmd_send(load()?, &phone, &message, direct, port).await,
        Commands::Console { port } => cmd_console(load()?, port).await,
        Commands::Ports => cmd_ports(),
        Commands::Recent { pattern, count } => cmd_recent(&load()?, pattern.as_deref(), count),
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn cmd_init(
    path: &Path,
    port: Option<String>,
    charset: Option<String>,
    validity_hours: Option<u64>,
    force: bool,
) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let mut config = Config {
        serial_port: port,
        ..Config::default()
    };
    if let Some(name) = charset {
        let charset: Charset = name.parse()?;
        config = config.with_text_mode(charset);
    }
    if let Some(hours) = validity_hours {
        let validity = Duration::from_secs(hours.saturating_mul(3600));
        config.validity_period = ValidityPeriod::from_duration(validity);
    }
    config
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;

    println!("Wrote {}", path.display());
    println!("Encoding: {}", config.encoding);
    println!("Validity: {:?}", config.validity_period.duration());
    Ok(())
}

async fn cmd_listen(config: Config, port: Option<String>) -> anyhow::Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = stop_tx.send(true);
            }
            Err(e) => {
                warn!("Cannot watch for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    let scan_interval = config.scan_interval();
    loop {
        match listen_once(&config, port.as_deref(), stopped(stop_rx.clone())).await {
            Ok(()) => return Ok(()),
            // device unplugged or still booting: wait for it to come back
            Err(e) if e.is_fatal() || e.is_retryable() => {
                warn!("Listener lost the modem: {}", e);
            }
            Err(e) => return Err(e.into()),
        }

        info!("Looking for the modem again in {:?}", scan_interval);
        tokio::select! {
            _ = stopped(stop_rx.clone()) => return Ok(()),
            _ = tokio::time::sleep(scan_interval) => {}
        }
    }
}

async fn cmd_send(
    config: Config,
    phone: &str,
    message: &str,
    direct: bool,
    port: Option<String>,
) -> anyhow::Result<()> {
    if !direct {
        let request = SendRequest {
            phone: phone.to_string(),
            message: message.to_string(),
        };
        if let Some(response) = send_via_socket(&config.control_socket, &request).await? {
            return report_response(response);
        }
    }

    let port = resolve_port(&config, port.as_deref())?;
    let client = SmsClient::open(config, &port)?;
    let result = async {
        client.initialize().await?;
        client.send(phone, message).await
    }
    .await;
    client.close().await;

    let report = result?;
    println!(
        "Sent to {} ({} part(s), references {:?})",
        phone,
        report.references.len(),
        report.references
    );
    Ok(())
}

async fn cmd_console(config: Config, port: Option<String>) -> anyhow::Result<()> {
    let port = resolve_port(&config, port.as_deref())?;
    let timeout = config.read_timeout();
    let client = SmsClient::open(config, &port)?;
    println!("Connected to {} (empty line or \"exit\" to quit)", port);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        if command.is_empty() || command.eq_ignore_ascii_case("exit") {
            break;
        }

        match client.raw(command, timeout).await {
            Ok(frame) => {
                for body in &frame.body {
                    println!("{}", body);
                }
                match &frame.status {
                    FrameStatus::Ok => println!("OK"),
                    FrameStatus::Error(code) => println!("{}", code),
                    FrameStatus::Timeout => println!("(no result code)"),
                }
            }
            Err(e) if e.is_fatal() => {
                client.close().await;
                return Err(e.into());
            }
            Err(e) => println!("Error: {}", e),
        }

        for notification in client.poll_notifications(Duration::from_millis(100)).await? {
            println!("URC: {:?}", notification);
        }
    }

    client.close().await;
    Ok(())
}

fn cmd_ports() -> anyhow::Result<()> {
    let devices = ports::list_at_devices();
    if devices.is_empty() {
        println!("No AIR780E AT interface found");
        return Ok(());
    }
    for device in devices {
        println!("{}", device.display());
    }
    Ok(())
}

fn cmd_recent(config: &Config, pattern: Option<&str>, count: usize) -> anyhow::Result<()> {
    let records = forwarder::recent(&config.log_file, pattern, count)?;
    if records.is_empty() {
        println!("No messages");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {}  {}",
            record.received_at_local, record.sender, record.body
        );
    }
    Ok(())
}

// ============================================================================
// Listener
// ============================================================================

async fn listen_once(
    config: &Config,
    port: Option<&str>,
    shutdown: impl std::future::Future<Output = ()>,
) -> air780e_sms::Result<()> {
    let port = resolve_port(config, port)?;
    info!("Opening {}", port);
    let client = SmsClient::open(config.clone(), &port)?;

    if let Err(e) = client.initialize().await {
        client.close().await;
        return Err(e);
    }
    match client.manufacturer().await {
        Ok(name) => info!("Modem manufacturer: {}", name),
        Err(e) => warn!("Could not query the manufacturer: {}", e),
    }

    let control = match ControlServer::spawn(&config.control_socket, client.clone()) {
        Ok(control) => control,
        Err(e) => {
            client.close().await;
            return Err(e);
        }
    };

    let forwarder = JsonlForwarder::new(&config.log_file);
    let result = Listener::new(client, Box::new(forwarder))
        .run(shutdown)
        .await;
    control.shutdown().await;
    result
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Explicit port, then config, then discovery of a single modem.
fn resolve_port(config: &Config, port: Option<&str>) -> air780e_sms::Result<String> {
    if let Some(port) = port.map(str::to_string).or_else(|| config.serial_port.clone()) {
        return Ok(port);
    }
    let device = ports::find_at_device()?;
    Ok(device.to_string_lossy().into_owned())
}

fn report_response(response: SendResponse) -> anyhow::Result<()> {
    if response.ok {
        println!("Sent via listener (references {:?})", response.references);
        return Ok(());
    }
    let reason = response
        .error
        .unwrap_or_else(|| "unknown error".to_string());
    error!("Send rejected: {}", reason);
    match response.code {
        Some(code) => bail!("send failed: {} ({})", reason, code),
        None => bail!("send failed: {}", reason),
    }
}
