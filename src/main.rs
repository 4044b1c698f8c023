//! audioshare CLI
//!
//! Starts the broadcast server against a capture endpoint, or lists the
//! available endpoints and encodings.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};

use audioshare::capture::{list_capture_devices, CaptureConfig, LoopbackCapture};
use audioshare::protocol::{DEFAULT_PORT, MAX_PORT, MIN_PORT};
use audioshare::{net, AudioServer, Error, SampleEncoding, ServerConfig};

#[derive(Parser)]
#[command(
    name = "audioshare",
    version,
    about = "Share this machine's audio with the local network",
    after_help = "Examples:\n  \
        audioshare -b\n  \
        audioshare --bind 192.168.3.2\n  \
        audioshare --bind 192.168.3.2:65530 --encoding f32 --channels 2 --sample-rate 48000\n  \
        audioshare -l\n  \
        audioshare --list-encoding"
)]
struct Cli {
    /// The server bind address; empty host picks a default
    #[arg(
        short,
        long,
        value_name = "[HOST][:PORT]",
        num_args = 0..=1,
        default_missing_value = ""
    )]
    bind: Option<String>,

    /// WebSocket server port for browser clients (default: main port + 1)
    #[arg(short = 'w', long, value_name = "PORT")]
    websocket_port: Option<u16>,

    /// Capture endpoint name ("default" = default endpoint)
    #[arg(short, long, value_name = "ENDPOINT", default_value = "default")]
    endpoint: String,

    /// Capture encoding ("default" = device default)
    #[arg(long, value_name = "ENCODING", default_value = "default")]
    encoding: String,

    /// Capture channel count (0 = device default)
    #[arg(long, value_name = "CHANNELS", default_value_t = 0)]
    channels: u16,

    /// Capture sample rate in Hz (0 = device default)
    #[arg(long, value_name = "HZ", default_value_t = 0)]
    sample_rate: u32,

    /// List available capture endpoints
    #[arg(short = 'l', long)]
    list_endpoint: bool,

    /// List available encodings
    #[arg(long)]
    list_encoding: bool,

    /// Set log level to trace
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::TRACE
        } else {
            tracing::Level::INFO
        })
        .init();

    if cli.list_endpoint {
        return list_endpoints();
    }

    if cli.list_encoding {
        list_encodings();
        return Ok(());
    }

    let Some(bind) = cli.bind else {
        // No action requested: behave like --help.
        Cli::command().print_help()?;
        return Ok(());
    };

    let bind_addr = parse_bind(&bind)?;
    let capture_config = CaptureConfig {
        device: (cli.endpoint != "default").then_some(cli.endpoint),
        encoding: parse_encoding(&cli.encoding)?,
        channels: (cli.channels > 0).then_some(cli.channels),
        sample_rate: (cli.sample_rate > 0).then_some(cli.sample_rate),
    };

    let source =
        Arc::new(LoopbackCapture::new(&capture_config).context("failed to open capture endpoint")?);

    let mut server_config = ServerConfig::with_addr(bind_addr);
    if let Some(port) = cli.websocket_port {
        server_config = server_config.websocket_port(port);
    }

    let server = AudioServer::new(server_config, source);
    server.start().context("failed to start server")?;
    server.wait();

    Ok(())
}

fn list_endpoints() -> anyhow::Result<()> {
    let devices = list_capture_devices().context("failed to enumerate capture endpoints")?;

    println!("endpoint list:");
    for device in &devices {
        let marker = if device.is_default { '*' } else { ' ' };
        println!("\t{} {}", marker, device.name);
    }
    println!("total: {}", devices.len());
    Ok(())
}

fn list_encodings() {
    println!("encoding list:");
    println!("\tdefault\t\tDefault encoding");
    for encoding in SampleEncoding::ALL {
        println!("\t{}\t\t{}", encoding, encoding.description());
    }
}

fn parse_encoding(s: &str) -> anyhow::Result<Option<SampleEncoding>> {
    if s == "default" {
        return Ok(None);
    }
    SampleEncoding::from_str(s)
        .map(Some)
        .map_err(|e| anyhow::anyhow!(e))
}

/// Parse `[host][:port]`, filling missing pieces with defaults
fn parse_bind(s: &str) -> anyhow::Result<SocketAddr> {
    // A bare host (including bracket-free IPv6) gets the default port; a
    // full socket address is taken as-is.
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }
    if let Ok(addr) = s.parse::<SocketAddr>() {
        validate_port(addr.port() as u32)?;
        return Ok(addr);
    }

    let (host, port) = match s.rsplit_once(':') {
        Some((host, port)) => {
            let port: u32 = port
                .parse()
                .with_context(|| format!("invalid port '{port}'"))?;
            validate_port(port)?;
            (host, port as u16)
        }
        None => (s, DEFAULT_PORT),
    };

    let ip = if host.is_empty() {
        let probed = net::probe_default_address()
            .context("no valid network address found, specify a host address")?;
        IpAddr::V4(probed)
    } else {
        host.parse()
            .map_err(|_| Error::InvalidAddress(host.to_string()))?
    };

    Ok(SocketAddr::new(ip, port))
}

fn validate_port(port: u32) -> anyhow::Result<()> {
    if !(MIN_PORT as u32..=MAX_PORT as u32).contains(&port) {
        bail!("port must be between {MIN_PORT} and {MAX_PORT}, got {port}");
    }
    Ok(())
}
