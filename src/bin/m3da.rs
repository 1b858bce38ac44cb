//! M3DA CLI binary.
//!
//! # Commands
//!
//! - `server` - Start the M3DA TCP server and the admin HTTP API
//! - `send` - Send one value to a server, as a device would

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use m3da::{
    codec::{Message, Pdu},
    server, Authentication, Config, DeviceCredentials, Encryption, M3daTcpClient, Value, VERSION,
};

#[derive(Parser)]
#[command(name = "m3da")]
#[command(version = VERSION)]
#[command(about = "M3DA - machine-to-machine telemetry protocol", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the M3DA server
    Server {
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// M3DA TCP port
        #[arg(long)]
        tcp_port: Option<u16>,

        /// Admin HTTP port
        #[arg(long)]
        api_port: Option<u16>,

        /// Security profile file
        #[arg(long)]
        security_file: Option<PathBuf>,

        /// Bind to all interfaces
        #[arg(long)]
        bind_all: bool,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Send one value and print the server's answer
    Send {
        /// Server host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Server TCP port
        #[arg(short, long, default_value = "44900")]
        port: u16,

        /// Communication id of the device
        #[arg(long)]
        id: String,

        /// Data path, e.g. @sys.telemetry
        #[arg(long)]
        path: String,

        /// Key inside the path
        #[arg(short, long)]
        key: String,

        /// Value, parsed as JSON when possible
        #[arg(long)]
        value: String,

        /// Authentication: none, hmac-md5, hmac-sha1
        #[arg(long, default_value = "none")]
        auth: String,

        /// Encryption: none, aes-ctr-128, aes-ctr-256, aes-cbc-128, aes-cbc-256
        #[arg(long, default_value = "none")]
        encryption: String,

        /// Device password, required with authentication
        #[arg(long)]
        password: Option<String>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            config,
            tcp_port,
            api_port,
            security_file,
            bind_all,
            verbose,
        } => cmd_server(config, tcp_port, api_port, security_file, bind_all, verbose),

        Commands::Send {
            host,
            port,
            id,
            path,
            key,
            value,
            auth,
            encryption,
            password,
            verbose,
        } => {
            init_logging(verbose);
            let message = Message::new(path).with(key, parse_value(&value));
            cmd_send(
                format!("{host}:{port}"),
                id,
                message,
                &auth,
                &encryption,
                password,
            )
        }
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

fn cmd_server(
    config_path: Option<PathBuf>,
    tcp_port: Option<u16>,
    api_port: Option<u16>,
    security_file: Option<PathBuf>,
    bind_all: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    init_logging(verbose);

    let config = match config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_env();

    let mut server_config = config.server_config()?;
    if let Some(port) = tcp_port {
        server_config = server_config.with_tcp_port(port);
    }
    if let Some(port) = api_port {
        server_config = server_config.with_api_port(port);
    }
    if let Some(path) = security_file {
        server_config = server_config.with_security_file(path);
    }
    if bind_all {
        server_config = server_config.bind_all();
    }

    tracing::info!("Starting M3DA server on {}", server_config.tcp_addr);
    tracing::info!(
        "Security profiles: {}",
        server_config
            .security_file
            .as_ref()
            .map_or_else(|| "in memory only".to_string(), |p| p.display().to_string())
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::run(server_config))?;
    Ok(())
}

fn cmd_send(
    addr: String,
    id: String,
    message: Message,
    auth: &str,
    encryption: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    let authentication: Authentication = auth.parse()?;
    let encryption: Encryption = encryption.parse()?;

    let mut client = if authentication == Authentication::None {
        M3daTcpClient::new(addr, id)
    } else {
        let password = password
            .ok_or_else(|| anyhow::anyhow!("--password is required with --auth {authentication}"))?;
        M3daTcpClient::with_credentials(
            addr,
            DeviceCredentials::new(id, authentication, encryption, &password),
        )
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let pdus = runtime.block_on(client.send(std::slice::from_ref(&message)))?;

    println!("OK, {} PDU(s) received", pdus.len());
    for pdu in pdus {
        match pdu {
            Pdu::Message(message) => {
                let body: serde_json::Map<String, serde_json::Value> = message
                    .body
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                println!("message {} {}", message.path, serde_json::Value::Object(body));
            }
            Pdu::Response(response) => println!(
                "response ticket={} status={} {}",
                response.ticket_id, response.status, response.message
            ),
            Pdu::Envelope(_) => println!("nested envelope"),
        }
    }
    Ok(())
}

/// JSON when it parses, plain text otherwise.
fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(&json),
        Err(_) => Value::from_json(&serde_json::Value::String(raw.to_string())),
    }
}
