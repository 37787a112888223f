//! Spectoda CLI - Command-line interface for Spectoda controller networks
//!
//! Compile TNGL, decode captured event streams and drive a session against
//! the dummy network from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use spectoda_client::{ClientConfig, Spectoda, SpectodaEvent};
use spectoda_core::{time, Decoder, TnglCompiler};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Spectoda - lighting controller network toolkit
#[derive(Parser)]
#[command(name = "spectoda")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true, env = "SPECTODA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a TNGL source file to bytecode
    Compile {
        /// TNGL source file
        file: PathBuf,

        /// Write the bytecode to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the bytecode as hex
        #[arg(long)]
        hex: bool,
    },

    /// Decode a hex encoded command stream
    Decode {
        /// Hex bytes, e.g. 6f6576743100...
        hex: String,

        /// Network clock used to carry running timelines forward (default: now)
        #[arg(long)]
        clock: Option<i64>,
    },

    /// Run a session: connect, upload TNGL, emit an event, disconnect
    Demo {
        /// Label of the emitted event
        #[arg(long, default_value = "evt1")]
        label: String,

        /// Destination device id (255 broadcasts)
        #[arg(long, default_value = "255")]
        id: u8,

        /// Connector kind, overriding the configuration
        #[arg(long)]
        connector: Option<String>,

        /// TNGL file uploaded before the event is emitted
        #[arg(long)]
        tngl: Option<PathBuf>,
    },

    /// Show version and protocol info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Commands::Compile { file, out, hex } => {
            compile_file(&file, out.as_deref(), hex)?;
        }

        Commands::Decode { hex, clock } => {
            decode_stream(&hex, clock.unwrap_or_else(time::now))?;
        }

        Commands::Demo {
            label,
            id,
            connector,
            tngl,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(connector) = connector {
                config.connector = connector;
            }
            println!(
                "{} Running demo session on {} connector",
                "SPECTODA".cyan().bold(),
                config.connector.green()
            );
            run_demo(config, &label, id, tngl.as_deref()).await?;
        }

        Commands::Info => {
            print_info();
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        return Ok(ClientConfig::default());
    };
    let text = read_file(path)?;
    parse_config(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_config(text: &str) -> Result<ClientConfig> {
    Ok(toml::from_str(text)?)
}

fn compile_file(file: &Path, out: Option<&Path>, as_hex: bool) -> Result<()> {
    let source = read_file(file)?;

    let mut compiler = TnglCompiler::new();
    let bytecode = compiler
        .compile(&source)
        .with_context(|| format!("Failed to compile {}", file.display()))?;

    for warning in compiler.warnings() {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }

    match out {
        Some(out) => {
            let written = if as_hex {
                std::fs::write(out, hex::encode(&bytecode))
            } else {
                std::fs::write(out, &bytecode)
            };
            written.with_context(|| format!("Failed to write {}", out.display()))?;
            println!(
                "{} {} -> {} ({} bytes)",
                "Compiled".green().bold(),
                file.display(),
                out.display(),
                bytecode.len()
            );
        }
        None if as_hex => println!("{}", hex::encode(&bytecode)),
        None => {
            println!("{:?}", bytecode.as_ref());
        }
    }

    Ok(())
}

fn decode_stream(input: &str, network_millis: i64) -> Result<()> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&cleaned).context("Input is not valid hex")?;

    let decoded = Decoder::new().decode(&bytes, network_millis);

    for record in &decoded.records {
        println!("{} {:?}", "record".cyan(), record);
    }
    if !decoded.events.is_empty() {
        println!("{}", serde_json::to_string_pretty(&decoded.events)?);
    }
    if let Some(discarded) = decoded.discarded {
        println!(
            "{} unknown or malformed tag {} at offset {}, {} bytes dropped",
            "discarded".red().bold(),
            discarded.tag,
            discarded.offset,
            discarded.bytes
        );
    }
    if decoded.records.is_empty() && decoded.events.is_empty() && decoded.discarded.is_none() {
        println!("{}", "empty stream".dimmed());
    }

    Ok(())
}

async fn run_demo(config: ClientConfig, label: &str, id: u8, tngl: Option<&Path>) -> Result<()> {
    let spectoda = Spectoda::builder().config(config).connect().await?;
    let mut events = spectoda.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => warn!("dropped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let connected = spectoda.connect().await.context("Failed to connect")?;
    info!("connected to {} via {}", connected.name, connected.connector);

    match spectoda.get_fw_version().await {
        Ok(version) => println!("{} {}", "Firmware:".green(), version),
        Err(e) => warn!("firmware version unavailable: {}", e),
    }

    if let Some(path) = tngl {
        let source = read_file(path)?;
        spectoda.write_tngl(&source).await?;
        let fingerprint = spectoda.get_tngl_fingerprint().await?;
        println!("{} {}", "TNGL fingerprint:".green(), fingerprint);
    }

    spectoda.emit_event(label, id).await?;

    // let the printer catch up before tearing down
    tokio::time::sleep(Duration::from_millis(50)).await;

    spectoda.disconnect().await?;
    spectoda.destroy().await?;
    printer.abort();

    if spectoda.is_connected() {
        bail!("session still connected after teardown");
    }
    println!("{}", "Done".green().bold());
    Ok(())
}

fn print_event(event: &SpectodaEvent) {
    match event {
        SpectodaEvent::StateChanged(state) => println!("{} {}", "state".cyan(), state),
        SpectodaEvent::Events(records) => {
            for record in records {
                println!(
                    "{} {} {} -> {} @ {}",
                    "event".yellow(),
                    record.label.as_str().bold(),
                    record.value.type_name(),
                    record.id,
                    record.timestamp
                );
            }
        }
        other => match serde_json::to_string(other) {
            Ok(json) => println!("{} {}", "notify".cyan(), json),
            Err(_) => println!("{} {:?}", "notify".cyan(), other),
        },
    }
}

fn print_info() {
    println!("{}", "Spectoda - lighting controller network toolkit".cyan().bold());
    println!();
    println!("Version:    {}", env!("CARGO_PKG_VERSION"));
    println!("Platform:   {}", std::env::consts::OS);
    println!("Arch:       {}", std::env::consts::ARCH);
    println!("Chunk size: {} bytes", spectoda_core::MAX_CHUNK_SIZE);
    println!();
    println!("{}", "Connectors:".green());
    println!("  - dummy   (simulated network)");
    println!("  - edummy  (simulated network with injected failures)");
    println!();
    println!("{}", "Examples:".green());
    println!("  spectoda compile show.tngl --hex     # Compile TNGL to hex bytecode");
    println!("  spectoda decode 6f657674310000...    # Decode a captured stream");
    println!("  spectoda demo --label evt1           # Run a dummy session");
}
