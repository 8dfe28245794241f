// src/main.rs
//
// Command-line front end: pick a port, run the receiver, print samples.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::{Args, Parser, Subcommand};
use streamtap_lib::io::serial::list_serial_ports;
use streamtap_lib::io::ConsoleSink;
use streamtap_lib::logging::{init_file_logging, stop_file_logging};
use streamtap_lib::settings::load_or_default;
use streamtap_lib::{tlog, OutputFormat, ReceiverSettings, SampleReader};

#[derive(Parser)]
#[command(name = "streamtap", version, about = "Receive fixed-width float samples from a serial link")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and print samples until Ctrl-C (default)
    Run(RunArgs),
    /// List Bluetooth and USB serial ports
    ListPorts {
        /// Include PCI and unidentified ports
        #[arg(long)]
        all: bool,
    },
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    /// Serial port (e.g. COM6, /dev/rfcomm0). Prompted for when missing.
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    /// Channels per sample. Must match the sender.
    #[arg(short, long)]
    channels: Option<usize>,

    /// Settings file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Also write logs to a timestamped file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run(cli.run)) {
        Command::ListPorts { all } => list_ports(all),
        Command::Run(args) => run(args).await,
    }
}

fn list_ports(all: bool) -> ExitCode {
    match list_serial_ports(all) {
        Ok(ports) if ports.is_empty() => {
            println!("No serial ports found");
            ExitCode::SUCCESS
        }
        Ok(ports) => {
            for p in ports {
                println!(
                    "{:<24} {:<10} {:<10} {}",
                    p.port_name,
                    p.kind.label(),
                    p.usb_id.unwrap_or_default(),
                    p.description.unwrap_or_default()
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Merge file settings with command-line overrides.
fn resolve_settings(args: &RunArgs) -> Result<ReceiverSettings, String> {
    let mut settings = load_or_default(args.config.as_deref())?;
    if let Some(port) = &args.port {
        settings.port = port.clone();
    }
    if let Some(baud) = args.baud {
        settings.baud_rate = baud;
    }
    if let Some(channels) = args.channels {
        settings.channel_count = channels;
    }
    if args.log_dir.is_some() {
        settings.log_dir = args.log_dir.clone();
    }
    if settings.port.trim().is_empty() {
        settings.port = prompt_for_port()?;
    }
    settings.validate()?;
    Ok(settings)
}

fn prompt_for_port() -> Result<String, String> {
    print!("Enter the serial port (e.g., COM6 or /dev/rfcomm0): ");
    std::io::stdout()
        .flush()
        .map_err(|e| format!("Failed to write prompt: {}", e))?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| format!("Failed to read port: {}", e))?;
    Ok(line.trim().to_string())
}

async fn run(args: RunArgs) -> ExitCode {
    let settings = match resolve_settings(&args) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = &settings.log_dir {
        if let Err(e) = init_file_logging(dir) {
            eprintln!("{}", e);
        }
    }

    let mut reader = match SampleReader::from_settings(&settings) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let stop = reader.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tlog!("[main] Stopping receiver...");
            stop.store(true, Ordering::Relaxed);
        }
    });

    // Serial I/O blocks, so the receive loop gets its own thread
    let format = args.format;
    let result = tokio::task::spawn_blocking(move || {
        let mut sink = ConsoleSink::stdout(format);
        reader.run(&mut sink)
    })
    .await;

    let code = match result {
        Ok(summary) if summary.is_failure() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tlog!("[main] Receiver task panicked: {:?}", e);
            ExitCode::FAILURE
        }
    };

    stop_file_logging();
    code
}
