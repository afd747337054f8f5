use anyhow::{Context, Result, anyhow};
use clap::Parser;
use optee_core::ClientConfig;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Invoke an OP-TEE TA function through the TrEE service driver", long_about = None)]
struct Args {
    /// TA function code (decimal or 0x-prefixed hex)
    #[arg(short, long, value_parser = parse_u32)]
    function: u32,

    /// Command input as hex bytes
    #[arg(long, conflicts_with = "input_file")]
    input: Option<String>,

    /// Read command input from a file
    #[arg(long)]
    input_file: Option<String>,

    /// Output buffer size in bytes
    #[arg(long)]
    output_size: Option<usize>,

    /// Device path (overrides the config file)
    #[arg(short, long)]
    device: Option<String>,

    /// Device-control code (overrides the config file)
    #[arg(long, value_parser = parse_u32)]
    ioctl: Option<u32>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn load_input(args: &Args) -> Result<Vec<u8>> {
    if let Some(text) = &args.input {
        return hex::decode(text.trim()).context("--input is not valid hex");
    }
    if let Some(path) = &args.input_file {
        return std::fs::read(path).with_context(|| format!("reading {path}"));
    }
    Ok(Vec::new())
}

fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load_from_file(path).with_context(|| format!("loading {path}"))?,
        None => ClientConfig::default(),
    };
    if let Some(device) = &args.device {
        config.device_path = Some(device.clone());
    }
    if let Some(code) = args.ioctl {
        config.ioctl_code = code;
    }
    if let Some(size) = args.output_size {
        config.output_capacity = size;
    }
    Ok(config)
}

#[cfg(windows)]
fn run(args: &Args) -> Result<()> {
    use optee_core::{CommandInvoker, CommandRequest, WindowsDevice};

    let config = resolve_config(args)?;
    let input = load_input(args)?;
    let path = config
        .device_path
        .as_deref()
        .ok_or_else(|| anyhow!("no device path given (use --device or the config file)"))?;

    let device = WindowsDevice::open(path, config.ioctl_code)?;
    let invoker = CommandInvoker::new(device);

    let mut output = vec![0u8; config.output_capacity];
    let n = invoker.invoke(&CommandRequest::new(args.function, &input), &mut output)?;

    info!(bytes = n, "Function completed");
    println!("{}", hex::encode(&output[..n]));
    Ok(())
}

#[cfg(not(windows))]
fn run(args: &Args) -> Result<()> {
    resolve_config(args)?;
    load_input(args)?;
    Err(anyhow!("the TrEE service driver is only available on Windows"))
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(function = %format!("{:#x}", args.function), "Starting optee invocation");

    if let Err(e) = run(&args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
