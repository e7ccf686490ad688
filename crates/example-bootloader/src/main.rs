//! Example Bootloader Simulator
//!
//! Simulates a microcontroller running an XCP bootloader on TCP, so that
//! netboot can be exercised without hardware.
//!
//! # Usage
//!
//! ```bash
//! ./example-bootloader --listen 0.0.0.0:1000
//! ```
//!
//! Simulate a device that needs a manual reset before it answers:
//! ```bash
//! ./example-bootloader --silent-connects 50
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use example_bootloader::{BootloaderConfig, BootloaderServer, SimulatedBootloader};
use netboot_srec::srecord::SrecordWriter;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "example-bootloader")]
#[command(about = "Simulated XCP bootloader for netboot development")]
struct Args {
    /// Configuration file path (TOML format)
    /// If provided, overrides command-line options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:1000")]
    listen: String,

    /// Report Intel (little endian) byte order, the default
    #[arg(long, conflicts_with = "motorola")]
    intel: bool,

    /// Report Motorola (big endian) byte order
    #[arg(long)]
    motorola: bool,

    /// MAX_CTO reported on CONNECT and PROGRAM_START
    #[arg(long, default_value_t = 64)]
    max_cto: u8,

    /// Number of CONNECT requests to ignore before answering
    #[arg(long, default_value_t = 0)]
    silent_connects: u32,

    /// Write the programmed image to this S-record file on shutdown
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        "example_bootloader=debug"
    } else {
        "example_bootloader=info"
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = if let Some(config_path) = &args.config {
        info!("Loading config from: {}", config_path.display());
        BootloaderConfig::load(config_path)
            .with_context(|| format!("Failed to load config: {}", config_path.display()))?
    } else {
        BootloaderConfig {
            motorola: args.motorola && !args.intel,
            max_cto: args.max_cto,
            max_prog_cto: args.max_cto,
            silent_connects: args.silent_connects,
            ..Default::default()
        }
    };

    info!(
        byte_order = ?config.byte_order(),
        max_cto = config.max_cto,
        max_dto = config.max_dto,
        flash = format!("0x{:08X} + {}", config.flash_base, config.flash_size),
        "Starting bootloader simulator"
    );

    let bootloader = Arc::new(SimulatedBootloader::new(config));
    let server = BootloaderServer::bind(args.listen.as_str(), bootloader.clone())
        .await
        .with_context(|| format!("Failed to listen on {}", args.listen))?;

    info!(addr = %server.local_addr()?, "Bootloader ready - waiting for masters");
    info!("Press Ctrl+C to stop");

    tokio::select! {
        result = server.run() => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down...");
        }
    }

    if let Some(path) = &args.dump {
        dump_image(&bootloader, path)?;
    }

    info!("Bootloader simulator stopped");
    Ok(())
}

fn dump_image(bootloader: &SimulatedBootloader, path: &Path) -> Result<()> {
    let Some((address, bytes)) = bootloader.programmed() else {
        info!("Nothing programmed, no image written");
        return Ok(());
    };

    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = SrecordWriter::new(BufWriter::new(file), 32);
    writer.write_header("example-bootloader")?;
    writer.write_data(address, &bytes)?;
    writer.finish(address)?;

    info!(
        path = %path.display(),
        address = format!("0x{:08X}", address),
        len = bytes.len(),
        "Wrote programmed image"
    );
    Ok(())
}
