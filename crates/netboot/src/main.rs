//! netboot - Firmware updates over TCP/IP
//!
//! Sends an S-record firmware image to a microcontroller running an XCP
//! bootloader that listens on a TCP port.

mod config;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use netboot_srec::SrecordSource;
use netboot_update::Updater;
use netboot_xcp::TcpConnector;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{ConsoleReporter, OutputContext};

#[derive(Parser, Debug)]
#[command(name = "netboot")]
#[command(author, version, about = "Firmware updates over TCP/IP for XCP bootloaders")]
#[command(override_usage = "netboot -d<address> -p<port> <FIRMWARE>")]
struct Cli {
    /// IP address or hostname of the target
    #[arg(short = 'd', long = "device", env = "NETBOOT_DEVICE")]
    device: String,

    /// TCP port the bootloader listens on
    #[arg(short, long, env = "NETBOOT_PORT")]
    port: u16,

    /// S-record firmware file to program
    #[arg(value_name = "FIRMWARE")]
    firmware: PathBuf,

    /// Configuration file path
    #[arg(short, long, env = "NETBOOT_CONFIG")]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the transcript
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable config file");
            Config::default()
        }),
    };
    let merged = config.merge_with_args(&cli.device, cli.port, cli.no_color);

    let ctx = OutputContext::new(merged.no_color, cli.quiet);
    ctx.banner();

    let mut updater = Updater::new(
        SrecordSource,
        TcpConnector::new(merged.connect_timeout),
        merged.update,
    )
    .with_reporter(ConsoleReporter::stdout(cli.quiet));

    match updater.run(&cli.firmware).await {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(failure) => {
            ctx.error(&format!("Error: {failure}"));
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_attached_short_values() {
        let cli = Cli::try_parse_from(["netboot", "-d192.168.1.100", "-p2101", "fw.srec"]).unwrap();
        assert_eq!(cli.device, "192.168.1.100");
        assert_eq!(cli.port, 2101);
        assert_eq!(cli.firmware, PathBuf::from("fw.srec"));
        assert!(!cli.quiet);
    }

    #[test]
    fn test_long_options() {
        let cli = Cli::try_parse_from([
            "netboot",
            "--device",
            "ecu.local",
            "--port",
            "1000",
            "--quiet",
            "--no-color",
            "app.s19",
        ])
        .unwrap();
        assert_eq!(cli.device, "ecu.local");
        assert_eq!(cli.port, 1000);
        assert!(cli.quiet);
        assert!(cli.no_color);
    }

    #[test]
    fn test_missing_firmware_is_usage_error() {
        let err = Cli::try_parse_from(["netboot", "-d10.0.0.1", "-p1000"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_port_must_be_numeric() {
        assert!(Cli::try_parse_from(["netboot", "-d10.0.0.1", "-pabc", "fw.srec"]).is_err());
    }
}
