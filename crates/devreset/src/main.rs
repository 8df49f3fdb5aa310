//! devreset
//!
//! Soft-resets a USB device: opens it exclusively, applies its first
//! configuration and asks the host controller to re-enumerate it.

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser};
use common::{MatchFilter, setup_logging};
use devreset::config::ResetConfig;
use devreset::driver::ResetDriver;
use devreset::listing::{format_device, list_devices};
use devreset::usb::RusbHost;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "devreset")]
#[command(
    author,
    version,
    about = "Force a USB device to re-enumerate without unplugging it"
)]
#[command(override_usage = "devreset [OPTIONS] <PRODUCT_ID> <VENDOR_ID>
       devreset --list-devices [<PRODUCT_ID> <VENDOR_ID>]
       devreset --save-config")]
#[command(long_about = "
Finds the attached USB devices with the given product and vendor id, opens
each one exclusively, applies its first configuration and requests a port
reset. The device drops off the bus and comes back as if it had been
replugged.

Ids may be decimal, 0x-prefixed hex or 0-prefixed octal.

EXAMPLES:
    # Reset a Microchip PICkit (vendor 0x04d8, product 0x000a)
    devreset 0x000a 0x04d8

    # Show what is attached without resetting anything
    devreset --list-devices

    # Give up immediately if another process holds the device
    devreset --attempts 1 0x000a 0x04d8

CONFIGURATION:
    The tool looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/devreset/config.toml
    3. /etc/devreset/config.toml
    4. Built-in defaults
")]
struct Args {
    /// USB product id
    #[arg(
        value_name = "PRODUCT_ID",
        allow_negative_numbers = true,
        requires = "vendor_id",
        required_unless_present_any = ["list_devices", "save_config"]
    )]
    product_id: Option<String>,

    /// USB vendor id
    #[arg(
        value_name = "VENDOR_ID",
        allow_negative_numbers = true,
        required_unless_present_any = ["list_devices", "save_config"]
    )]
    vendor_id: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// List attached USB devices and exit (restricted to the ids if given)
    #[arg(long)]
    list_devices: bool,

    /// Open attempts while another process holds the device
    #[arg(long, value_name = "N")]
    attempts: Option<u32>,

    /// Leave kernel drivers attached when configuring
    #[arg(long)]
    keep_kernel_drivers: bool,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version land here too and are not failures
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ResetConfig::default();
        let path = ResetConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Ids are validated before anything touches the USB subsystem
    let filter = match (&args.product_id, &args.vendor_id) {
        (Some(product_id), Some(vendor_id)) => Some(
            MatchFilter::from_args(product_id, vendor_id)
                .map_err(|e| anyhow!("{}\n\n{}", e, Args::command().render_usage()))?,
        ),
        _ => None,
    };

    if !args.list_devices
        && let Some(filter) = &filter
    {
        println!(
            "Looking for productID=0x{:04x} vendorID=0x{:04x}",
            filter.product_id(),
            filter.vendor_id()
        );
    }

    let mut config = if let Some(ref path) = args.config {
        ResetConfig::load_from(path).context("Failed to load configuration")?
    } else {
        ResetConfig::load_or_default().context("Failed to load configuration")?
    };

    if let Some(attempts) = args.attempts {
        config.reset.max_open_attempts = attempts;
    }
    if args.keep_kernel_drivers {
        config.reset.detach_kernel_drivers = false;
    }
    if let Some(ref level) = args.log_level {
        config.general.log_level = level.clone();
    }
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.general.log_level).context("Failed to setup logging")?;
    info!("devreset v{}", env!("CARGO_PKG_VERSION"));

    let host = RusbHost::new(config.reset.detach_kernel_drivers)
        .context("Failed to initialize USB subsystem")?;

    if args.list_devices {
        return list_devices_mode(&host, filter.as_ref());
    }

    let filter = filter.ok_or_else(|| anyhow!("Missing productID or vendorID"))?;

    let driver = ResetDriver::new(host).with_retry_policy(config.reset.retry_policy());
    let summary = driver
        .reset_matching_devices(&filter)
        .context("Failed to enumerate matching devices")?;

    println!(
        "Reset {} of {} matching device(s)",
        summary.reset_count(),
        summary.matched()
    );
    Ok(())
}

/// List USB devices and exit
fn list_devices_mode(host: &RusbHost, filter: Option<&MatchFilter>) -> Result<()> {
    let devices = list_devices(host, filter).context("Failed to list devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):", devices.len());
        for device in &devices {
            println!("  {}", format_device(device));
        }
    }

    Ok(())
}
