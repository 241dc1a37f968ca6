use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::thread;
use tracing::{info, warn};

use bus_transport::{HalfDuplexBus, MockPort, Rs485Port};
use device_registry as devreg;
use frame_codec::Address;

mod settings;
use settings::{load_settings, HubConfig};

#[derive(Parser, Debug)]
#[command(
    name = "hub",
    version,
    about = "RS-485 device hub",
    disable_help_subcommand = true
)]
struct Cli {
    /// Use the in-process mock bus instead of a serial port
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    mock: bool,

    /// Directory holding hub.json and products.json
    #[arg(long, default_value = "configs", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports that could carry the bus
    Ports,
    /// Probe the address range once and print what answered
    Scan,
    /// Scan, poll every data point once, print the snapshot as JSON
    Poll,
    /// Write one data-point value (unconfirmed; the bus has no ack)
    Set {
        #[arg(long)]
        address: u8,
        #[arg(long)]
        data_point: u8,
        #[arg(long)]
        value: i16,
    },
    /// Scan once, then poll on the configured interval
    Run {
        /// Stop after this many poll passes (default: run until killed)
        #[arg(long)]
        passes: Option<u64>,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    if let Commands::Ports = cli.command {
        return list_ports();
    }

    let config = load_settings(&cli.config)?;
    let catalog = devreg::load_catalog_file(format!("{}/products.json", cli.config))?;
    info!("loaded {count} products", count = catalog.len());

    let bus = open_bus(cli.mock, &config)?;
    let mut registry = devreg::DeviceRegistry::new(bus, catalog, config.registry_settings()?);

    match cli.command {
        Commands::Ports => Ok(()),
        Commands::Scan => {
            let found = registry.scan()?;
            info!("scan found {found} devices");
            for device in registry.snapshot().devices {
                println!(
                    "address {address}: product {product}",
                    address = device.address,
                    product = device.product_id
                );
            }
            Ok(())
        }
        Commands::Poll => {
            registry.scan()?;
            registry.update_values();
            println!("{}", serde_json::to_string_pretty(&registry.snapshot())?);
            Ok(())
        }
        Commands::Set {
            address,
            data_point,
            value,
        } => {
            let Some(address) = Address::new(address) else {
                bail!("address must be 1..=31");
            };
            registry.scan()?;
            registry.set_value(address, devreg::DataPointId(data_point), value)?;
            info!("wrote {value} to data point {data_point} on {address} (unconfirmed)");
            Ok(())
        }
        Commands::Run { passes } => run_loop(&mut registry, passes),
    }
}

fn run_loop(
    registry: &mut devreg::DeviceRegistry<Box<dyn HalfDuplexBus>>,
    passes: Option<u64>,
) -> Result<()> {
    let pairing_events = registry.subscribe();
    let found = registry.scan()?;
    info!("scan found {found} devices");

    let interval = registry.settings().update_interval;
    let mut pass = 0u64;
    loop {
        registry.update_values();
        for event in pairing_events.try_iter() {
            info!(
                "paired: address {address}, product {product}",
                address = event.device.address,
                product = event.device.product_id
            );
        }
        match serde_json::to_string(&registry.snapshot()) {
            Ok(json) => println!("{json}"),
            Err(err) => warn!("snapshot serialization failed: {err}"),
        }

        pass += 1;
        if passes.is_some_and(|limit| pass >= limit) {
            return Ok(());
        }
        thread::sleep(interval);
    }
}

fn open_bus(mock: bool, config: &HubConfig) -> Result<Box<dyn HalfDuplexBus>> {
    if mock {
        info!("using mock bus");
        return Ok(Box::new(MockPort::new()));
    }
    let serial = config.serial_settings()?;
    let port = Rs485Port::open(&serial)
        .with_context(|| format!("opening bus port {path}", path = serial.path))?;
    Ok(Box::new(port))
}

fn list_ports() -> Result<()> {
    for port in Rs485Port::list()? {
        println!("{name}\t{driver}", name = port.name, driver = port.driver);
    }
    Ok(())
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
