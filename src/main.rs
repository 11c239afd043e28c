//! UDP server that forwards RGB colors to a Neewer light over Bluetooth LE.
//!
//! The light may need to be paired and trusted before running this (for
//! example with `bluetoothctl`).
//!
//! Run with: cargo run --features cli -- --mac-address D1:28:C0:6B:32:34

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use neewer_ble_bridge::{
    BridgeConfig, BtleplugTransport, CommandBridge, ConnectionManager, DeviceAddress, Mode,
};

#[derive(Parser)]
#[command(name = "neewer-bridge")]
#[command(about = "Control Neewer RGB lights over Bluetooth from UDP messages", long_about = None)]
struct Cli {
    /// Device mac address
    #[arg(short, long, required_unless_present_any = ["config", "list_commands"])]
    mac_address: Option<DeviceAddress>,

    /// Address to use for the UDP server (default: 0.0.0.0)
    #[arg(short = 'a', long)]
    udp_listen_addr: Option<String>,

    /// Port to use for the UDP server (default: 1664)
    #[arg(short = 'p', long)]
    udp_listen_port: Option<u16>,

    /// Command to execute: serve or scan (default: serve)
    #[arg(short = 'c', long)]
    command: Option<Mode>,

    /// List available commands
    #[arg(short, long)]
    list_commands: bool,

    /// Bluetooth adapter index (default: 0)
    #[arg(long)]
    adapter: Option<usize>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
        let mut config = match (&self.config, &self.mac_address) {
            (Some(path), _) => BridgeConfig::from_json_file(path)?,
            (None, Some(address)) => BridgeConfig::new(address.clone()),
            (None, None) => return Err("a mac address is required".into()),
        };

        if let Some(address) = self.mac_address {
            config.device.address = address;
        }
        if let Some(adapter) = self.adapter {
            config.device.adapter = adapter;
        }
        if let Some(address) = self.udp_listen_addr {
            config.listen.address = address;
        }
        if let Some(port) = self.udp_listen_port {
            config.listen.port = port;
        }
        if let Some(mode) = self.command {
            config.mode = mode;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info,neewer_ble_bridge=debug"),
    )
    .init();

    let cli = Cli::parse();
    if cli.list_commands {
        for name in Mode::names() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.into_config()?;

    let transport = BtleplugTransport::new(config.device.handles.clone());
    let manager = Arc::new(ConnectionManager::new(
        transport,
        config.device.connection(),
    ));

    if manager.connect().await.is_err() {
        warn!("Continuing without a connection to the device");
    }

    match config.mode {
        Mode::Scan => scan(&manager).await,
        Mode::Serve => {
            let bridge =
                CommandBridge::new(Arc::clone(&manager)).with_handle(config.device.handle);
            let served = tokio::select! {
                served = bridge.serve_forever(&config.listen.address, config.listen.port) => served,
                _ = tokio::signal::ctrl_c() => {
                    info!("Stopping UDP Server...");
                    Ok(())
                }
            };
            manager.disconnect().await;
            served?;
        }
    }
    Ok(())
}

async fn scan(manager: &ConnectionManager<BtleplugTransport>) {
    match manager.list_services_and_characteristics().await {
        Ok(characteristics) => {
            for c in characteristics {
                info!("Service: {}", c.service_uuid);
                info!("UUID: {}", c.uuid);
                info!("Properties: {:?}", c.properties);
                info!("Supports Read: {}", c.properties.supports_read());
                info!("Properties To String: {}", c.properties);
                match c.handle {
                    Some(handle) => info!("Handle: {}", handle),
                    None => info!("Handle: unknown"),
                }
                info!("");
            }
        }
        Err(e) => error!("Failed to scan device: {}", e),
    }

    let diagnostics = manager.diagnostics().await;
    match serde_json::to_string_pretty(&diagnostics) {
        Ok(json) => info!("Diagnostics: {}", json),
        Err(e) => warn!("Failed to render diagnostics: {}", e),
    }
    manager.disconnect().await;
}
