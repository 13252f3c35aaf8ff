//! Nested display viewer entry point.
//!
//! ```text
//! vhwc-viewer                     Connect with defaults
//! vhwc-viewer --config <path>     Use custom config TOML
//! vhwc-viewer --address <ip:port> Override the display address
//! vhwc-viewer --gen-config        Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vhwc_viewer::client::ViewerClient;
use vhwc_viewer::config::ViewerConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vhwc-viewer", about = "Nested display frame metadata viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vhwc-viewer.toml")]
    config: PathBuf,

    /// Display address (overrides config). Example: 192.168.1.20:2345
    #[arg(short, long)]
    address: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(addr) = cli.address {
        config.network.address = addr;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vhwc-viewer v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        ctrl_c.cancel();
    });

    let mut client = ViewerClient::new(config);
    client.run(cancel).await;

    Ok(())
}
