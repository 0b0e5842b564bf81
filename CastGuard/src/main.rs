use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use cgblocker::{Blocker, BlockerExt};
use cgcast::{CastControl, ChromecastDevice, DeviceSelector, discover_devices, find_device};
use cgconfig::{Config, init_config};
use cgpanel::{Panel, PanelExt};
use cgserver::{LogState, LoggingOptions, ServerBuilder, init_logging};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use utoipa::OpenApi;

/// Coupe le son d'un Chromecast quand le contenu diffusé contient un mot-clé
#[derive(Parser, Debug)]
#[command(name = "castguard", version, about)]
struct Cli {
    /// Lance le panneau web au lieu de surveiller au premier plan
    #[arg(long)]
    web: bool,

    /// Port HTTP du panneau web (remplace host.http_port)
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Répertoire de configuration
    #[arg(long, value_name = "DIR", default_value = "")]
    config_dir: String,

    /// Nom convivial du Chromecast à surveiller
    #[arg(long, value_name = "NAME")]
    device: Option<String>,

    /// Adresse IP du Chromecast (pas de découverte mDNS)
    #[arg(long, value_name = "IP")]
    host: Option<String>,

    /// Liste les Chromecast du réseau et quitte
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = init_config(&cli.config_dir).context("Cannot load configuration")?;
    let log_state = init_logging(LoggingOptions::from_config(&config));
    info!("Configuration loaded from {}", config.dir());

    let discovery_timeout = Duration::from_secs(config.get_discovery_timeout_secs());

    if cli.list {
        let devices =
            tokio::task::spawn_blocking(move || discover_devices(discovery_timeout)).await??;
        if devices.is_empty() {
            println!("No Chromecast devices found");
        }
        for device in devices {
            println!(
                "{}\t{}\t{}:{}",
                device.friendly_name, device.model_name, device.host, device.port
            );
        }
        return Ok(());
    }

    let selector = DeviceSelector {
        friendly_name: cli.device.or_else(|| config.get_device_friendly_name()),
        host: cli.host.or_else(|| config.get_device_host()),
        port: Some(config.get_device_port()),
    };
    let retry_delay = Duration::from_secs(config.get_discovery_retry_secs());
    let device_info = tokio::task::spawn_blocking(move || {
        find_device(&selector, discovery_timeout, retry_delay)
    })
    .await??;

    let device: Arc<dyn CastControl> = Arc::new(ChromecastDevice::new(device_info));
    let blocker = Arc::new(Blocker::from_config(device, &config));

    if cli.web {
        run_web(config, blocker, log_state, cli.port).await
    } else {
        run_foreground(blocker).await
    }
}

async fn run_web(
    config: Arc<Config>,
    blocker: Arc<Blocker>,
    log_state: LogState,
    port: Option<u16>,
) -> Result<()> {
    let mut builder = ServerBuilder::new_configured();
    if let Some(port) = port {
        builder = builder.http_port(port);
    }
    let mut server = builder.build();

    server.register_log_routes(log_state).await;
    server
        .add_openapi(
            cgconfig::api::create_router(config.clone()),
            cgconfig::ApiDoc::openapi(),
            "config",
        )
        .await;
    let command_timeout = Duration::from_secs(config.get_command_timeout_secs());
    server.register_blocker(blocker.clone(), command_timeout).await;
    server.add_panel_with_redirect::<Panel>("/panel").await;

    server.start().await?;
    let info = server.info();
    info!(
        "CastGuard panel ready at http://{}:{}/panel",
        info.base_url, info.http_port
    );
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    tokio::task::spawn_blocking(move || blocker.shutdown()).await?;
    Ok(())
}

async fn run_foreground(blocker: Arc<Blocker>) -> Result<()> {
    let keywords = blocker.keywords();
    if keywords.is_empty() {
        warn!("No keywords configured: cautious mode, every content is blocked");
    } else {
        info!("Blocking content matching: {}", keywords.join(", "));
    }
    info!("Press Ctrl+C to stop...");

    let stop_flag = Arc::new(AtomicBool::new(false));
    let flag = stop_flag.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping");
            flag.store(true, Ordering::SeqCst);
        }
    });

    tokio::task::spawn_blocking(move || blocker.run_foreground(&stop_flag)).await??;
    Ok(())
}
