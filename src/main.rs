use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dirboot::host::DirectoryHost;
use dirboot::settings::Settings;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // the only argument is an optional settings file
    let settings_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = match Settings::load(settings_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error=%e, "could not load settings");
            std::process::exit(1);
        }
    };
    let containers = match settings.open_containers() {
        Ok(containers) => containers,
        Err(e) => {
            error!(error=%e, "could not open resource containers");
            std::process::exit(1);
        }
    };

    let mut host = DirectoryHost::new();
    if let Err(e) = host.activate(&settings, containers).await {
        error!(error=%e, "error activating the directory service");
        std::process::exit(1);
    }
    if let Some(listener) = host.listener() {
        info!(addr=%listener.local_addr(), "directory service ready");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error=%e, "could not wait for the shutdown signal");
    }
    host.deactivate().await;
}
