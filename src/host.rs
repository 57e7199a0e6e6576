//! Adapter between a host's activate/deactivate lifecycle and the
//! bootstrap. It holds no directory logic of its own.

use tracing::{error, info};

use crate::bootstrap::{Bootstrap, BootstrapState};
use crate::error::{DirectoryError, Result};
use crate::resource::ResourceContainer;
use crate::server::{LdapServer, ListenerHandle};
use crate::settings::Settings;

#[derive(Default)]
pub struct DirectoryHost {
    bootstrap: Option<Bootstrap>,
    listener: Option<ListenerHandle>,
}

impl DirectoryHost {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn is_active(&self) -> bool {
        self.bootstrap
            .as_ref()
            .is_some_and(|b| b.state() == BootstrapState::Started)
    }
    pub fn listener(&self) -> Option<&ListenerHandle> {
        self.listener.as_ref()
    }
    pub fn bootstrap(&self) -> Option<&Bootstrap> {
        self.bootstrap.as_ref()
    }

    pub async fn activate(&mut self, settings: &Settings, containers: Vec<Box<dyn ResourceContainer>>) -> Result<()> {
        if self.is_active() {
            return Err(DirectoryError::Invariant("host is already active".to_string()));
        }
        let working_directory = settings.ensure_working_directory()?;
        let mut bootstrap = settings
            .partition_specs()
            .into_iter()
            .fold(Bootstrap::new(working_directory, containers), Bootstrap::with_partition);

        // bootstrap touches the filesystem and SQLite, keep it off the runtime threads
        let (mut bootstrap, started) = tokio::task::spawn_blocking(move || {
            let started = bootstrap.start();
            (bootstrap, started)
        })
        .await
        .map_err(|e| DirectoryError::StartupFailed(format!("bootstrap task failed: {}", e)))?;
        let service = started?;

        match LdapServer::new(service, settings.port).start().await {
            Ok(listener) => {
                self.listener = listener;
                self.bootstrap = Some(bootstrap);
                info!(port = settings.port, "directory host activated");
                Ok(())
            }
            Err(e) => {
                error!(error=%e, "could not start the LDAP listener");
                bootstrap.stop();
                Err(e)
            }
        }
    }

    pub async fn deactivate(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop().await;
        }
        if let Some(mut bootstrap) = self.bootstrap.take() {
            bootstrap.stop();
        }
        info!("directory host deactivated");
    }
}
