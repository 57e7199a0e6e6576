//! TCP transport for the directory service.
//!
//! The listener owns the socket only; protocol handling belongs to the
//! directory engine. It reads the shared service handle and never changes
//! its lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::error::{DirectoryError, Result};
use crate::service::DirectoryService;

pub const DEFAULT_PORT: i64 = 10389;

/// How often an idle connection re-checks that the service is still running.
const SERVICE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct LdapServer {
    service: Arc<DirectoryService>,
    port: i64,
}

pub struct ListenerHandle {
    local_addr: SocketAddr,
    active: Arc<AtomicUsize>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
    /// Stops accepting, closes every open connection and waits for all of
    /// their tasks to finish.
    pub async fn stop(self) {
        // the accept loop holds a receiver until it returns
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error=%e, "listener task ended abnormally");
        }
        info!(addr=%self.local_addr, "LDAP listener stopped");
    }
}

impl LdapServer {
    pub fn new(service: Arc<DirectoryService>, port: i64) -> Self {
        Self { service, port }
    }

    /// Binds the transport. A non-positive port disables the listener and
    /// yields `None`.
    pub async fn start(&self) -> Result<Option<ListenerHandle>> {
        if self.port <= 0 {
            info!(port = self.port, "LDAP listener disabled");
            return Ok(None);
        }
        let port = u16::try_from(self.port)
            .map_err(|_| DirectoryError::Config(format!("port {} is out of range", self.port)))?;
        if !self.service.is_started() {
            return Err(DirectoryError::StartupFailed(
                "cannot bind a listener to a directory service that is not started".to_string(),
            ));
        }
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let local_addr = listener.local_addr()?;
        let active = Arc::new(AtomicUsize::new(0));
        let (shutdown, shutdown_signal) = watch::channel(false);

        let service = Arc::clone(&self.service);
        let counter = Arc::clone(&active);
        let task = tokio::spawn(accept_loop(listener, counter, service, shutdown_signal));
        info!(addr=%local_addr, "LDAP listener bound");
        Ok(Some(ListenerHandle {
            local_addr,
            active,
            shutdown,
            task,
        }))
    }
}

// ------------- Connections -------------
async fn accept_loop(
    listener: TcpListener,
    active: Arc<AtomicUsize>,
    service: Arc<DirectoryService>,
    mut shutdown: watch::Receiver<bool>,
) {
    let connection_shutdown = shutdown.clone();
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            // a dropped sender counts as a stop request
            _ = shutdown.changed() => break,
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    warn!(error=%e, "connection task ended abnormally");
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        Arc::clone(&active),
                        Arc::clone(&service),
                        connection_shutdown.clone(),
                    ));
                }
                Err(e) => warn!(error=%e, "accept failed"),
            }
        }
    }
    drop(listener);
    debug!(open = connections.len(), "draining connections");
    while let Some(finished) = connections.join_next().await {
        if let Err(e) = finished {
            warn!(error=%e, "connection task ended abnormally");
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    active: Arc<AtomicUsize>,
    service: Arc<DirectoryService>,
    mut shutdown: watch::Receiver<bool>,
) {
    active.fetch_add(1, Ordering::SeqCst);
    debug!(%peer, "connection accepted");
    let mut buffer = [0u8; 4096];
    while service.is_started() && !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => break,
            // wake up to notice a service that was torn down underneath us
            _ = tokio::time::sleep(SERVICE_POLL_INTERVAL) => continue,
            read = stream.read(&mut buffer) => match read {
                Ok(0) => break,
                Ok(read) => debug!(%peer, bytes = read, "request bytes received"),
                Err(e) => {
                    debug!(%peer, error=%e, "connection error");
                    break;
                }
            }
        }
    }
    if let Err(e) = stream.shutdown().await {
        debug!(%peer, error=%e, "connection shutdown failed");
    }
    active.fetch_sub(1, Ordering::SeqCst);
    debug!(%peer, "connection closed");
}
