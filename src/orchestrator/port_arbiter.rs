//! Service port arbitration.
//!
//! Before the local API starts serving, the configured port is classified:
//! free ports are bound, healthy owners are left alone, and owners that fail
//! the HTTP probe get exactly one kill attempt before the port is bound
//! anyway. No retries, no re-checks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::net::TcpListener;
use tracing::{error, info, info_span, warn, Instrument};

use crate::context::SessionContext;
use crate::supervisor::ProcessSupervisor;
use crate::{AppError, Result};

/// Per-request timeout of the ownership probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Ownership of the service port at the moment it was examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Nothing listens on the port.
    Free,
    /// The controller itself already owns the port.
    BoundBySelf,
    /// Another process owns the port and answers the probe.
    ResponsiveForeign,
    /// Another process owns the port but the probe failed.
    UnresponsiveForeign,
}

/// Result of [`PortArbiter::acquire`].
#[derive(Debug)]
pub enum Acquisition {
    /// The port was free and is now bound.
    Bound(TcpListener),
    /// A healthy server already serves the port; nothing was bound.
    AlreadyRunning,
    /// An unresponsive owner was killed (or the attempt failed) and the port bound.
    Reclaimed(TcpListener),
}

impl Acquisition {
    /// The bound listener, if this acquisition produced one.
    #[must_use]
    pub fn into_listener(self) -> Option<TcpListener> {
        match self {
            Self::Bound(listener) | Self::Reclaimed(listener) => Some(listener),
            Self::AlreadyRunning => None,
        }
    }
}

/// Resolves who owns the service port and binds it when appropriate.
pub struct PortArbiter {
    supervisor: Arc<dyn ProcessSupervisor>,
    ctx: Arc<SessionContext>,
    entry_asset: PathBuf,
    client: Client,
}

impl PortArbiter {
    /// Build an arbiter that requires `entry_asset` to exist before binding.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TransientEgress` if the HTTP client cannot be built.
    pub fn new(
        supervisor: Arc<dyn ProcessSupervisor>,
        ctx: Arc<SessionContext>,
        entry_asset: PathBuf,
    ) -> Result<Self> {
        let client = Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self {
            supervisor,
            ctx,
            entry_asset,
            client,
        })
    }

    /// Classify the current owner of `host:port`.
    pub async fn classify(&self, host: &str, port: u16) -> BindingState {
        if !self.supervisor.is_port_bound(host, port) {
            return BindingState::Free;
        }
        if self.supervisor.pid_on_port(port) == Some(self.ctx.pid()) {
            return BindingState::BoundBySelf;
        }
        match self.probe(host, port).await {
            Ok(()) => BindingState::ResponsiveForeign,
            Err(err) => {
                warn!(%err, host, port, "port owner failed the health probe");
                BindingState::UnresponsiveForeign
            }
        }
    }

    /// Acquire `host:port` for the local API.
    ///
    /// # Errors
    ///
    /// Returns `AppError::FatalStartupPrecondition` if the entry asset is
    /// missing, or `AppError::Io` if binding fails.
    pub async fn acquire(&self, host: &str, port: u16) -> Result<Acquisition> {
        let span = info_span!("acquire_port", host, port);
        async move {
            match self.classify(host, port).await {
                BindingState::Free => {
                    let listener = self.bind(host, port).await?;
                    info!("port was free; bound");
                    Ok(Acquisition::Bound(listener))
                }
                BindingState::BoundBySelf => {
                    info!("port already owned by this controller");
                    Ok(Acquisition::AlreadyRunning)
                }
                BindingState::ResponsiveForeign => {
                    info!("a healthy server already owns the port; leaving it running");
                    Ok(Acquisition::AlreadyRunning)
                }
                BindingState::UnresponsiveForeign => {
                    match self.supervisor.kill_port_owner(port) {
                        Ok(()) => info!("killed unresponsive port owner"),
                        Err(err) => error!(%err, "failed to kill unresponsive port owner"),
                    }
                    let listener = self.bind(host, port).await?;
                    info!("port reclaimed");
                    Ok(Acquisition::Reclaimed(listener))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn probe(&self, host: &str, port: u16) -> Result<()> {
        let url = format!("http://{host}:{port}/");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::TransientEgress(format!(
                "probe of {url} returned {status}"
            )))
        }
    }

    async fn bind(&self, host: &str, port: u16) -> Result<TcpListener> {
        if !self.entry_asset.is_file() {
            return Err(AppError::FatalStartupPrecondition(format!(
                "entry asset {} is missing",
                self.entry_asset.display()
            )));
        }
        TcpListener::bind((host, port)).await.map_err(|err| {
            AppError::Io(format!("failed to bind {host}:{port}: {err}"))
        })
    }
}
