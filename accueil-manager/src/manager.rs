use accueil_core::config::Config;
use accueil_core::session::SessionStore;
use accueil_dialog::DialogOrchestrator;
use accueil_providers::{build_backend, ResponseBackend};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::server::run_server;
use crate::state::AppState;
use crate::sweeper::spawn_sweeper;

/// Owns the shared services and runs the HTTP server with its sweeper
pub struct Manager {
    config: Config,
    state: AppState,
}

impl Manager {
    /// Build the store, backend client and orchestrator from configuration
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let backend = build_backend(&config.backend)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Same as `from_config` with an already constructed backend
    pub fn with_backend(config: Config, backend: Arc<dyn ResponseBackend>) -> Self {
        let sessions = Arc::new(SessionStore::new(&config.sessions));
        let orchestrator = Arc::new(DialogOrchestrator::new(sessions, backend, &config.dialog));
        Self {
            config,
            state: AppState::new(orchestrator),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let host: IpAddr = self
            .config
            .server
            .host
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid server host '{}': {}", self.config.server.host, e))?;
        Ok(SocketAddr::new(host, self.config.server.port))
    }

    /// Serve until Ctrl-C, then stop the sweeper and drain the server
    pub async fn run(self) -> anyhow::Result<()> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let addr = self.bind_addr()?;

        let sweeper = spawn_sweeper(
            Arc::clone(self.state.sessions()),
            Duration::from_secs(self.config.sessions.sweep_interval_secs),
            shutdown_tx.subscribe(),
        );

        let server_rx = shutdown_tx.subscribe();
        let mut server = tokio::spawn(run_server(self.state.clone(), addr, server_rx));

        info!(
            "Dialog server ready on {} (backend: {})",
            addr,
            self.state.orchestrator.backend().describe()
        );

        let early_exit = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutdown requested");
                None
            }
            finished = &mut server => Some(finished),
        };

        let _ = shutdown_tx.send(());
        if let Err(e) = sweeper.await {
            error!("Sweeper task failed: {}", e);
        }
        match early_exit {
            Some(finished) => finished??,
            None => server.await??,
        }
        info!("Dialog server stopped");
        Ok(())
    }
}
