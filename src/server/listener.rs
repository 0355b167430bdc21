use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{Instrument, info};

use crate::config::Config;
use crate::http::connection::{Connection, SessionContext};
use crate::metrics::{self, ServerMetrics};
use crate::ratelimit;
use crate::routing::RouteTable;

/// Stops a running [`Server`] from accepting new connections.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Accept loop plus the background tasks that keep buckets and metrics moving.
///
/// Sessions already running when shutdown is signalled are left to finish.
pub struct Server {
    config: Config,
    metrics: Arc<ServerMetrics>,
    shutdown: ShutdownHandle,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let metrics = Arc::new(ServerMetrics::new(config.metrics.hours_to_keep));
        let (tx, _) = watch::channel(false);
        Self {
            config,
            metrics,
            shutdown: ShutdownHandle { tx: Arc::new(tx) },
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Binds the configured address and serves `routes` until shutdown.
    pub async fn run(&self, routes: RouteTable) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.serve(listener, routes).await
    }

    pub async fn serve(&self, listener: TcpListener, routes: RouteTable) -> anyhow::Result<()> {
        info!("Listening on {}", listener.local_addr()?);

        let ctx = Arc::new(SessionContext::new(routes, self.metrics(), &self.config));
        let leak_driver = ratelimit::spawn_leak_driver(
            ctx.routes.buckets(),
            self.config.leak_interval(),
            self.shutdown.tx.subscribe(),
        );
        let aggregator = metrics::spawn_aggregator(
            self.metrics(),
            self.config.flush_interval(),
            self.shutdown.tx.subscribe(),
        );

        let mut shutdown = self.shutdown.tx.subscribe();

        while !*shutdown.borrow_and_update() {
            tokio::select! {
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };

                    tracing::debug!("Accepted connection from {}", peer);
                    if let Err(e) = socket.set_nodelay(true) {
                        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
                    }

                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(
                        async move {
                            let conn = Connection::new(socket, peer, false, ctx);
                            if let Err(e) = conn.run().await {
                                tracing::debug!(error = %e, "Connection aborted");
                            }
                            tracing::debug!("Connection closed");
                        }
                        .instrument(tracing::info_span!("session", %peer)),
                    );
                }

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Shutdown signal received, no longer accepting connections");
        let _ = leak_driver.await;
        let _ = aggregator.await;
        Ok(())
    }
}
