//! MCP server lifecycle: bind, serve, stop.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::handler::{McpHandler, ProgressEvent};
use super::session::SessionRegistry;
use super::transport::{self, TransportState};
use crate::bus::{EventChannel, Subscription};

/// How long `stop()` waits for in-flight connections before aborting the server task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on how often idle sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpConfig {
    /// Default port when `start` is called without one
    pub port: u16,
    /// Interval between keep-alive comments on push streams
    pub keep_alive: Duration,
    /// Sessions without a push stream are dropped after this long unused
    pub session_idle: Duration,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            port: 3777,
            keep_alive: Duration::from_secs(15),
            session_idle: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Error)]
pub enum McpServerError {
    #[error("MCP server is already running on port {0}")]
    AlreadyRunning(u16),

    #[error("Failed to bind MCP server to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Where agents can reach a running server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct McpEndpoints {
    pub port: u16,
    pub local_url: String,
    pub network_url: String,
    pub sse_url: String,
    pub network_address: String,
}

impl McpEndpoints {
    fn new(port: u16, network_address: IpAddr) -> Self {
        Self {
            port,
            local_url: format!("http://127.0.0.1:{}/mcp", port),
            network_url: format!("http://{}:{}/mcp", network_address, port),
            sse_url: format!("http://127.0.0.1:{}/sse", port),
            network_address: network_address.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct McpStatus {
    pub running: bool,
    pub port: Option<u16>,
    pub active_sessions: usize,
    pub total_progress_events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<McpEndpoints>,
}

struct RunningServer {
    endpoints: McpEndpoints,
    sessions: Arc<SessionRegistry>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// The local MCP endpoint.
///
/// The progress log survives stop/start cycles; sessions do not.
pub struct McpServer {
    config: McpConfig,
    handler: McpHandler,
    running: Mutex<Option<RunningServer>>,
}

impl McpServer {
    pub fn new(config: McpConfig) -> Self {
        Self {
            config,
            handler: McpHandler::new(Arc::new(EventChannel::new("mcp-progress"))),
            running: Mutex::new(None),
        }
    }

    /// Bind `0.0.0.0:port` (or the configured port) and start serving.
    ///
    /// Port 0 picks a free port; the bound one is reported in the endpoints.
    pub async fn start(&self, port: Option<u16>) -> Result<McpEndpoints, McpServerError> {
        let mut running = self.running.lock().await;
        if let Some(server) = running.as_ref() {
            return Err(McpServerError::AlreadyRunning(server.endpoints.port));
        }

        let port = port.unwrap_or(self.config.port);
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
            .map_err(|source| McpServerError::Bind { port, source })?;
        let bound = listener.local_addr().map(|a| a.port()).unwrap_or(port);

        let sessions = Arc::new(SessionRegistry::new());
        let app = transport::router(Arc::new(TransportState {
            handler: self.handler.clone(),
            sessions: Arc::clone(&sessions),
            keep_alive: self.config.keep_alive,
        }));

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
            {
                tracing::error!("[mcp] server error: {}", e);
            }
        });
        spawn_session_sweeper(
            Arc::clone(&sessions),
            self.config.session_idle,
            shutdown.clone(),
        );

        let endpoints = McpEndpoints::new(bound, network_address());
        tracing::info!(
            "[mcp] listening on port {} (local {}, network {})",
            bound,
            endpoints.local_url,
            endpoints.network_url
        );

        *running = Some(RunningServer {
            endpoints: endpoints.clone(),
            sessions,
            shutdown,
            task,
        });
        Ok(endpoints)
    }

    /// Stop serving. Returns `false` if the server was not running.
    ///
    /// Push streams are closed and the registry cleared before the listener is released.
    pub async fn stop(&self) -> bool {
        let Some(server) = self.running.lock().await.take() else {
            return false;
        };

        let closed = server.sessions.clear();
        server.shutdown.cancel();

        let mut task = server.task;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            tracing::warn!("[mcp] graceful shutdown timed out, aborting server task");
            task.abort();
            let _ = task.await;
        }

        tracing::info!(
            "[mcp] stopped on port {} ({} session(s) closed)",
            server.endpoints.port,
            closed
        );
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn status(&self) -> McpStatus {
        let running = self.running.lock().await;
        let total_progress_events = self.handler.progress().len();
        match running.as_ref() {
            Some(server) => McpStatus {
                running: true,
                port: Some(server.endpoints.port),
                active_sessions: server.sessions.count(),
                total_progress_events,
                endpoints: Some(server.endpoints.clone()),
            },
            None => McpStatus {
                running: false,
                port: None,
                active_sessions: 0,
                total_progress_events,
                endpoints: None,
            },
        }
    }

    pub fn progress_log(&self) -> Vec<ProgressEvent> {
        self.handler.progress().log()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.handler.progress().subscribe(listener)
    }

    pub fn handler(&self) -> &McpHandler {
        &self.handler
    }
}

/// Periodically drop sessions that were opened and then abandoned.
fn spawn_session_sweeper(
    sessions: Arc<SessionRegistry>,
    max_idle: Duration,
    shutdown: CancellationToken,
) {
    let period = max_idle.clamp(Duration::from_secs(1), SESSION_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    sessions.evict_idle(max_idle);
                }
            }
        }
    });
}

/// Best-effort LAN address of this machine, loopback when none is found.
///
/// Connecting a UDP socket sends nothing; it only asks the OS which local
/// interface would route to the target.
pub fn network_address() -> IpAddr {
    let lookup = || -> Option<IpAddr> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
        socket.connect(("192.0.2.1", 80)).ok()?;
        let ip = socket.local_addr().ok()?.ip();
        (!ip.is_loopback() && !ip.is_unspecified()).then_some(ip)
    };
    lookup().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
