//! Calculate server state and lifecycle

use crate::api::{CalculateRequest, CalculateResponse};
use crate::engine::{Engine, EngineConfig};
use crate::error::{ServeResult, TensorServeError};
use crate::http::routes::create_router;
use crate::logging::init_logging_default;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub type ServerResult<T> = anyhow::Result<T>;

/// Default bind address of the Calculate service
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:9876";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Stop waiting for a calculation after this long
    pub request_timeout: Option<Duration>,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9876)),
            request_timeout: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

/// Shared handler state
#[derive(Debug, Clone)]
pub struct CalcServer {
    pub engine: Arc<Engine>,
    pub request_timeout: Option<Duration>,
}

impl CalcServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run one request on a blocking thread.
    ///
    /// On timeout the caller gets `Timeout`; the computation itself keeps
    /// running until it finishes and its scope is closed.
    pub async fn calculate(&self, request: CalculateRequest) -> ServeResult<CalculateResponse> {
        let engine = Arc::clone(&self.engine);
        let started = Instant::now();
        let tensors = request.tensors.len();

        let task = tokio::task::spawn_blocking(move || engine.calculate(&request));
        let joined = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| TensorServeError::Timeout(limit))?,
            None => task.await,
        };
        let response = joined
            .map_err(|e| TensorServeError::InternalError(format!("calculation task failed: {}", e)))??;

        info!(
            tensors,
            results = response.results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "calculate finished"
        );
        Ok(response)
    }
}

/// Start the Calculate service and serve until ctrl-c.
pub async fn run_server(config: ServerConfig) -> ServerResult<()> {
    init_logging_default();

    let engine = Arc::new(Engine::new(config.engine.clone())?);
    let server = CalcServer::new(engine).with_request_timeout(config.request_timeout);
    let app = create_router(server);

    info!(
        "Starting tensorserve on {} (backend={})",
        config.bind_addr, config.engine.backend
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("tensorserve stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
