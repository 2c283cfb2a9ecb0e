use clap::{Parser, Subcommand};
use reqwest::Client;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tensorserve::engine::{BackendKind, Engine, EngineConfig, EvaluationMode};
use tensorserve::http::{run_server, HealthResponse, ServerConfig, DEFAULT_BIND_ADDR};
use tensorserve::logging::init_logging_default;
use tensorserve::{CalculateRequest, CalculateResponse, Operation, TensorDefinition, TensorId};

#[derive(Parser, Debug)]
#[command(name = "tensorserve-cli", version)]
#[command(about = "Run or talk to a tensorserve Calculate server", long_about = None)]
struct Cli {
    /// Base URL of the tensorserve HTTP server
    #[arg(long, default_value = "http://127.0.0.1:9876")]
    host: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Calculate HTTP server
    Serve {
        /// Address to bind the HTTP server to
        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        addr: SocketAddr,
        /// Evaluation backend (reference or accelerated); overrides TENSORSERVE_BACKEND
        #[arg(long)]
        backend: Option<BackendKind>,
        /// Compute arena capacity in bytes for accelerated scopes
        #[arg(long)]
        arena_bytes: Option<usize>,
        /// Worker pool size for the accelerated backend
        #[arg(long)]
        compute_threads: Option<usize>,
        /// full-graph or wanted-closure
        #[arg(long)]
        evaluation_mode: Option<EvaluationMode>,
        /// Respond 503 when a calculation takes longer than this
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Send a Calculate request and print the results
    Calculate {
        /// JSON request file; defaults to RMSNorm of [1, 2, 3]
        #[arg(long)]
        request: Option<PathBuf>,
        /// Evaluate in-process instead of over HTTP
        #[arg(long)]
        local: bool,
        /// Backend for local evaluation
        #[arg(long)]
        backend: Option<BackendKind>,
    },
    /// Query server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            addr,
            backend,
            arena_bytes,
            compute_threads,
            evaluation_mode,
            timeout_secs,
        } => {
            let mut engine = EngineConfig::from_env()?;
            if let Some(backend) = backend {
                engine = engine.with_backend(backend);
            }
            if let Some(bytes) = arena_bytes {
                engine = engine.with_arena_bytes(bytes);
            }
            if let Some(threads) = compute_threads {
                engine = engine.with_compute_threads(threads);
            }
            if let Some(mode) = evaluation_mode {
                engine = engine.with_evaluation_mode(mode);
            }
            let config = ServerConfig::new()
                .with_bind_addr(addr)
                .with_request_timeout(timeout_secs.map(Duration::from_secs))
                .with_engine(engine);
            run_server(config).await?;
        }
        Commands::Calculate {
            request,
            local,
            backend,
        } => {
            let request = match request {
                Some(path) => load_request(&path)?,
                None => demo_request(),
            };
            let response = if local {
                calculate_local(&request, backend)?
            } else {
                calculate_http(&cli.host, &request).await?
            };
            print_response(&response)?;
        }
        Commands::Health => fetch_health(&cli.host).await?,
    }
    Ok(())
}

fn load_request(path: &Path) -> anyhow::Result<CalculateRequest> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&text)?)
}

/// RMSNorm of [1, 2, 3] with the values sent as a bare list.
fn demo_request() -> CalculateRequest {
    CalculateRequest {
        tensors: vec![
            TensorDefinition::inline(1, vec![], vec![1.0, 2.0, 3.0]),
            TensorDefinition::computed(
                2,
                Operation::RmsNorm {
                    source: TensorId(1),
                    epsilon: 0.0,
                },
            ),
        ],
        output_tensor_ids: vec![TensorId(2)],
    }
}

fn calculate_local(
    request: &CalculateRequest,
    backend: Option<BackendKind>,
) -> anyhow::Result<CalculateResponse> {
    init_logging_default();
    let mut config = EngineConfig::from_env()?;
    if let Some(backend) = backend {
        config = config.with_backend(backend);
    }
    let engine = Engine::new(config)?;
    Ok(engine.calculate(request)?)
}

async fn calculate_http(host: &str, request: &CalculateRequest) -> anyhow::Result<CalculateResponse> {
    let client = Client::new();
    let url = format!("{}/v1/calculate", host.trim_end_matches('/'));
    let resp = client.post(url).json(request).send().await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("Server returned error {}: {}", status, text);
    }
    Ok(resp.json().await?)
}

async fn fetch_health(host: &str) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/health", host.trim_end_matches('/'));
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("Server returned error {}: {}", status, text);
    }
    let health: HealthResponse = resp.json().await?;
    println!("status: {}", health.status);
    println!("backend: {}", health.backend);
    println!("compute_threads: {}", health.compute_threads);
    println!("evaluation_mode: {}", health.evaluation_mode);
    Ok(())
}

fn print_response(response: &CalculateResponse) -> anyhow::Result<()> {
    for tensor in &response.results {
        println!(
            "tensor {} {:?}: {:?}",
            tensor.id, tensor.inline_data.dimensions, tensor.inline_data.values
        );
    }
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
