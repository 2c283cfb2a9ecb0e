//! Configuration for the computation engine
//!
//! This module defines [`EngineConfig`] which selects the evaluation backend
//! and sizes its resources (compute arena, worker pool), plus the evaluation
//! mode used when ordering the graph.

use std::fmt;
use std::str::FromStr;

use crate::error::{ServeResult, TensorServeError};

/// Default compute arena capacity for accelerated scopes (256 MiB)
pub const DEFAULT_ARENA_BYTES: usize = 256 * 1024 * 1024;

/// Default worker pool size for the accelerated backend
pub const DEFAULT_COMPUTE_THREADS: usize = 16;

/// Evaluation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Portable single-threaded evaluator
    #[default]
    Reference,
    /// Arena-backed evaluator running on a worker pool
    Accelerated,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Reference => "reference",
            BackendKind::Accelerated => "accelerated",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = TensorServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reference" | "cpu" | "fallback" => Ok(BackendKind::Reference),
            "accelerated" | "accel" | "faer" => Ok(BackendKind::Accelerated),
            other => Err(TensorServeError::InvalidConfiguration(format!(
                "unknown backend '{}' (expected reference or accelerated)",
                other
            ))),
        }
    }
}

/// Which tensors an evaluation computes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// Every registered tensor whose dependencies can be satisfied
    #[default]
    FullGraph,
    /// Only the transitive dependencies of the wanted outputs
    WantedClosure,
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationMode::FullGraph => f.write_str("full-graph"),
            EvaluationMode::WantedClosure => f.write_str("wanted-closure"),
        }
    }
}

impl FromStr for EvaluationMode {
    type Err = TensorServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "full-graph" | "full" => Ok(EvaluationMode::FullGraph),
            "wanted-closure" | "closure" => Ok(EvaluationMode::WantedClosure),
            other => Err(TensorServeError::InvalidConfiguration(format!(
                "unknown evaluation mode '{}' (expected full-graph or wanted-closure)",
                other
            ))),
        }
    }
}

/// Configuration for the computation engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Backend every new scope is created with
    pub backend: BackendKind,

    /// Compute arena capacity in bytes (accelerated backend)
    pub arena_bytes: usize,

    /// Worker pool size (accelerated backend)
    pub compute_threads: usize,

    /// Graph ordering mode
    pub evaluation_mode: EvaluationMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            backend: BackendKind::Reference,
            arena_bytes: DEFAULT_ARENA_BYTES,
            compute_threads: DEFAULT_COMPUTE_THREADS,
            evaluation_mode: EvaluationMode::FullGraph,
        }
    }
}

impl EngineConfig {
    /// Create a new engine config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the environment on top of the defaults
    ///
    /// - `TENSORSERVE_BACKEND`: reference | accelerated
    /// - `TENSORSERVE_ARENA_BYTES`: arena capacity in bytes
    /// - `TENSORSERVE_COMPUTE_THREADS`: worker pool size
    /// - `TENSORSERVE_EVALUATION_MODE`: full-graph | wanted-closure
    pub fn from_env() -> ServeResult<Self> {
        let mut config = Self::default();

        if let Ok(backend) = std::env::var("TENSORSERVE_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Ok(bytes) = std::env::var("TENSORSERVE_ARENA_BYTES") {
            config.arena_bytes = parse_usize("TENSORSERVE_ARENA_BYTES", &bytes)?;
        }
        if let Ok(threads) = std::env::var("TENSORSERVE_COMPUTE_THREADS") {
            config.compute_threads = parse_usize("TENSORSERVE_COMPUTE_THREADS", &threads)?;
        }
        if let Ok(mode) = std::env::var("TENSORSERVE_EVALUATION_MODE") {
            config.evaluation_mode = mode.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no backend could run with
    pub fn validate(&self) -> ServeResult<()> {
        if self.compute_threads == 0 {
            return Err(TensorServeError::InvalidConfiguration(
                "compute_threads must be at least 1".to_string(),
            ));
        }
        if self.backend == BackendKind::Accelerated && self.arena_bytes < std::mem::size_of::<f32>() {
            return Err(TensorServeError::InvalidConfiguration(format!(
                "arena_bytes {} is too small to hold a single value",
                self.arena_bytes
            )));
        }
        Ok(())
    }

    /// Set the backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the arena capacity in bytes
    pub fn with_arena_bytes(mut self, arena_bytes: usize) -> Self {
        self.arena_bytes = arena_bytes;
        self
    }

    /// Set the worker pool size
    pub fn with_compute_threads(mut self, compute_threads: usize) -> Self {
        self.compute_threads = compute_threads;
        self
    }

    /// Set the evaluation mode
    pub fn with_evaluation_mode(mut self, evaluation_mode: EvaluationMode) -> Self {
        self.evaluation_mode = evaluation_mode;
        self
    }
}

fn parse_usize(var: &str, value: &str) -> ServeResult<usize> {
    value.trim().parse::<usize>().map_err(|e| {
        TensorServeError::InvalidConfiguration(format!("{}='{}': {}", var, value, e))
    })
}
