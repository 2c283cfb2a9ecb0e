//! Engine: scope factory and the per-request Calculate lifecycle.

use crate::api::{CalculateRequest, CalculateResponse};
use crate::engine::accel::AcceleratedBackend;
use crate::engine::config::{BackendKind, EngineConfig};
use crate::engine::evaluate::evaluate;
use crate::engine::reference::ReferenceScope;
use crate::engine::scope::Scope;
use crate::error::ServeResult;

/// Creates scopes for the configured backend.
///
/// Shared across request handlers; the accelerated worker pool is created
/// once here and reused by every scope.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    accelerated: Option<AcceleratedBackend>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> ServeResult<Self> {
        config.validate()?;
        let accelerated = match config.backend {
            BackendKind::Reference => None,
            BackendKind::Accelerated => Some(AcceleratedBackend::new(&config)?),
        };
        tracing::info!(
            backend = %config.backend,
            mode = %config.evaluation_mode,
            "engine initialized"
        );
        Ok(Self {
            config,
            accelerated,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> BackendKind {
        self.config.backend
    }

    /// Threads evaluation runs on.
    pub fn compute_threads(&self) -> usize {
        match &self.accelerated {
            Some(backend) => backend.compute_threads(),
            None => 1,
        }
    }

    pub fn new_scope(&self) -> ServeResult<Box<dyn Scope>> {
        match &self.accelerated {
            Some(backend) => Ok(Box::new(backend.new_scope()?)),
            None => Ok(Box::new(ReferenceScope::new(self.config.evaluation_mode))),
        }
    }

    /// Evaluate `request` in a fresh scope, closing it afterwards.
    pub fn calculate(&self, request: &CalculateRequest) -> ServeResult<CalculateResponse> {
        let mut scope = self.new_scope()?;
        let result = evaluate(scope.as_mut(), request);
        scope.close();
        result
    }
}
