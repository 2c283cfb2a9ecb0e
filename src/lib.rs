//! tensorserve - tensor computation-graph engine
//!
//! Evaluates DAGs of tensor operations submitted as a flat batch of tensor
//! definitions and returns the requested outputs. Two interchangeable
//! backends are provided: a portable reference evaluator and an accelerated
//! evaluator running arena-backed graphs on a worker pool. The engine is
//! exposed through a JSON-over-HTTP Calculate service.

#![allow(clippy::needless_range_loop)] // Clearer for matrix kernels
#![allow(clippy::type_complexity)]

pub mod api;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;

pub use api::{
    CalculateRequest, CalculateResponse, InlineData, Operation, Tensor, TensorDefinition,
    TensorId, TensorPayload,
};
pub use engine::{BackendKind, Engine, EngineConfig, EvaluationMode, Scope};
pub use error::{ErrorCategory, ServeResult, TensorServeError};
