//! Tensor computation-graph engine
//!
//! This module turns a flat batch of tensor definitions into computed output
//! tensors. Each request gets its own [`Scope`]; the [`Engine`] creates scopes
//! for the configured backend and runs the register → evaluate → extract
//! lifecycle.
//!
//! ## Module Structure
//!
//! - [`config`] - Engine configuration and builders
//! - [`tensor`] - Tensor records and shape helpers
//! - [`registry`] - Per-scope tensor registry
//! - [`dag`] - Evaluation ordering
//! - [`op`] - Operand validation and output shapes
//! - [`kernels`] - Scalar reference kernels
//! - [`scope`] - Backend scope interface
//! - [`reference`] - Reference backend
//! - [`accel`] - Accelerated backend (arena, native graph, worker pool)
//! - [`evaluate`] - Request orchestration
//! - [`runtime`] - Engine and the Calculate lifecycle

pub mod accel;
pub mod config;
pub mod dag;
pub mod evaluate;
pub mod kernels;
pub mod op;
pub mod reference;
pub mod registry;
pub mod runtime;
pub mod scope;
pub mod tensor;

pub use accel::{AcceleratedBackend, AcceleratedScope};
pub use config::{BackendKind, EngineConfig, EvaluationMode};
pub use dag::build_dag;
pub use evaluate::evaluate;
pub use reference::ReferenceScope;
pub use registry::TensorRegistry;
pub use runtime::Engine;
pub use scope::Scope;
