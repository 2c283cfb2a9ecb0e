//! Backend interface for per-request tensor scopes.

use crate::api::{Tensor, TensorDefinition, TensorId};
use crate::engine::config::BackendKind;
use crate::error::ServeResult;

/// Registry plus backend resources for one Calculate request.
///
/// A scope is driven sequentially: register (repeatable), evaluate, fetch,
/// close. After `close` every other call fails with `ScopeClosed`; results
/// fetched earlier are owned copies and stay valid.
pub trait Scope: Send {
    fn backend(&self) -> BackendKind;

    /// Register definitions in order, stopping at the first failure.
    fn register_tensors(&mut self, tensors: &[TensorDefinition]) -> ServeResult<()>;

    /// Compute the evaluation order and materialize every tensor in it that
    /// is not materialized yet.
    fn evaluate(&mut self, wanted: &[TensorId]) -> ServeResult<()>;

    /// Deep copy of a materialized tensor.
    fn fetch_result(&self, id: TensorId) -> ServeResult<Tensor>;

    /// Registered ids in ascending order.
    fn tensor_ids(&self) -> ServeResult<Vec<TensorId>>;

    /// Release backend resources. Safe to call more than once.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}
