//! Common test utilities for engine tests
//!
//! Every scenario runs against each backend through [`ENGINES`]. The
//! accelerated engine (and its worker pool) is built once and shared by all
//! tests in a binary.

#![allow(dead_code)]

use once_cell::sync::Lazy;
use tensorserve::engine::{BackendKind, Engine, EngineConfig};
use tensorserve::{CalculateRequest, CalculateResponse, Operation, TensorDefinition, TensorId};

/// Arena size for accelerated test scopes (4 MiB)
pub const TEST_ARENA_BYTES: usize = 4 * 1024 * 1024;

/// Absolute tolerance against the known-good vectors
pub const TOLERANCE: f32 = 1e-5;

/// Reference and accelerated engines
pub static ENGINES: Lazy<Vec<Engine>> = Lazy::new(|| {
    vec![
        Engine::new(EngineConfig::new().with_backend(BackendKind::Reference))
            .expect("reference engine"),
        Engine::new(
            EngineConfig::new()
                .with_backend(BackendKind::Accelerated)
                .with_arena_bytes(TEST_ARENA_BYTES)
                .with_compute_threads(4),
        )
        .expect("accelerated engine"),
    ]
});

pub fn engines() -> &'static [Engine] {
    &ENGINES
}

pub fn engine(kind: BackendKind) -> &'static Engine {
    ENGINES
        .iter()
        .find(|e| e.backend() == kind)
        .expect("engine for backend")
}

pub fn request(tensors: Vec<TensorDefinition>, outputs: &[i32]) -> CalculateRequest {
    CalculateRequest {
        tensors,
        output_tensor_ids: outputs.iter().map(|&id| TensorId(id)).collect(),
    }
}

pub fn vector(id: i32, values: &[f32]) -> TensorDefinition {
    TensorDefinition::inline(id, vec![values.len() as i32], values.to_vec())
}

pub fn matrix(id: i32, rows: i32, cols: i32, values: &[f32]) -> TensorDefinition {
    TensorDefinition::inline(id, vec![rows, cols], values.to_vec())
}

pub fn unary(id: i32, make: impl FnOnce(TensorId) -> Operation, source: i32) -> TensorDefinition {
    TensorDefinition::computed(id, make(TensorId(source)))
}

pub fn binary(id: i32, make: impl FnOnce(Vec<TensorId>) -> Operation, a: i32, b: i32) -> TensorDefinition {
    TensorDefinition::computed(id, make(vec![TensorId(a), TensorId(b)]))
}

/// -5, -4, ..., 5
pub fn ramp() -> Vec<f32> {
    (-5..=5).map(|v| v as f32).collect()
}

pub fn values(response: &CalculateResponse, index: usize) -> &[f32] {
    &response.results[index].inline_data.values
}

pub fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{}: length {} vs {}",
        context,
        actual.len(),
        expected.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "{}: index {} got {} expected {} (tolerance {})",
            context,
            i,
            a,
            e,
            tolerance
        );
    }
}
