//! Accelerated backend: arena-backed scopes executed on a shared worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use crate::api::{InlineData, Operation, Tensor, TensorDefinition, TensorId};
use crate::engine::accel::arena::{ArenaSlice, ComputeArena};
use crate::engine::accel::graph::{ComputeGraph, GraphNode, Kernel};
use crate::engine::config::{BackendKind, EngineConfig, EvaluationMode};
use crate::engine::dag::evaluation_order;
use crate::engine::op::{effective_epsilon, infer_output_shape};
use crate::engine::registry::TensorRegistry;
use crate::engine::scope::Scope;
use crate::engine::tensor::{element_count, wire_dimensions, Materialized};
use crate::error::{ServeResult, TensorServeError};

/// Highest tensor rank the native graph accepts
pub const MAX_RANK: usize = 4;

/// Factory for accelerated scopes; owns the worker pool they share.
#[derive(Debug, Clone)]
pub struct AcceleratedBackend {
    pool: Arc<rayon::ThreadPool>,
    arena_bytes: usize,
    mode: EvaluationMode,
}

impl AcceleratedBackend {
    pub fn new(config: &EngineConfig) -> ServeResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.compute_threads)
            .thread_name(|i| format!("tensorserve-compute-{}", i))
            .build()
            .map_err(|e| {
                TensorServeError::BackendInitializationFailed(format!(
                    "could not start {} compute threads: {}",
                    config.compute_threads, e
                ))
            })?;

        tracing::info!(
            threads = config.compute_threads,
            arena_bytes = config.arena_bytes,
            "accelerated backend ready"
        );

        Ok(Self {
            pool: Arc::new(pool),
            arena_bytes: config.arena_bytes,
            mode: config.evaluation_mode,
        })
    }

    pub fn compute_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Create a scope with its own arena. No scope is returned if the arena
    /// cannot be reserved.
    pub fn new_scope(&self) -> ServeResult<AcceleratedScope> {
        let arena = ComputeArena::new(self.arena_bytes)?;
        Ok(AcceleratedScope {
            registry: TensorRegistry::new(),
            arena: Some(arena),
            pool: Arc::clone(&self.pool),
            mode: self.mode,
        })
    }
}

#[derive(Debug)]
pub struct AcceleratedScope {
    registry: TensorRegistry<ArenaSlice>,
    /// `None` once closed
    arena: Option<ComputeArena>,
    pool: Arc<rayon::ThreadPool>,
    mode: EvaluationMode,
}

impl AcceleratedScope {
    fn arena(&self) -> ServeResult<&ComputeArena> {
        self.arena.as_ref().ok_or(TensorServeError::ScopeClosed)
    }

    pub fn arena_used_bytes(&self) -> ServeResult<usize> {
        Ok(self.arena()?.used_bytes())
    }
}

impl Scope for AcceleratedScope {
    fn backend(&self) -> BackendKind {
        BackendKind::Accelerated
    }

    fn register_tensors(&mut self, tensors: &[TensorDefinition]) -> ServeResult<()> {
        let arena = self.arena.as_mut().ok_or(TensorServeError::ScopeClosed)?;
        self.registry
            .register_batch(tensors, |id, shape, data: &InlineData| {
                check_rank(id, shape)?;
                arena.allocate_from(&data.values)
            })
    }

    fn evaluate(&mut self, wanted: &[TensorId]) -> ServeResult<()> {
        let arena = self.arena.as_mut().ok_or(TensorServeError::ScopeClosed)?;
        let order = evaluation_order(&self.registry, wanted, self.mode)?;

        let mut graph = ComputeGraph::new();
        let mut pending: HashMap<TensorId, Materialized<ArenaSlice>> = HashMap::new();

        for id in order {
            let record = self
                .registry
                .get(id)
                .ok_or_else(|| crate::internal_error!("ordered tensor {} is not registered", id))?;
            if record.is_materialized() {
                continue;
            }
            let Some(op) = record.operation() else {
                continue;
            };

            let mut shapes = Vec::with_capacity(record.dependencies().len());
            let mut inputs = Vec::with_capacity(record.dependencies().len());
            for dep in record.dependencies() {
                let value = match pending.get(dep) {
                    Some(value) => value,
                    None => self.registry.value(*dep)?,
                };
                shapes.push(value.shape.clone());
                inputs.push(value.data);
            }
            let shape_refs: Vec<&[usize]> = shapes.iter().map(Vec::as_slice).collect();

            let shape = infer_output_shape(id, op, &shape_refs)?;
            check_rank(id, &shape)?;
            let kernel = translate(id, op, &shape_refs)?;
            let output = arena.allocate(element_count(&shape))?;

            graph.build_forward_expand(GraphNode {
                tensor: id,
                kernel,
                inputs,
                output,
            });
            pending.insert(id, Materialized { shape, data: output });
        }

        tracing::debug!(
            nodes = graph.len(),
            arena_used = arena.used_bytes(),
            "submitting compute graph"
        );
        graph.compute(arena, &self.pool)?;

        for (id, value) in pending {
            self.registry.materialize(id, value)?;
        }
        Ok(())
    }

    fn fetch_result(&self, id: TensorId) -> ServeResult<Tensor> {
        let arena = self.arena()?;
        let value = self.registry.value(id)?;
        Ok(Tensor {
            id,
            inline_data: InlineData::new(
                wire_dimensions(id, &value.shape)?,
                arena.read_to_vec(value.data)?,
            ),
        })
    }

    fn tensor_ids(&self) -> ServeResult<Vec<TensorId>> {
        self.arena()?;
        Ok(self.registry.ids())
    }

    fn close(&mut self) {
        if let Some(arena) = self.arena.take() {
            tracing::debug!(
                used = arena.used_bytes(),
                capacity = arena.capacity_bytes(),
                "releasing compute arena"
            );
            self.registry.clear();
        }
    }

    fn is_closed(&self) -> bool {
        self.arena.is_none()
    }
}

fn check_rank(id: TensorId, shape: &[usize]) -> ServeResult<()> {
    if shape.len() > MAX_RANK {
        return Err(TensorServeError::Unimplemented(format!(
            "tensor {} has rank {}, the accelerated backend supports at most {}",
            id,
            shape.len(),
            MAX_RANK
        )));
    }
    Ok(())
}

/// Map an operation onto a native kernel. Operand shapes are already
/// validated by `infer_output_shape`.
fn translate(id: TensorId, op: &Operation, shapes: &[&[usize]]) -> ServeResult<Kernel> {
    Ok(match op {
        Operation::LinearScale { scale, .. } => Kernel::Scale { factor: *scale },
        Operation::RmsNorm { epsilon, .. } => {
            if shapes[0].len() != 1 {
                return Err(TensorServeError::Unimplemented(format!(
                    "rms_norm for tensor {} on shape {:?}: only 1-D operands are supported by the accelerated backend",
                    id, shapes[0]
                )));
            }
            Kernel::RmsNorm {
                eps: effective_epsilon(*epsilon),
            }
        }
        Operation::DotMultiply { .. } => Kernel::Mul,
        Operation::Add { .. } => Kernel::Add,
        Operation::MatrixMultiply { .. } => Kernel::MatMul {
            m: shapes[0][0],
            k: shapes[0][1],
            n: shapes[1][1],
        },
        Operation::Silu { .. } => Kernel::Silu,
        Operation::Softmax { .. } => Kernel::SoftMax,
    })
}
