//! Reference backend.
//!
//! Single-threaded evaluator over owned `f32` buffers. Every operation is
//! supported for every rank the operation itself accepts, which makes this
//! backend the ground truth the accelerated one is compared against.

use crate::api::{InlineData, Operation, Tensor, TensorDefinition, TensorId};
use crate::engine::config::{BackendKind, EvaluationMode};
use crate::engine::dag::evaluation_order;
use crate::engine::kernels;
use crate::engine::op::{effective_epsilon, infer_output_shape};
use crate::engine::registry::TensorRegistry;
use crate::engine::scope::Scope;
use crate::engine::tensor::{wire_dimensions, Materialized};
use crate::error::{ServeResult, TensorServeError};

#[derive(Debug)]
pub struct ReferenceScope {
    registry: TensorRegistry<Vec<f32>>,
    mode: EvaluationMode,
    closed: bool,
}

impl ReferenceScope {
    pub fn new(mode: EvaluationMode) -> Self {
        Self {
            registry: TensorRegistry::new(),
            mode,
            closed: false,
        }
    }

    fn ensure_open(&self) -> ServeResult<()> {
        if self.closed {
            return Err(TensorServeError::ScopeClosed);
        }
        Ok(())
    }

    fn compute(&self, id: TensorId, op: &Operation) -> ServeResult<Materialized<Vec<f32>>> {
        let sources = op
            .dependencies()
            .into_iter()
            .map(|dep| self.registry.value(dep))
            .collect::<ServeResult<Vec<_>>>()?;
        let shapes: Vec<&[usize]> = sources.iter().map(|s| s.shape.as_slice()).collect();
        let shape = infer_output_shape(id, op, &shapes)?;

        let data = match op {
            Operation::LinearScale { scale, .. } => kernels::linear_scale(&sources[0].data, *scale),
            Operation::RmsNorm { epsilon, .. } => {
                kernels::rms_norm(&sources[0].data, effective_epsilon(*epsilon))
            }
            Operation::DotMultiply { .. } => kernels::dot_multiply(&sources[0].data, &sources[1].data),
            Operation::Add { .. } => kernels::add(&sources[0].data, &sources[1].data),
            Operation::MatrixMultiply { .. } => {
                let (a, b) = (&sources[0], &sources[1]);
                kernels::matmul(&a.data, &b.data, a.shape[0], a.shape[1], b.shape[1])?
            }
            Operation::Silu { .. } => kernels::silu(&sources[0].data),
            Operation::Softmax { .. } => kernels::softmax(&sources[0].data),
        };

        Ok(Materialized { shape, data })
    }
}

impl Scope for ReferenceScope {
    fn backend(&self) -> BackendKind {
        BackendKind::Reference
    }

    fn register_tensors(&mut self, tensors: &[TensorDefinition]) -> ServeResult<()> {
        self.ensure_open()?;
        self.registry
            .register_batch(tensors, |_, _, data: &InlineData| Ok(data.values.clone()))
    }

    fn evaluate(&mut self, wanted: &[TensorId]) -> ServeResult<()> {
        self.ensure_open()?;
        let order = evaluation_order(&self.registry, wanted, self.mode)?;

        let mut computed = 0usize;
        for id in order {
            let op = match self.registry.get(id) {
                Some(record) if !record.is_materialized() => match record.operation() {
                    Some(op) => op.clone(),
                    None => continue,
                },
                Some(_) => continue,
                None => return Err(crate::internal_error!("ordered tensor {} is not registered", id)),
            };

            let value = self.compute(id, &op)?;
            tracing::trace!(tensor = %id, op = op.name(), shape = ?value.shape, "computed tensor");
            self.registry.materialize(id, value)?;
            computed += 1;
        }

        tracing::debug!(computed, registered = self.registry.len(), "reference evaluation finished");
        Ok(())
    }

    fn fetch_result(&self, id: TensorId) -> ServeResult<Tensor> {
        self.ensure_open()?;
        let value = self.registry.value(id)?;
        Ok(Tensor {
            id,
            inline_data: InlineData::new(wire_dimensions(id, &value.shape)?, value.data.clone()),
        })
    }

    fn tensor_ids(&self) -> ServeResult<Vec<TensorId>> {
        self.ensure_open()?;
        Ok(self.registry.ids())
    }

    fn close(&mut self) {
        if !self.closed {
            self.registry.clear();
            self.closed = true;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_norm_of_matrix_normalizes_over_all_elements() {
        let mut scope = ReferenceScope::new(EvaluationMode::FullGraph);
        scope
            .register_tensors(&[
                TensorDefinition::inline(1, vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]),
                TensorDefinition::computed(
                    2,
                    Operation::RmsNorm {
                        source: TensorId(1),
                        epsilon: 0.0,
                    },
                ),
            ])
            .unwrap();
        scope.evaluate(&[TensorId(2)]).unwrap();

        let result = scope.fetch_result(TensorId(2)).unwrap();
        assert_eq!(result.inline_data.dimensions, vec![2, 2]);
        let expected = kernels::rms_norm(&[1.0, 2.0, 3.0, 4.0], 1e-5);
        assert_eq!(result.inline_data.values, expected);
    }

    #[test]
    fn test_second_evaluate_keeps_memoized_values() {
        let mut scope = ReferenceScope::new(EvaluationMode::FullGraph);
        scope
            .register_tensors(&[
                TensorDefinition::inline(1, vec![2], vec![1.0, 2.0]),
                TensorDefinition::computed(
                    2,
                    Operation::LinearScale {
                        source: TensorId(1),
                        scale: 3.0,
                    },
                ),
            ])
            .unwrap();
        scope.evaluate(&[TensorId(2)]).unwrap();
        scope.evaluate(&[TensorId(2)]).unwrap();
        assert_eq!(scope.fetch_result(TensorId(2)).unwrap().inline_data.values, vec![3.0, 6.0]);
    }

    #[test]
    fn test_closure_mode_skips_unrelated_failures() {
        let defs = [
            TensorDefinition::inline(1, vec![2], vec![1.0, 2.0]),
            TensorDefinition::inline(2, vec![3], vec![1.0, 2.0, 3.0]),
            TensorDefinition::computed(
                3,
                Operation::Add {
                    sources: vec![TensorId(1), TensorId(2)],
                },
            ),
            TensorDefinition::computed(4, Operation::Silu { source: TensorId(1) }),
        ];

        let mut full = ReferenceScope::new(EvaluationMode::FullGraph);
        full.register_tensors(&defs).unwrap();
        assert!(matches!(
            full.evaluate(&[TensorId(4)]),
            Err(TensorServeError::InvalidShape(_))
        ));

        let mut closure = ReferenceScope::new(EvaluationMode::WantedClosure);
        closure.register_tensors(&defs).unwrap();
        closure.evaluate(&[TensorId(4)]).unwrap();
        assert!(closure.fetch_result(TensorId(4)).is_ok());
        assert!(closure.fetch_result(TensorId(3)).is_err());
    }

    #[test]
    fn test_closed_scope_rejects_calls() {
        let mut scope = ReferenceScope::new(EvaluationMode::FullGraph);
        scope.close();
        scope.close();
        assert!(scope.is_closed());
        assert!(matches!(
            scope.register_tensors(&[]),
            Err(TensorServeError::ScopeClosed)
        ));
        assert!(matches!(scope.evaluate(&[]), Err(TensorServeError::ScopeClosed)));
        assert!(matches!(
            scope.fetch_result(TensorId(1)),
            Err(TensorServeError::ScopeClosed)
        ));
    }
}
