//! Per-scope tensor registry.

use std::collections::BTreeMap;

use crate::api::{InlineData, TensorDefinition, TensorId, TensorPayload};
use crate::engine::tensor::{inline_shape, Materialized, TensorRecord};
use crate::error::{ServeResult, TensorServeError};

/// Registered tensors of one scope, keyed and iterated by ascending id.
#[derive(Debug)]
pub struct TensorRegistry<H> {
    tensors: BTreeMap<TensorId, TensorRecord<H>>,
}

impl<H> Default for TensorRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> TensorRegistry<H> {
    pub fn new() -> Self {
        Self {
            tensors: BTreeMap::new(),
        }
    }

    /// Register a batch of definitions.
    ///
    /// Inline tensors are validated and passed to `materialize` immediately so
    /// the backend can take ownership of their values. The call stops at the
    /// first failing entry; entries before it stay registered.
    pub fn register_batch<F>(
        &mut self,
        definitions: &[TensorDefinition],
        mut materialize: F,
    ) -> ServeResult<()>
    where
        F: FnMut(TensorId, &[usize], &InlineData) -> ServeResult<H>,
    {
        for definition in definitions {
            let id = definition.id;
            if self.tensors.contains_key(&id) {
                return Err(TensorServeError::AlreadyExists(id));
            }

            let record = match &definition.payload {
                TensorPayload::InlineData(data) => {
                    let shape = inline_shape(id, data)?;
                    let handle = materialize(id, &shape, data)?;
                    TensorRecord::inline(id, Materialized { shape, data: handle })
                }
                TensorPayload::Computation(operation) => {
                    TensorRecord::computed(id, operation.clone())
                }
            };

            tracing::trace!(tensor = %id, deps = ?record.dependencies(), "registered tensor");
            self.tensors.insert(id, record);
        }
        Ok(())
    }

    pub fn get(&self, id: TensorId) -> Option<&TensorRecord<H>> {
        self.tensors.get(&id)
    }

    pub fn get_mut(&mut self, id: TensorId) -> Option<&mut TensorRecord<H>> {
        self.tensors.get_mut(&id)
    }

    pub fn contains(&self, id: TensorId) -> bool {
        self.tensors.contains_key(&id)
    }

    /// Materialized value of `id`, or `NotFound`.
    pub fn value(&self, id: TensorId) -> ServeResult<&Materialized<H>> {
        let record = self
            .get(id)
            .ok_or_else(|| TensorServeError::TensorNotFound(format!("source tensor {} not found", id)))?;
        record.value.as_ref().ok_or_else(|| {
            TensorServeError::TensorNotFound(format!("tensor {} has not been computed", id))
        })
    }

    /// Store a computed value. A tensor is materialized at most once.
    pub fn materialize(&mut self, id: TensorId, value: Materialized<H>) -> ServeResult<()> {
        let record = self
            .get_mut(id)
            .ok_or_else(|| TensorServeError::TensorNotFound(format!("tensor {} not found", id)))?;
        if record.value.is_some() {
            return Err(crate::internal_error!("tensor {} materialized twice", id));
        }
        record.value = Some(value);
        Ok(())
    }

    /// All records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &TensorRecord<H>> {
        self.tensors.values()
    }

    pub fn ids(&self) -> Vec<TensorId> {
        self.tensors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn clear(&mut self) {
        self.tensors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Operation;

    fn owned(_: TensorId, _: &[usize], data: &InlineData) -> ServeResult<Vec<f32>> {
        Ok(data.values.clone())
    }

    #[test]
    fn test_register_inline_and_computed() {
        let mut registry = TensorRegistry::new();
        registry
            .register_batch(
                &[
                    TensorDefinition::inline(1, vec![3], vec![1.0, 2.0, 3.0]),
                    TensorDefinition::computed(2, Operation::Silu { source: TensorId(1) }),
                ],
                owned,
            )
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.value(TensorId(1)).unwrap().data, vec![1.0, 2.0, 3.0]);
        assert!(!registry.get(TensorId(2)).unwrap().is_materialized());
    }

    #[test]
    fn test_duplicate_id_keeps_earlier_entries() {
        let mut registry = TensorRegistry::new();
        let err = registry
            .register_batch(
                &[
                    TensorDefinition::inline(1, vec![1], vec![1.0]),
                    TensorDefinition::inline(2, vec![1], vec![2.0]),
                    TensorDefinition::inline(1, vec![1], vec![3.0]),
                    TensorDefinition::inline(3, vec![1], vec![4.0]),
                ],
                owned,
            )
            .unwrap_err();

        assert!(matches!(err, TensorServeError::AlreadyExists(TensorId(1))));
        assert_eq!(registry.ids(), vec![TensorId(1), TensorId(2)]);
        // The original entry is untouched.
        assert_eq!(registry.value(TensorId(1)).unwrap().data, vec![1.0]);
    }

    #[test]
    fn test_repeated_batches_share_the_id_space() {
        let mut registry = TensorRegistry::new();
        registry
            .register_batch(&[TensorDefinition::inline(1, vec![1], vec![1.0])], owned)
            .unwrap();
        registry
            .register_batch(&[TensorDefinition::inline(2, vec![1], vec![1.0])], owned)
            .unwrap();
        let err = registry
            .register_batch(&[TensorDefinition::inline(2, vec![1], vec![1.0])], owned)
            .unwrap_err();
        assert!(matches!(err, TensorServeError::AlreadyExists(TensorId(2))));
    }

    #[test]
    fn test_value_of_uncomputed_tensor_is_not_found() {
        let mut registry: TensorRegistry<Vec<f32>> = TensorRegistry::new();
        registry
            .register_batch(
                &[TensorDefinition::computed(2, Operation::Silu { source: TensorId(1) })],
                owned,
            )
            .unwrap();
        assert!(matches!(
            registry.value(TensorId(2)),
            Err(TensorServeError::TensorNotFound(_))
        ));
        assert!(matches!(
            registry.value(TensorId(1)),
            Err(TensorServeError::TensorNotFound(_))
        ));
    }

    #[test]
    fn test_materialize_twice_is_rejected() {
        let mut registry = TensorRegistry::new();
        registry
            .register_batch(&[TensorDefinition::inline(1, vec![1], vec![1.0])], owned)
            .unwrap();
        let err = registry
            .materialize(
                TensorId(1),
                Materialized {
                    shape: vec![1],
                    data: vec![2.0],
                },
            )
            .unwrap_err();
        assert!(matches!(err, TensorServeError::InternalError(_)));
    }
}
