//! Evaluation ordering over a scope's registry.

use std::collections::{BTreeSet, HashSet};

use crate::api::TensorId;
use crate::engine::config::EvaluationMode;
use crate::engine::registry::TensorRegistry;
use crate::error::{ServeResult, TensorServeError};

/// Order every registered tensor whose dependencies can be satisfied.
///
/// Repeated passes over the registry (ascending id) mark a tensor done once
/// all of its dependencies are done; the loop stops on the first pass that
/// makes no progress. Any wanted id left over is unreachable, whether it sits
/// on a cycle, depends on a missing id, or was never registered.
pub fn build_dag<H>(registry: &TensorRegistry<H>, wanted: &[TensorId]) -> ServeResult<Vec<TensorId>> {
    let mut done: HashSet<TensorId> = HashSet::with_capacity(registry.len());
    let mut order = Vec::with_capacity(registry.len());

    loop {
        let mut progressed = false;
        for record in registry.iter() {
            if done.contains(&record.id) {
                continue;
            }
            if record.dependencies().iter().all(|dep| done.contains(dep)) {
                done.insert(record.id);
                order.push(record.id);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    if let Some(missing) = wanted.iter().find(|id| !done.contains(id)) {
        return Err(TensorServeError::Unreachable(*missing));
    }

    tracing::trace!(ordered = order.len(), registered = registry.len(), "built evaluation order");
    Ok(order)
}

/// Evaluation order for `wanted` under the configured mode.
pub fn evaluation_order<H>(
    registry: &TensorRegistry<H>,
    wanted: &[TensorId],
    mode: EvaluationMode,
) -> ServeResult<Vec<TensorId>> {
    let order = build_dag(registry, wanted)?;
    Ok(match mode {
        EvaluationMode::FullGraph => order,
        EvaluationMode::WantedClosure => restrict_to_closure(registry, &order, wanted),
    })
}

/// Keep only the tensors the wanted outputs transitively depend on.
///
/// `order` must come from [`build_dag`]; relative order is preserved.
pub fn restrict_to_closure<H>(
    registry: &TensorRegistry<H>,
    order: &[TensorId],
    wanted: &[TensorId],
) -> Vec<TensorId> {
    let mut needed: BTreeSet<TensorId> = BTreeSet::new();
    let mut stack: Vec<TensorId> = wanted.to_vec();
    while let Some(id) = stack.pop() {
        if !needed.insert(id) {
            continue;
        }
        if let Some(record) = registry.get(id) {
            stack.extend(record.dependencies().iter().copied());
        }
    }
    order.iter().copied().filter(|id| needed.contains(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{InlineData, Operation, TensorDefinition};

    fn registry(defs: &[TensorDefinition]) -> TensorRegistry<Vec<f32>> {
        let mut registry = TensorRegistry::new();
        registry
            .register_batch(defs, |_, _, data: &InlineData| Ok(data.values.clone()))
            .unwrap();
        registry
    }

    fn add(a: i32, b: i32) -> Operation {
        Operation::Add {
            sources: vec![TensorId(a), TensorId(b)],
        }
    }

    #[test]
    fn test_forward_reference_is_ordered_after_its_source() {
        let reg = registry(&[
            TensorDefinition::inline(1, vec![3], vec![1.0, 2.0, 3.0]),
            TensorDefinition::inline(2, vec![3], vec![4.0, 5.0, 6.0]),
            TensorDefinition::computed(
                3,
                Operation::DotMultiply {
                    sources: vec![TensorId(1), TensorId(2)],
                },
            ),
            TensorDefinition::computed(4, add(3, 5)),
            TensorDefinition::inline(5, vec![3], vec![7.0, 8.0, 9.0]),
        ]);

        let order = build_dag(&reg, &[TensorId(4)]).unwrap();
        assert_eq!(
            order,
            vec![TensorId(1), TensorId(2), TensorId(3), TensorId(5), TensorId(4)]
        );
    }

    #[test]
    fn test_cycle_is_unreachable() {
        let reg = registry(&[
            TensorDefinition::inline(1, vec![1], vec![1.0]),
            TensorDefinition::computed(2, add(1, 3)),
            TensorDefinition::computed(3, add(1, 2)),
        ]);

        let err = build_dag(&reg, &[TensorId(3)]).unwrap_err();
        assert!(matches!(err, TensorServeError::Unreachable(TensorId(3))));
    }

    #[test]
    fn test_unregistered_output_is_unreachable() {
        let reg = registry(&[TensorDefinition::inline(1, vec![1], vec![1.0])]);
        let err = build_dag(&reg, &[TensorId(99)]).unwrap_err();
        assert!(matches!(err, TensorServeError::Unreachable(TensorId(99))));
    }

    #[test]
    fn test_unwanted_broken_tensor_does_not_fail() {
        let reg = registry(&[
            TensorDefinition::inline(1, vec![1], vec![1.0]),
            TensorDefinition::computed(2, add(1, 42)),
        ]);
        let order = build_dag(&reg, &[TensorId(1)]).unwrap();
        assert_eq!(order, vec![TensorId(1)]);
    }

    #[test]
    fn test_restrict_to_closure() {
        let reg = registry(&[
            TensorDefinition::inline(1, vec![1], vec![1.0]),
            TensorDefinition::inline(2, vec![1], vec![2.0]),
            TensorDefinition::computed(3, add(1, 1)),
            TensorDefinition::computed(4, add(2, 2)),
        ]);
        let order = build_dag(&reg, &[TensorId(3)]).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(
            restrict_to_closure(&reg, &order, &[TensorId(3)]),
            vec![TensorId(1), TensorId(3)]
        );
        assert_eq!(
            evaluation_order(&reg, &[TensorId(3)], EvaluationMode::WantedClosure).unwrap(),
            vec![TensorId(1), TensorId(3)]
        );
        assert_eq!(
            evaluation_order(&reg, &[TensorId(3)], EvaluationMode::FullGraph).unwrap(),
            order
        );
    }
}
