//! Property tests for evaluation ordering over random acyclic graphs

mod common;

use proptest::prelude::*;
use proptest::sample::Index;
use std::collections::HashMap;
use tensorserve::engine::dag::{build_dag, evaluation_order};
use tensorserve::engine::{BackendKind, EvaluationMode, TensorRegistry};
use tensorserve::{Operation, TensorDefinition, TensorId};

/// One node per entry: `None` is an inline leaf, `Some((a, b))` adds two
/// earlier nodes. Ids are a shuffled permutation so dependencies may point
/// forward or backward in id order.
fn graph_strategy() -> impl Strategy<Value = Vec<TensorDefinition>> {
    (1usize..24)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(prop::option::of((any::<Index>(), any::<Index>())), n),
                Just((0..n as i32).collect::<Vec<_>>()).prop_shuffle(),
            )
        })
        .prop_map(|(nodes, ids)| {
            let mut defs = Vec::with_capacity(nodes.len());
            for (rank, node) in nodes.into_iter().enumerate() {
                let id = ids[rank];
                let def = match node {
                    Some((a, b)) if rank > 0 => TensorDefinition::computed(
                        id,
                        Operation::Add {
                            sources: vec![TensorId(ids[a.index(rank)]), TensorId(ids[b.index(rank)])],
                        },
                    ),
                    _ => TensorDefinition::inline(id, vec![2], vec![id as f32, 1.0]),
                };
                defs.push(def);
            }
            defs
        })
}

fn registry(defs: &[TensorDefinition]) -> TensorRegistry<()> {
    let mut registry = TensorRegistry::new();
    registry
        .register_batch(defs, |_, _, _| Ok(()))
        .expect("register graph");
    registry
}

fn positions(order: &[TensorId]) -> HashMap<TensorId, usize> {
    order.iter().enumerate().map(|(i, id)| (*id, i)).collect()
}

proptest! {
    #[test]
    fn order_covers_graph_and_respects_dependencies(defs in graph_strategy()) {
        let registry = registry(&defs);
        let ids: Vec<TensorId> = defs.iter().map(|d| d.id).collect();
        let order = build_dag(&registry, &ids).unwrap();

        prop_assert_eq!(order.len(), defs.len());
        let pos = positions(&order);
        for record in registry.iter() {
            for dep in record.dependencies() {
                prop_assert!(pos[dep] < pos[&record.id], "{} ordered before {}", record.id, dep);
            }
        }
    }

    #[test]
    fn closure_is_dependency_closed_subsequence(defs in graph_strategy(), pick in any::<Index>()) {
        let registry = registry(&defs);
        let wanted = [defs[pick.index(defs.len())].id];
        let full = evaluation_order(&registry, &wanted, EvaluationMode::FullGraph).unwrap();
        let closure = evaluation_order(&registry, &wanted, EvaluationMode::WantedClosure).unwrap();

        prop_assert!(closure.contains(&wanted[0]));
        let full_pos = positions(&full);
        for pair in closure.windows(2) {
            prop_assert!(full_pos[&pair[0]] < full_pos[&pair[1]]);
        }
        for id in &closure {
            for dep in registry.get(*id).unwrap().dependencies() {
                prop_assert!(closure.contains(dep));
            }
        }
    }

    #[test]
    fn backends_agree_on_random_graphs(defs in graph_strategy()) {
        let outputs: Vec<i32> = defs.iter().map(|d| d.id.0).collect();
        let req = common::request(defs, &outputs);
        let reference = common::engine(BackendKind::Reference).calculate(&req).unwrap();
        let accelerated = common::engine(BackendKind::Accelerated).calculate(&req).unwrap();
        prop_assert_eq!(reference, accelerated);
    }
}
