//! Request orchestration: register, evaluate, extract.

use crate::api::{CalculateRequest, CalculateResponse};
use crate::engine::scope::Scope;
use crate::error::ServeResult;

/// Run one Calculate request against `scope`.
///
/// Results come back in `output_tensor_ids` order, one deep copy per
/// requested id (duplicates included). The first error aborts the request
/// and no partial results are returned. The caller owns the scope and is
/// responsible for closing it.
pub fn evaluate(scope: &mut dyn Scope, request: &CalculateRequest) -> ServeResult<CalculateResponse> {
    let span = tracing::debug_span!(
        "evaluate",
        backend = %scope.backend(),
        tensors = request.tensors.len(),
        outputs = request.output_tensor_ids.len()
    );
    let _guard = span.enter();

    scope.register_tensors(&request.tensors)?;
    scope.evaluate(&request.output_tensor_ids)?;

    let results = request
        .output_tensor_ids
        .iter()
        .map(|&id| scope.fetch_result(id))
        .collect::<ServeResult<Vec<_>>>()?;

    tracing::debug!(results = results.len(), "evaluation complete");
    Ok(CalculateResponse { results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Operation, TensorDefinition, TensorId};
    use crate::engine::config::EvaluationMode;
    use crate::engine::reference::ReferenceScope;
    use crate::error::TensorServeError;

    #[test]
    fn test_results_follow_request_order() {
        let mut scope = ReferenceScope::new(EvaluationMode::FullGraph);
        let request = CalculateRequest {
            tensors: vec![
                TensorDefinition::inline(1, vec![2], vec![1.0, 2.0]),
                TensorDefinition::computed(
                    2,
                    Operation::LinearScale {
                        source: TensorId(1),
                        scale: -1.0,
                    },
                ),
            ],
            output_tensor_ids: vec![TensorId(2), TensorId(1), TensorId(2)],
        };

        let response = evaluate(&mut scope, &request).unwrap();
        let ids: Vec<TensorId> = response.results.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TensorId(2), TensorId(1), TensorId(2)]);
        assert_eq!(response.results[0], response.results[2]);
        assert_eq!(response.results[0].inline_data.values, vec![-1.0, -2.0]);
    }

    #[test]
    fn test_duplicate_registration_aborts_before_evaluation() {
        let mut scope = ReferenceScope::new(EvaluationMode::FullGraph);
        let request = CalculateRequest {
            tensors: vec![
                TensorDefinition::inline(1, vec![1], vec![1.0]),
                TensorDefinition::inline(1, vec![1], vec![2.0]),
            ],
            output_tensor_ids: vec![TensorId(1)],
        };
        assert!(matches!(
            evaluate(&mut scope, &request),
            Err(TensorServeError::AlreadyExists(TensorId(1)))
        ));
    }
}
