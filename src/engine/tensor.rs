//! Tensor records held by a scope's registry.

use crate::api::{InlineData, Operation, TensorId};
use crate::error::{ServeResult, TensorServeError};

pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().copied().product()
}

/// Convert wire dimensions to a shape and check it against the value count.
///
/// Empty dimensions describe a 1-D tensor of `values.len()` elements.
pub fn inline_shape(id: TensorId, data: &InlineData) -> ServeResult<Vec<usize>> {
    if data.dimensions.is_empty() {
        return Ok(vec![data.values.len()]);
    }

    let mut shape = Vec::with_capacity(data.dimensions.len());
    for &dim in &data.dimensions {
        let dim = usize::try_from(dim).map_err(|_| {
            TensorServeError::InvalidRequest(format!(
                "tensor {} has negative dimension in {:?}",
                id, data.dimensions
            ))
        })?;
        shape.push(dim);
    }

    let expected = shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| {
            TensorServeError::InvalidRequest(format!(
                "tensor {} dimensions {:?} overflow",
                id, data.dimensions
            ))
        })?;
    if expected != data.values.len() {
        return Err(TensorServeError::InvalidRequest(format!(
            "tensor {} has dimensions {:?} ({} elements) but {} values",
            id,
            data.dimensions,
            expected,
            data.values.len()
        )));
    }
    Ok(shape)
}

/// Convert a shape back to wire dimensions.
pub fn wire_dimensions(id: TensorId, shape: &[usize]) -> ServeResult<Vec<i32>> {
    shape
        .iter()
        .map(|&dim| {
            i32::try_from(dim).map_err(|_| {
                TensorServeError::InvalidShape(format!(
                    "tensor {} dimension {} does not fit in int32",
                    id, dim
                ))
            })
        })
        .collect()
}

/// Shape plus backend-specific storage of a computed or inline tensor.
#[derive(Debug, Clone)]
pub struct Materialized<H> {
    pub shape: Vec<usize>,
    pub data: H,
}

#[derive(Debug, Clone)]
pub enum TensorSource {
    Inline,
    Computed(Operation),
}

/// Registry entry for one tensor.
#[derive(Debug, Clone)]
pub struct TensorRecord<H> {
    pub id: TensorId,
    pub source: TensorSource,
    pub dependencies: Vec<TensorId>,
    /// Set once and never replaced.
    pub value: Option<Materialized<H>>,
}

impl<H> TensorRecord<H> {
    pub fn inline(id: TensorId, value: Materialized<H>) -> Self {
        Self {
            id,
            source: TensorSource::Inline,
            dependencies: Vec::new(),
            value: Some(value),
        }
    }

    pub fn computed(id: TensorId, operation: Operation) -> Self {
        Self {
            id,
            dependencies: operation.dependencies(),
            source: TensorSource::Computed(operation),
            value: None,
        }
    }

    pub fn tensor_id(&self) -> TensorId {
        self.id
    }

    pub fn dependencies(&self) -> &[TensorId] {
        &self.dependencies
    }

    pub fn operation(&self) -> Option<&Operation> {
        match &self.source {
            TensorSource::Inline => None,
            TensorSource::Computed(op) => Some(op),
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.value.is_some()
    }

    pub fn shape(&self) -> Option<&[usize]> {
        self.value.as_ref().map(|v| v.shape.as_slice())
    }
}
