//! Calculate request/response types.
//!
//! These are the already-decoded structures the engine consumes and produces.
//! The JSON encoding mirrors the protobuf layout of the Calculate call: a
//! tensor definition carries its id next to exactly one of `inline_data` or
//! `computation`, and a computation names its operation as the single key.
//!
//! ```json
//! {"id": 1, "inline_data": {"dimensions": [3], "values": [1, 2, 3]}}
//! {"id": 2, "computation": {"rms_norm": {"source": 1}}}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a tensor within one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TensorId(pub i32);

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for TensorId {
    fn from(id: i32) -> Self {
        TensorId(id)
    }
}

/// Materialized tensor data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InlineData {
    #[serde(default)]
    pub dimensions: Vec<i32>,
    #[serde(default)]
    pub values: Vec<f32>,
}

impl InlineData {
    pub fn new(dimensions: Vec<i32>, values: Vec<f32>) -> Self {
        Self { dimensions, values }
    }

    /// 1-D data with the dimension taken from the value count.
    pub fn vector(values: Vec<f32>) -> Self {
        Self {
            dimensions: vec![values.len() as i32],
            values,
        }
    }
}

/// One entry of a Calculate batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDefinition {
    pub id: TensorId,
    #[serde(flatten)]
    pub payload: TensorPayload,
}

impl TensorDefinition {
    pub fn inline(id: impl Into<TensorId>, dimensions: Vec<i32>, values: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            payload: TensorPayload::InlineData(InlineData::new(dimensions, values)),
        }
    }

    pub fn computed(id: impl Into<TensorId>, operation: Operation) -> Self {
        Self {
            id: id.into(),
            payload: TensorPayload::Computation(operation),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorPayload {
    InlineData(InlineData),
    Computation(Operation),
}

/// Operations a computed tensor can apply to its sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    LinearScale {
        source: TensorId,
        scale: f32,
    },
    RmsNorm {
        source: TensorId,
        /// Zero selects the default epsilon.
        #[serde(default)]
        epsilon: f32,
    },
    DotMultiply {
        sources: Vec<TensorId>,
    },
    Add {
        sources: Vec<TensorId>,
    },
    MatrixMultiply {
        sources: Vec<TensorId>,
    },
    Silu {
        source: TensorId,
    },
    Softmax {
        source: TensorId,
    },
}

impl Operation {
    /// Source ids in declaration order.
    pub fn dependencies(&self) -> Vec<TensorId> {
        match self {
            Operation::LinearScale { source, .. }
            | Operation::RmsNorm { source, .. }
            | Operation::Silu { source }
            | Operation::Softmax { source } => vec![*source],
            Operation::DotMultiply { sources }
            | Operation::Add { sources }
            | Operation::MatrixMultiply { sources } => sources.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::LinearScale { .. } => "linear_scale",
            Operation::RmsNorm { .. } => "rms_norm",
            Operation::DotMultiply { .. } => "dot_multiply",
            Operation::Add { .. } => "add",
            Operation::MatrixMultiply { .. } => "matrix_multiply",
            Operation::Silu { .. } => "silu",
            Operation::Softmax { .. } => "softmax",
        }
    }
}

/// A result tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub id: TensorId,
    pub inline_data: InlineData,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalculateRequest {
    pub tensors: Vec<TensorDefinition>,
    pub output_tensor_ids: Vec<TensorId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalculateResponse {
    pub results: Vec<Tensor>,
}
