//! Operand validation and output-shape inference shared by both backends.

use crate::api::{Operation, TensorId};
use crate::error::{ServeResult, TensorServeError};
use crate::shape_error;

/// Epsilon used by RMSNorm when the request leaves it at zero.
pub const DEFAULT_RMS_NORM_EPSILON: f32 = 1e-5;

pub fn effective_epsilon(epsilon: f32) -> f32 {
    if epsilon == 0.0 {
        DEFAULT_RMS_NORM_EPSILON
    } else {
        epsilon
    }
}

/// Output shape of `op` applied to operands of the given shapes.
///
/// `inputs` is in the operation's declared source order. Rank and arity
/// violations are `InvalidShape`.
pub fn infer_output_shape(id: TensorId, op: &Operation, inputs: &[&[usize]]) -> ServeResult<Vec<usize>> {
    match op {
        Operation::LinearScale { .. } | Operation::RmsNorm { .. } => {
            let [source] = expect_arity::<1>(id, op, inputs)?;
            Ok(source.to_vec())
        }
        Operation::Silu { .. } | Operation::Softmax { .. } => {
            let [source] = expect_arity::<1>(id, op, inputs)?;
            expect_vector(id, op, source)?;
            Ok(source.to_vec())
        }
        Operation::DotMultiply { .. } | Operation::Add { .. } => {
            let [a, b] = expect_arity::<2>(id, op, inputs)?;
            expect_vector(id, op, a)?;
            expect_vector(id, op, b)?;
            if a != b {
                return Err(shape_error!(
                    "{} for tensor {} needs operands of equal shape, got {:?} and {:?}",
                    op.name(),
                    id,
                    a,
                    b
                ));
            }
            Ok(a.to_vec())
        }
        Operation::MatrixMultiply { .. } => {
            let [a, b] = expect_arity::<2>(id, op, inputs)?;
            if a.len() != 2 || b.len() != 2 {
                return Err(shape_error!(
                    "matrix_multiply for tensor {} needs two 2-D operands, got {:?} and {:?}",
                    id,
                    a,
                    b
                ));
            }
            if a[1] != b[0] {
                return Err(shape_error!(
                    "matrix_multiply for tensor {}: {:?} columns do not match {:?} rows",
                    id,
                    a,
                    b
                ));
            }
            let shape = vec![a[0], b[1]];
            expect_addressable(id, op, &shape)?;
            Ok(shape)
        }
    }
}

/// Largest element count a single `f32` buffer can address.
pub const MAX_TENSOR_ELEMENTS: usize = isize::MAX as usize / std::mem::size_of::<f32>();

fn expect_addressable(id: TensorId, op: &Operation, shape: &[usize]) -> ServeResult<()> {
    let count = shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .filter(|&count| count <= MAX_TENSOR_ELEMENTS);
    if count.is_none() {
        return Err(shape_error!(
            "{} for tensor {} produces shape {:?}, too large for one buffer",
            op.name(),
            id,
            shape
        ));
    }
    Ok(())
}

fn expect_arity<'a, const N: usize>(
    id: TensorId,
    op: &Operation,
    inputs: &[&'a [usize]],
) -> ServeResult<[&'a [usize]; N]> {
    <[&[usize]; N]>::try_from(inputs).map_err(|_| {
        TensorServeError::InvalidShape(format!(
            "{} for tensor {} expects {} source(s), got {}",
            op.name(),
            id,
            N,
            inputs.len()
        ))
    })
}

fn expect_vector(id: TensorId, op: &Operation, shape: &[usize]) -> ServeResult<()> {
    if shape.len() != 1 {
        return Err(shape_error!(
            "{} for tensor {} needs a 1-D operand, got shape {:?}",
            op.name(),
            id,
            shape
        ));
    }
    Ok(())
}
