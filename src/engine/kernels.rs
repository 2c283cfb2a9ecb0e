//! Scalar reference kernels over `f32` buffers.
//!
//! Callers validate shapes first (see [`super::op`]); these functions only
//! require that paired slices have the lengths their shapes imply.

use crate::error::{ServeResult, TensorServeError};

/// `out[i] = x[i] * scale`
pub fn linear_scale(x: &[f32], scale: f32) -> Vec<f32> {
    x.iter().map(|v| v * scale).collect()
}

/// Root-mean-square normalization over all elements.
pub fn rms_norm(x: &[f32], epsilon: f32) -> Vec<f32> {
    if x.is_empty() {
        return Vec::new();
    }
    let mean_square = x.iter().map(|&v| f64::from(v) * f64::from(v)).sum::<f64>() / x.len() as f64;
    let denom = (mean_square + f64::from(epsilon)).sqrt();
    x.iter().map(|&v| (f64::from(v) / denom) as f32).collect()
}

pub fn dot_multiply(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}

pub fn add(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

/// Row-major `[m, k] x [k, n]` product.
///
/// The output buffer is reserved fallibly; its size is not bounded by the
/// operands when `k` is zero.
pub fn matmul(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> ServeResult<Vec<f32>> {
    let len = m.checked_mul(n).ok_or_else(|| {
        TensorServeError::InvalidShape(format!("matmul output {}x{} overflows", m, n))
    })?;
    let mut out = Vec::new();
    out.try_reserve_exact(len).map_err(|e| {
        TensorServeError::InvalidShape(format!(
            "cannot allocate {}x{} matmul output: {}",
            m, n, e
        ))
    })?;
    out.resize(len, 0.0f32);
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for kk in 0..k {
                sum += a[i * k + kk] * b[kk * n + j];
            }
            out[i * n + j] = sum;
        }
    }
    Ok(out)
}

pub fn silu(x: &[f32]) -> Vec<f32> {
    x.iter()
        .map(|&v| {
            let v = f64::from(v);
            (v / (1.0 + (-v).exp())) as f32
        })
        .collect()
}

/// Numerically stable softmax over a vector.
pub fn softmax(x: &[f32]) -> Vec<f32> {
    if x.is_empty() {
        return Vec::new();
    }
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f64> = x.iter().map(|&v| (f64::from(v) - f64::from(max)).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| (e / sum) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
        assert_eq!(actual.len(), expected.len(), "length mismatch");
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() <= tol, "index {}: {} vs {}", i, a, e);
        }
    }

    fn ramp() -> Vec<f32> {
        (-5..=5).map(|v| v as f32).collect()
    }

    #[test]
    fn test_rms_norm() {
        assert_close(
            &rms_norm(&[1.0, 2.0, 3.0], 1e-5),
            &[0.46290955, 0.9258191, 1.3887286],
            1e-5,
        );
        assert!(rms_norm(&[], 1e-5).is_empty());
    }

    #[test]
    fn test_silu() {
        assert_close(
            &silu(&ramp()),
            &[
                -0.033464253, -0.07194484, -0.14227761, -0.23840584, -0.26894143, 0.0, 0.7310586,
                1.7615942, 2.8577223, 3.928055, 4.9665356,
            ],
            1e-5,
        );
    }

    #[test]
    fn test_softmax() {
        let out = softmax(&ramp());
        assert_close(
            &out,
            &[
                2.8698709e-05,
                7.801117e-05,
                0.00021205637,
                0.00057642895,
                0.0015668964,
                0.0042592655,
                0.011577884,
                0.031471953,
                0.08554964,
                0.23254804,
                0.6321311,
            ],
            1e-5,
        );
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_softmax_handles_large_inputs() {
        let out = softmax(&[1000.0, 1000.0]);
        assert_close(&out, &[0.5, 0.5], 1e-6);
    }

    #[test]
    fn test_matmul() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        assert_eq!(matmul(&a, &b, 2, 3, 2).unwrap(), vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_unallocatable_output_is_an_error() {
        assert!(matmul(&[], &[], usize::MAX, 0, 2).is_err());
        assert!(matmul(&[], &[], 1 << 40, 0, 1 << 40).is_err());
    }

    #[test]
    fn test_elementwise() {
        assert_eq!(dot_multiply(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), vec![4.0, 10.0, 18.0]);
        assert_eq!(add(&[4.0, 10.0, 18.0], &[7.0, 8.0, 9.0]), vec![11.0, 18.0, 27.0]);
        assert_eq!(linear_scale(&[1.0, -2.0], 0.5), vec![0.5, -1.0]);
    }
}
