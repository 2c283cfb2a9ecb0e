//! Native compute graph for accelerated scopes.
//!
//! Nodes are appended in evaluation order and executed in that order on the
//! backend's worker pool. Each node reads arena slices of earlier nodes (or
//! inline tensors) and writes its own freshly allocated output slice.

use faer::linalg::matmul::matmul;
use faer::mat::{MatMut, MatRef};
use faer::{Accum, Par};
use rayon::prelude::*;

use crate::api::TensorId;
use crate::engine::accel::arena::{ArenaSlice, ComputeArena};
use crate::error::{ServeResult, TensorServeError};

/// Kernel a graph node runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Scale { factor: f32 },
    RmsNorm { eps: f32 },
    Mul,
    Add,
    MatMul { m: usize, k: usize, n: usize },
    Silu,
    SoftMax,
}

impl Kernel {
    fn arity(&self) -> usize {
        match self {
            Kernel::Scale { .. } | Kernel::RmsNorm { .. } | Kernel::Silu | Kernel::SoftMax => 1,
            Kernel::Mul | Kernel::Add | Kernel::MatMul { .. } => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub tensor: TensorId,
    pub kernel: Kernel,
    pub inputs: Vec<ArenaSlice>,
    pub output: ArenaSlice,
}

#[derive(Debug, Default)]
pub struct ComputeGraph {
    nodes: Vec<GraphNode>,
}

impl ComputeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node; execution follows insertion order.
    pub fn build_forward_expand(&mut self, node: GraphNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Execute every node inside `pool`.
    pub fn compute(&self, arena: &mut ComputeArena, pool: &rayon::ThreadPool) -> ServeResult<()> {
        let par = parallelism(pool.current_num_threads());
        pool.install(|| {
            for node in &self.nodes {
                let (inputs, output) = arena.split_for_node(&node.inputs, node.output)?;
                run_kernel(node, &inputs, output, par)?;
            }
            Ok(())
        })
    }
}

fn parallelism(threads: usize) -> Par {
    if threads <= 1 {
        Par::Seq
    } else {
        Par::rayon(threads)
    }
}

fn run_kernel(node: &GraphNode, inputs: &[&[f32]], out: &mut [f32], par: Par) -> ServeResult<()> {
    if inputs.len() != node.kernel.arity() {
        return Err(TensorServeError::ExecutionFailed(format!(
            "node for tensor {} has {} inputs, {:?} expects {}",
            node.tensor,
            inputs.len(),
            node.kernel,
            node.kernel.arity()
        )));
    }

    match node.kernel {
        Kernel::Scale { factor } => {
            let x = inputs[0];
            check_len(node, x, out)?;
            out.par_iter_mut()
                .zip(x.par_iter())
                .for_each(|(o, &v)| *o = v * factor);
        }
        Kernel::RmsNorm { eps } => {
            let x = inputs[0];
            check_len(node, x, out)?;
            if x.is_empty() {
                return Ok(());
            }
            let mean_square =
                x.par_iter().map(|&v| f64::from(v) * f64::from(v)).sum::<f64>() / x.len() as f64;
            let scale = (1.0 / (mean_square + f64::from(eps)).sqrt()) as f32;
            out.par_iter_mut()
                .zip(x.par_iter())
                .for_each(|(o, &v)| *o = v * scale);
        }
        Kernel::Mul | Kernel::Add => {
            let (a, b) = (inputs[0], inputs[1]);
            check_len(node, a, out)?;
            check_len(node, b, out)?;
            let add = node.kernel == Kernel::Add;
            out.par_iter_mut()
                .zip(a.par_iter().zip(b.par_iter()))
                .for_each(|(o, (&x, &y))| *o = if add { x + y } else { x * y });
        }
        Kernel::MatMul { m, k, n } => {
            let (a, b) = (inputs[0], inputs[1]);
            if a.len() != m * k || b.len() != k * n || out.len() != m * n {
                return Err(TensorServeError::ExecutionFailed(format!(
                    "matmul for tensor {}: buffers {}/{}/{} do not match {}x{}x{}",
                    node.tensor,
                    a.len(),
                    b.len(),
                    out.len(),
                    m,
                    k,
                    n
                )));
            }
            if m == 0 || n == 0 {
                return Ok(());
            }
            if k == 0 {
                out.fill(0.0);
                return Ok(());
            }

            let lhs = MatRef::from_row_major_slice(a, m, k);
            let rhs = MatRef::from_row_major_slice(b, k, n);
            // C^T = B^T A^T written column-major is C row-major.
            let mut out_view = MatMut::from_column_major_slice_mut(out, n, m);
            matmul(&mut out_view, Accum::Replace, rhs.transpose(), lhs.transpose(), 1.0f32, par);
        }
        Kernel::Silu => {
            let x = inputs[0];
            check_len(node, x, out)?;
            out.par_iter_mut()
                .zip(x.par_iter())
                .for_each(|(o, &v)| *o = v / (1.0 + (-v).exp()));
        }
        Kernel::SoftMax => {
            let x = inputs[0];
            check_len(node, x, out)?;
            if x.is_empty() {
                return Ok(());
            }
            let max = x.par_iter().copied().reduce(|| f32::NEG_INFINITY, f32::max);
            out.par_iter_mut()
                .zip(x.par_iter())
                .for_each(|(o, &v)| *o = (v - max).exp());
            let sum = out.par_iter().map(|&e| f64::from(e)).sum::<f64>() as f32;
            out.par_iter_mut().for_each(|o| *o /= sum);
        }
    }
    Ok(())
}

fn check_len(node: &GraphNode, input: &[f32], out: &[f32]) -> ServeResult<()> {
    if input.len() != out.len() {
        return Err(TensorServeError::ExecutionFailed(format!(
            "{:?} for tensor {}: input has {} values, output {}",
            node.kernel,
            node.tensor,
            input.len(),
            out.len()
        )));
    }
    Ok(())
}
