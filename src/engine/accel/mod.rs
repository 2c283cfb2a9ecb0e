//! Accelerated evaluation backend
//!
//! - [`arena`] - fixed-capacity bump arena holding every tensor of a scope
//! - [`graph`] - native compute graph and its kernels (`rayon`, `faer`)
//! - [`backend`] - scope factory and the [`crate::engine::Scope`] implementation

pub mod arena;
pub mod backend;
pub mod graph;

pub use arena::{ArenaSlice, ComputeArena, ARENA_ALIGNMENT};
pub use backend::{AcceleratedBackend, AcceleratedScope, MAX_RANK};
pub use graph::{ComputeGraph, GraphNode, Kernel};
