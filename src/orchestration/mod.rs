//! Request orchestration layer
//!
//! This module connects the normalizers, the execution context and the
//! dispatch engine into the per-request lifecycle.

pub mod adapter;
pub mod lifecycle;
pub mod router;

#[cfg(test)]
mod tests;

pub use adapter::{DispatcherAdapter, HandleState};
pub use lifecycle::{Worker, WorkerStats};
pub use router::RequestRouter;
