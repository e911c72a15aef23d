//! The machine: VM state, frames and metrics
pub mod metrics;
pub mod vm;
