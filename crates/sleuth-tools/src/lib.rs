//! Capability registry, rate-limited call queue, and built-in capabilities.
//!
//! Capabilities implement [`sleuth_core::traits::Capability`] and are looked
//! up by name through the [`ToolRegistry`]. Rate-limited providers sit behind
//! a [`CallQueue`], which serializes all traffic to them through one worker.

pub mod builtin;
pub mod queue;
pub mod registry;

pub use queue::{CallQueue, QueueWorker};
pub use registry::ToolRegistry;
