//! Worker layer - step execution behind a trait seam.
//!
//! The executor only sees the [`Worker`] trait; [`BuiltinWorker`]
//! dispatches each action kind to registered tools, native functions,
//! or injected ports.

#![warn(missing_docs)]

pub mod builtin;
pub mod traits;

pub use builtin::{BuiltinWorker, NativeFn};
pub use traits::{CodeRunner, Completion, CompletionPort, SubPlanRunner, Tool, Worker};
