//! Approval layer - synchronous human-in-the-loop gating.
//!
//! Builds bounded previews of sensitive steps and routes them through a
//! single-method [`ApprovalPort`].

#![warn(missing_docs)]

pub mod port;
pub mod preview;

pub use port::{ApprovalPort, ConsoleApprovalPort, QueuedApprovalPort};
pub use preview::build_request;
