//! The approval port and its built-in implementations.

use std::collections::VecDeque;
use std::io::Write;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use cadence_core::{ApprovalOutcome, ApprovalRequest, ApprovalResult, Context};

/// Single-method port gating a sensitive step on a human decision.
/// Console, queue-backed, and UI-backed approvers are interchangeable
/// behind this interface.
#[async_trait]
pub trait ApprovalPort: Send + Sync {
    /// Present the request and return the decision, or Pending when the
    /// decision will arrive out of band.
    async fn request(&self, request: ApprovalRequest) -> Result<ApprovalOutcome, anyhow::Error>;
}

/// Interactive console approver: prints the preview and reads one line
/// from stdin.
pub struct ConsoleApprovalPort;

#[async_trait]
impl ApprovalPort for ConsoleApprovalPort {
    async fn request(&self, request: ApprovalRequest) -> Result<ApprovalOutcome, anyhow::Error> {
        // Blocking stdin read, moved off the runtime.
        let result = tokio::task::spawn_blocking(move || -> Result<ApprovalResult, anyhow::Error> {
            println!("{}", request.preview);
            print!("[a]pprove / [r]eject / a[b]ort / [m]odify? ");
            std::io::stdout().flush()?;

            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;

            match line.trim().to_lowercase().as_str() {
                "a" | "approve" | "y" | "yes" => Ok(ApprovalResult::approve()),
                "b" | "abort" => Ok(ApprovalResult::abort("aborted at console")),
                "m" | "modify" => {
                    print!("overrides (JSON object): ");
                    std::io::stdout().flush()?;
                    let mut json_line = String::new();
                    std::io::stdin().read_line(&mut json_line)?;
                    let overrides: Context = serde_json::from_str(json_line.trim())?;
                    Ok(ApprovalResult::modify(overrides))
                }
                _ => Ok(ApprovalResult::reject("rejected at console")),
            }
        })
        .await??;

        Ok(ApprovalOutcome::Resolved(result))
    }
}

/// Queue-backed approver: decisions are pushed from elsewhere (a UI, a
/// test) and handed out in order; an empty queue yields Pending so the
/// executor checkpoints and pauses.
pub struct QueuedApprovalPort {
    decisions: Mutex<VecDeque<ApprovalResult>>,
}

impl QueuedApprovalPort {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            decisions: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue a decision for the next request.
    pub async fn push(&self, result: ApprovalResult) {
        self.decisions.lock().await.push_back(result);
    }
}

impl Default for QueuedApprovalPort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalPort for QueuedApprovalPort {
    async fn request(&self, request: ApprovalRequest) -> Result<ApprovalOutcome, anyhow::Error> {
        match self.decisions.lock().await.pop_front() {
            Some(result) => Ok(ApprovalOutcome::Resolved(result)),
            None => {
                info!(step = %request.step_id, "no queued approval decision; pausing");
                Ok(ApprovalOutcome::Pending)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::ApprovalDecision;

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            step_id: "s1".to_string(),
            description: "desc".to_string(),
            action_type: "tool_use".to_string(),
            action_details: "noop {}".to_string(),
            resolved_context: Context::new(),
            approval_message: None,
            preview: "preview".to_string(),
        }
    }

    #[tokio::test]
    async fn test_queued_port_hands_out_decisions_in_order() {
        let port = QueuedApprovalPort::new();
        port.push(ApprovalResult::approve()).await;
        port.push(ApprovalResult::reject("nope")).await;

        match port.request(request()).await.unwrap() {
            ApprovalOutcome::Resolved(r) => assert_eq!(r.decision, ApprovalDecision::Approve),
            ApprovalOutcome::Pending => unreachable!(),
        }
        match port.request(request()).await.unwrap() {
            ApprovalOutcome::Resolved(r) => assert_eq!(r.decision, ApprovalDecision::Reject),
            ApprovalOutcome::Pending => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_empty_queue_is_pending() {
        let port = QueuedApprovalPort::new();
        assert!(matches!(
            port.request(request()).await.unwrap(),
            ApprovalOutcome::Pending
        ));
    }
}
