//! Worker execution outcome.

use serde::{Deserialize, Serialize};

use crate::Context;

/// What the worker reports back after executing a step.
///
/// Worker-level failures are reported through `success`/`error` rather
/// than an `Err`, so the judge can turn them into a retry or replan
/// verdict; an `Err` from a worker is reserved for infrastructure
/// problems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Whether the worker considers the step to have succeeded
    pub success: bool,

    /// Outputs produced, keyed by output name
    #[serde(default)]
    pub outputs: Context,

    /// Failure detail when `success` is false
    #[serde(default)]
    pub error: Option<String>,

    /// Tokens consumed by the step, if any
    #[serde(default)]
    pub tokens_used: u64,

    /// Wall-clock execution time in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

impl StepOutcome {
    /// A successful outcome carrying the given outputs.
    pub fn success(outputs: Context) -> Self {
        Self {
            success: true,
            outputs,
            error: None,
            tokens_used: 0,
            latency_ms: 0,
        }
    }

    /// A failed outcome carrying an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            outputs: Context::new(),
            error: Some(error.into()),
            tokens_used: 0,
            latency_ms: 0,
        }
    }

    /// Set the token count.
    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    /// Set the latency.
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}
