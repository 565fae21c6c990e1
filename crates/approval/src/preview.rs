//! Bounded previews of gated steps for human review.

use cadence_core::{vars, Action, ApprovalRequest, Context, Step};

/// Longest serialized-argument rendering shown to an approver.
const MAX_ARGS_CHARS: usize = 500;

/// Longest prompt rendering shown to an approver.
const MAX_PROMPT_CHARS: usize = 300;

/// Truncate to at most `max` characters, appending an ellipsis marker
/// when anything was cut. Operates on characters, not bytes.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}

fn action_details(action: &Action) -> String {
    match action {
        Action::LlmCall { prompt, .. } => truncate(prompt, MAX_PROMPT_CHARS),
        Action::ToolUse { tool, args } => {
            let args = serde_json::to_string(args).unwrap_or_else(|_| "{}".to_string());
            format!("{tool} {}", truncate(&args, MAX_ARGS_CHARS))
        }
        Action::Function { function, args } => {
            let args = serde_json::to_string(args).unwrap_or_else(|_| "{}".to_string());
            format!("{function} {}", truncate(&args, MAX_ARGS_CHARS))
        }
        Action::CodeExecution { code, .. } => truncate(code, MAX_ARGS_CHARS),
        Action::SubGraph { goal } => truncate(goal, MAX_PROMPT_CHARS),
    }
}

/// Build the approval request for a gated step: action preview plus the
/// subset of context the step's declared inputs actually reference.
pub fn build_request(step: &Step, context: &Context) -> ApprovalRequest {
    let action_type = step.action.kind().to_string();
    let details = action_details(&step.action);
    let resolved_context = vars::referenced_subset(&step.inputs, context);

    let mut preview = format!(
        "Approval required: {}\nStep: {} ({})\nAction: {}",
        step.description, step.id, action_type, details,
    );
    if let Some(message) = &step.approval_message {
        preview.push_str("\nNote: ");
        preview.push_str(message);
    }
    if !resolved_context.is_empty() {
        preview.push_str("\nContext:");
        for (key, value) in &resolved_context {
            let rendered = serde_json::to_string(value).unwrap_or_default();
            preview.push_str(&format!("\n  {key} = {}", truncate(&rendered, 120)));
        }
    }

    ApprovalRequest {
        step_id: step.id.clone(),
        description: step.description.clone(),
        action_type,
        action_details: details,
        resolved_context,
        approval_message: step.approval_message.clone(),
        preview,
    }
}
