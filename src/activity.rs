//! Audit trail of user-attributable pipeline actions.
//!
//! Each call emits one event on the `activity` target with `user_id`,
//! `action`, `status` and `details` fields, so the trail can be routed to its
//! own file or filtered with `RUST_LOG=activity=info`.

use tracing::{info, warn};

pub const ANALYZE: &str = "analyze";
pub const LLM_SUGGESTION: &str = "llm_suggestion";

/// Actor used when the owning report cannot be resolved.
pub const UNKNOWN_USER: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Success,
    Failure,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::Failure => "failure",
        }
    }
}

pub fn log_action(user_id: &str, action: &str, status: ActionStatus, details: &str) {
    match status {
        ActionStatus::Success => info!(
            target: "activity",
            user_id,
            action,
            status = status.as_str(),
            details,
            "user action"
        ),
        ActionStatus::Failure => warn!(
            target: "activity",
            user_id,
            action,
            status = status.as_str(),
            details,
            "user action"
        ),
    }
}

pub fn success(user_id: &str, action: &str, details: &str) {
    log_action(user_id, action, ActionStatus::Success, details);
}

pub fn failure(user_id: &str, action: &str, details: &str) {
    log_action(user_id, action, ActionStatus::Failure, details);
}
