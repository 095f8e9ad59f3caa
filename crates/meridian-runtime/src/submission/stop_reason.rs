//! The stop-reason derivation rule (§4.6): explicit metadata wins, then
//! `max_tokens`/`timeout` flags, then success/error inferred from the
//! final task status.

use meridian_core::task::TaskStatus;

pub fn stop_reason(
    explicit: Option<&str>,
    max_tokens_reached: bool,
    timed_out: bool,
    status: TaskStatus,
) -> String {
    if let Some(explicit) = explicit {
        if !explicit.is_empty() {
            return explicit.to_string();
        }
    }
    if max_tokens_reached {
        return "max_tokens".to_string();
    }
    if timed_out {
        return "timeout".to_string();
    }
    match status {
        TaskStatus::Completed => "completed".to_string(),
        _ if status.is_terminal() => "error".to_string(),
        _ => "in_progress".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_metadata_wins() {
        assert_eq!(stop_reason(Some("user_cancelled"), true, true, TaskStatus::Completed), "user_cancelled");
    }

    #[test]
    fn max_tokens_before_timeout() {
        assert_eq!(stop_reason(None, true, true, TaskStatus::Completed), "max_tokens");
    }

    #[test]
    fn timeout_before_status() {
        assert_eq!(stop_reason(None, false, true, TaskStatus::Completed), "timeout");
    }

    #[test]
    fn completed_success() {
        assert_eq!(stop_reason(None, false, false, TaskStatus::Completed), "completed");
    }

    #[test]
    fn other_terminal_is_error() {
        assert_eq!(stop_reason(None, false, false, TaskStatus::Failed), "error");
    }

    #[test]
    fn non_terminal_is_in_progress() {
        assert_eq!(stop_reason(None, false, false, TaskStatus::Running), "in_progress");
    }
}
