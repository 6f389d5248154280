//! Status-token classification and duration formatting.
//!
//! The control plane reports lifecycle transitions as SCREAMING_SNAKE
//! tokens (`CREATE_IN_PROGRESS`, `UPDATE_ROLLBACK_COMPLETE`, ...). The
//! classifiers here are the single source of truth for what counts as
//! settled, failed, or terminal.

/// Deployment statuses from which no further automatic transition occurs.
const TERMINAL_DEPLOYMENT_STATUSES: &[&str] = &[
    "CREATE_COMPLETE",
    "CREATE_FAILED",
    "UPDATE_COMPLETE",
    "UPDATE_FAILED",
    "DELETE_COMPLETE",
    "DELETE_FAILED",
    "ROLLBACK_COMPLETE",
    "ROLLBACK_FAILED",
    "UPDATE_ROLLBACK_COMPLETE",
    "UPDATE_ROLLBACK_FAILED",
];

/// Returns true for deployment-level terminal statuses.
#[must_use]
pub fn is_terminal_deployment_status(status: &str) -> bool {
    TERMINAL_DEPLOYMENT_STATUSES.contains(&status)
}

/// Returns true when the status denotes a failure or rollback outcome.
#[must_use]
pub fn is_failure_status(status: &str) -> bool {
    status.ends_with("_FAILED") || status.starts_with("ROLLBACK") || status.starts_with("UPDATE_ROLLBACK")
}

/// Returns true once a resource has settled for the in-flight operation
/// (success or failure; no longer in progress).
#[must_use]
pub fn is_resource_settled(status: &str) -> bool {
    status.ends_with("_COMPLETE") || status.ends_with("_FAILED")
}

/// Returns true for a settled-successfully resource status.
#[must_use]
pub fn is_resource_complete(status: &str) -> bool {
    status.ends_with("_COMPLETE")
}

/// Formats a duration as `"4m 15s"` (or `"42s"` under a minute).
#[must_use]
pub fn format_duration(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes == 0 {
        format!("{seconds}s")
    } else {
        format!("{minutes}m {seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(is_terminal_deployment_status("CREATE_COMPLETE"));
        assert!(is_terminal_deployment_status("UPDATE_ROLLBACK_FAILED"));
        assert!(!is_terminal_deployment_status("CREATE_IN_PROGRESS"));
        assert!(!is_terminal_deployment_status("UPDATE_ROLLBACK_IN_PROGRESS"));
    }

    #[test]
    fn test_failure_classification() {
        assert!(is_failure_status("CREATE_FAILED"));
        assert!(is_failure_status("ROLLBACK_COMPLETE"));
        assert!(!is_failure_status("UPDATE_COMPLETE"));
    }

    #[test]
    fn test_settled_classification() {
        assert!(is_resource_settled("CREATE_COMPLETE"));
        assert!(is_resource_settled("CREATE_FAILED"));
        assert!(!is_resource_settled("DELETE_IN_PROGRESS"));
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(255), "4m 15s");
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(60), "1m 0s");
        assert_eq!(format_duration(-3), "0s");
    }
}
