//! Error formatting utilities
//!
//! Renders errors with their nested causes for log lines.

use crate::Error;
use std::error::Error as StdError;

/// Format error for display, appending each distinct cause in the chain
pub fn format_error(error: &Error) -> String {
    let formatted = match error {
        Error::Timeout {
            operation,
            duration_secs,
        } => format!(
            "Operation '{}' timed out after {} seconds",
            operation, duration_secs
        ),
        Error::Automation { stage, message } => {
            format!("Automation failed at {}: {}", stage, message)
        }
        _ => error.to_string(),
    };

    let mut result = formatted;
    let mut source = error.source();

    while let Some(cause) = source {
        if !result.contains(&cause.to_string()) {
            result = format!("{} (caused by {})", result, cause);
        }
        source = cause.source();
    }

    result
}

/// Format error for logging with its category prefix
pub fn format_error_for_logging(error: &Error) -> String {
    format!("[{}] {}", error.category(), format_error(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timeout() {
        let error = Error::timeout("navigate", 25);
        assert_eq!(
            format_error(&error),
            "Operation 'navigate' timed out after 25 seconds"
        );
    }

    #[test]
    fn test_format_automation() {
        let error = Error::automation("evaluate", "context destroyed");
        assert!(format_error(&error).contains("Automation failed at evaluate"));
    }

    #[test]
    fn test_format_for_logging_has_category() {
        let error = Error::SessionExpired;
        assert_eq!(
            format_error_for_logging(&error),
            "[session] Session expired or unknown"
        );
    }

    #[test]
    fn test_format_io_error_no_duplicate_cause() {
        let io = std::io::Error::other("disk gone");
        let error: Error = io.into();
        let formatted = format_error(&error);
        assert_eq!(formatted.matches("disk gone").count(), 1);
    }
}
