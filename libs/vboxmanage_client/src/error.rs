use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

static RE_MACHINE_NOT_FOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Could not find a registered machine named '(.+)'").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VBoxParseError {
    #[error("Bad {key} entry: {reason} ({key}={value})")]
    MalformedRecord {
        key: String,
        value: String,
        reason: String,
    },
}

impl VBoxParseError {
    pub fn malformed(key: &str, value: &str, reason: impl Into<String>) -> Self {
        VBoxParseError::MalformedRecord {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum VBoxCliError {
    #[error("'{0}' not found")]
    ToolNotFound(String),
    #[error("VBoxManage reported an error: {0}")]
    ToolReported(String),
    #[error("'VBoxManage' command could not be executed: {0}")]
    CommandExecutionError(#[from] std::io::Error),
    #[error("'VBoxManage' command failed (exit code {code:?}): {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },
    #[error("'VBoxManage' command did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Failed to parse cli stdout: {0}")]
    VBoxParseError(#[from] VBoxParseError),
}

impl VBoxCliError {
    /// true for process-level failures the tool gave no message for
    pub fn is_unclassified(&self) -> bool {
        matches!(
            self,
            VBoxCliError::CommandExecutionError(_) | VBoxCliError::CommandFailed { .. }
        )
    }

    /// name of the machine VBoxManage could not find, if that is what it reported
    pub fn missing_machine(&self) -> Option<&str> {
        match self {
            VBoxCliError::ToolReported(message) => RE_MACHINE_NOT_FOUND
                .captures(message)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_machine_is_extracted_from_reported_error() {
        let err = VBoxCliError::ToolReported(
            "Could not find a registered machine named 'devbox'".to_string(),
        );
        assert_eq!(err.missing_machine(), Some("devbox"));
        assert!(!err.is_unclassified());
    }

    #[test]
    fn other_errors_have_no_missing_machine() {
        let err = VBoxCliError::ToolReported("machine already exists".to_string());
        assert_eq!(err.missing_machine(), None);

        let err = VBoxCliError::CommandFailed {
            code: Some(1),
            stderr: "Could not find a registered machine named 'devbox'".to_string(),
        };
        assert_eq!(err.missing_machine(), None);
        assert!(err.is_unclassified());
    }

    #[test]
    fn malformed_record_display_names_key_and_value() {
        let err = VBoxParseError::malformed("Forwarding(0)", "a,b", "wrong number of parameters");
        assert_eq!(
            err.to_string(),
            "Bad Forwarding(0) entry: wrong number of parameters (Forwarding(0)=a,b)"
        );
    }
}
