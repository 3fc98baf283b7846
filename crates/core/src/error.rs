use thiserror::Error;

/// Failure taxonomy for one monitoring run.
///
/// Every variant is fatal for the run except `Api`, whose handling
/// (skip the account vs. abort) is chosen by [`crate::rules::FailureMode`].
/// An administrative chat alert is attempted for every class except
/// `Configuration` (nothing has happened yet) and `Dispatch` (notifying is
/// precisely what failed).
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("missing required configuration: {0}")]
    Configuration(String),

    #[error("authentication failed during {stage}: {detail}")]
    Authentication { stage: &'static str, detail: String },

    #[error(
        "balance API error for account {account_id} ({account_name}): \
         status={status}{}",
        describe(.code, .message, .details)
    )]
    Api {
        account_id: u64,
        account_name: String,
        status: u16,
        code: Option<String>,
        message: Option<String>,
        details: Option<String>,
    },

    #[error("console UI element not found: {0}")]
    UiStructure(String),

    #[error("no downloaded file found in {0}")]
    NoFileFound(String),

    #[error("CSV parse failed: {0}")]
    Parse(String),

    #[error("notification dispatch failed: {0}")]
    Dispatch(String),
}

fn describe(code: &Option<String>, message: &Option<String>, details: &Option<String>) -> String {
    let mut out = String::new();
    if let Some(code) = code {
        out.push_str(&format!(", code={code}"));
    }
    if let Some(message) = message {
        out.push_str(&format!(", message={message}"));
    }
    if let Some(details) = details {
        out.push_str(&format!(", details={details}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_structured_fields() {
        let err = CheckError::Api {
            account_id: 42,
            account_name: "Example".to_string(),
            status: 400,
            code: Some("1004".to_string()),
            message: Some("invalid account".to_string()),
            details: None,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("account 42 (Example)"));
        assert!(rendered.contains("status=400"));
        assert!(rendered.contains("code=1004"));
        assert!(rendered.contains("message=invalid account"));
        assert!(!rendered.contains("details="));
    }
}
