use gridsite_core::contracts::ValidationErrors;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("validation failed: {}", .0.message())]
    Validation(ValidationErrors),
    #[error("server answered {status}{}", message_suffix(.message))]
    Status {
        status: u16,
        message: Option<String>,
    },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|message| format!(": {message}"))
        .unwrap_or_default()
}

impl ApiError {
    /// Text to show the user: field messages when the backend sent them,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Validation(errors) if !errors.is_empty() => errors.message(),
            _ => fallback.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }
}
