use thiserror::Error;

/// Failure of a single question round. `Display` is the text shown above the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("⏳ You are chatting too fast! Please wait 1-2 minutes.")]
    RateLimited,

    #[error("API Error: {status}{}", reason_suffix(.reason))]
    Upstream { status: u16, reason: String },

    #[error("Something went wrong while fetching the answer.")]
    MalformedResponse(String),

    #[error("Something went wrong while fetching the answer.")]
    Network(String),
}

fn reason_suffix(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(" {}", reason)
    }
}

impl ChatError {
    /// Maps a non-success HTTP status. Returns `None` for 2xx.
    pub fn from_status(status: reqwest::StatusCode) -> Option<Self> {
        if status.is_success() {
            None
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Some(ChatError::RateLimited)
        } else {
            Some(ChatError::Upstream {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            })
        }
    }

    /// Diagnostic detail for logs; never shown to the user.
    pub fn detail(&self) -> &str {
        match self {
            ChatError::MalformedResponse(detail) | ChatError::Network(detail) => detail,
            ChatError::Upstream { reason, .. } => reason,
            ChatError::RateLimited => "rate limited",
        }
    }
}
