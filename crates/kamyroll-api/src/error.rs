use thiserror::Error;

/// Backend error codes that are worth another attempt after a longer pause.
pub const TRANSIENT_INIT_CODES: &[&str] = &["bad_player_connection", "bad_initialize"];

/// Backend code for content that needs a premium account.
pub const PREMIUM_ONLY: &str = "premium_only";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Internet or API not available")]
    Unavailable,
    #[error("invalid {entity}: {reason}")]
    Decode { entity: &'static str, reason: String },
    #[error("{message}")]
    Api { code: String, message: String },
    #[error("{0}")]
    PremiumOnly(String),
    #[error("The provided id of the url is not valid")]
    UnknownId,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("no service configuration loaded")]
    MissingConfig,
    #[error("cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn decode(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            entity,
            reason: reason.into(),
        }
    }

    /// Classify a backend error code: `true` if the call may be repeated.
    pub fn is_retryable_code(code: &str) -> bool {
        !matches!(code, PREMIUM_ONLY | "unknown_id")
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("bad_player_connection", true)]
    #[case("bad_initialize", true)]
    #[case("something_new", true)]
    #[case("premium_only", false)]
    #[case("unknown_id", false)]
    fn code_classification(#[case] code: &str, #[case] retryable: bool) {
        assert_eq!(ApiError::is_retryable_code(code), retryable);
    }

    #[test]
    fn unavailable_message() {
        assert_eq!(ApiError::Unavailable.to_string(), "Internet or API not available");
    }
}
