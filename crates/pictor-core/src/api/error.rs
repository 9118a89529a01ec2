use eventsource_stream::EventStreamError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SseParseError {
    #[error("UTF-8 error: {details}")]
    Utf8 { details: String },
    #[error("Parse error: {details}")]
    Parser { details: String },
    #[error("Transport error: {details}")]
    Transport { details: String },
}

impl<E> From<EventStreamError<E>> for SseParseError
where
    E: std::error::Error,
{
    fn from(err: EventStreamError<E>) -> Self {
        match err {
            EventStreamError::Utf8(err) => Self::Utf8 {
                details: err.to_string(),
            },
            EventStreamError::Parser(err) => Self::Parser {
                details: err.to_string(),
            },
            EventStreamError::Transport(err) => Self::Transport {
                details: err.to_string(),
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Authentication failed: {details}")]
    AuthenticationFailed { provider: String, details: String },

    #[error("Rate limited by {provider}: {details}")]
    RateLimited { provider: String, details: String },

    #[error("Invalid request to {provider}: {details}")]
    InvalidRequest { provider: String, details: String },

    #[error("{provider} server error (Status: {status_code}): {details}")]
    ServerError {
        provider: String,
        status_code: u16,
        details: String,
    },

    #[error("Request cancelled for {provider}")]
    Cancelled { provider: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ApiError {
    /// Maps a non-success HTTP status to the matching variant.
    pub fn from_status(provider: &str, status_code: u16, details: String) -> Self {
        let provider = provider.to_string();
        match status_code {
            401 | 403 => ApiError::AuthenticationFailed { provider, details },
            429 => ApiError::RateLimited { provider, details },
            400 | 404 | 422 => ApiError::InvalidRequest { provider, details },
            _ => ApiError::ServerError {
                provider,
                status_code,
                details,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_variants() {
        assert!(matches!(
            ApiError::from_status("openai", 401, String::new()),
            ApiError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            ApiError::from_status("openai", 429, String::new()),
            ApiError::RateLimited { .. }
        ));
        assert!(matches!(
            ApiError::from_status("openai", 503, String::new()),
            ApiError::ServerError {
                status_code: 503,
                ..
            }
        ));
    }
}
