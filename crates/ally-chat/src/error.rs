use ally_sse::StreamError;
use thiserror::Error;

/// Errors that can occur while talking to the support-chat function
#[derive(Debug, Error)]
pub enum ChatError {
    /// Opening or reading the response stream failed
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// HTTP client errors
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// A required environment variable is not set
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),
}

impl ChatError {
    /// HTTP status returned by the function, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::Stream(StreamError::Api { status, .. }) => Some(*status),
            ChatError::Stream(StreamError::Http(e)) | ChatError::ReqwestError(e) => {
                e.status().map(|s| s.as_u16())
            }
            _ => None,
        }
    }
}
