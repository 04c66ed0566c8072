use std::{fmt, time::Duration};

use ally_sse::SseReader;
use async_trait::async_trait;
use bon::Builder;
use log::debug;

use crate::{error::ChatError, message::ChatSupportRequest, transport::ChatTransport};

/// Path of the support-chat edge function below the project URL
pub const DEFAULT_FUNCTION_PATH: &str = "functions/v1/chat-support";

/// Environment variable holding the project URL
pub const URL_ENV: &str = "SUPABASE_URL";

/// Environment variable holding the publishable (anon) key
pub const KEY_ENV: &str = "SUPABASE_PUBLISHABLE_KEY";

/// Client for the hosted `chat-support` function
#[derive(Clone, Builder)]
pub struct ChatSupportClient {
    /// Project URL, e.g. `https://xyz.supabase.co`
    #[builder(into)]
    pub base_url: String,

    /// Publishable key, sent as bearer token and `apikey` header
    #[builder(into)]
    api_key: String,

    /// Function path appended to the base URL
    #[builder(default = DEFAULT_FUNCTION_PATH.to_string(), into)]
    pub function_path: String,

    /// Whole-request timeout. Unset by default so long replies are never cut off.
    pub request_timeout: Option<Duration>,

    /// HTTP client for making requests
    #[builder(skip)]
    client: reqwest::Client,
}

impl ChatSupportClient {
    /// Create a client for the given project URL and publishable key
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::builder().base_url(base_url).api_key(api_key).build()
    }

    /// Create a client from `SUPABASE_URL` and `SUPABASE_PUBLISHABLE_KEY`
    ///
    /// # Errors
    ///
    /// [`ChatError::MissingConfig`] naming the first variable that is unset or empty.
    pub fn from_env() -> Result<Self, ChatError> {
        let base_url = read_env(URL_ENV)?;
        let api_key = read_env(KEY_ENV)?;
        Ok(Self::new(base_url, api_key))
    }

    /// Full URL of the chat function
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.function_path.trim_start_matches('/')
        )
    }

    /// Post the history and open the reply stream
    ///
    /// # Errors
    ///
    /// Fails on network errors, a non-success status or a response without a body.
    pub async fn stream(&self, request: &ChatSupportRequest) -> Result<SseReader, ChatError> {
        let url = self.endpoint();
        debug!("POST {url} with {} messages", request.messages.len());

        let mut req = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .json(request);

        if let Some(timeout) = self.request_timeout {
            req = req.timeout(timeout);
        }

        let response = req.send().await?;
        Ok(SseReader::from_response(response).await?)
    }
}

impl fmt::Debug for ChatSupportClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSupportClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("function_path", &self.function_path)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatTransport for ChatSupportClient {
    async fn open(&self, request: &ChatSupportRequest) -> Result<SseReader, ChatError> {
        self.stream(request).await
    }
}

fn read_env(name: &'static str) -> Result<String, ChatError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ChatError::MissingConfig(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_paths() {
        let client = ChatSupportClient::new("https://abc.supabase.co/", "anon");
        assert_eq!(
            client.endpoint(),
            "https://abc.supabase.co/functions/v1/chat-support"
        );
    }

    #[test]
    fn test_builder_overrides() {
        let client = ChatSupportClient::builder()
            .base_url("http://localhost:54321")
            .api_key("anon")
            .function_path("/functions/v1/chat-support-beta")
            .request_timeout(Duration::from_secs(5))
            .build();

        assert_eq!(
            client.endpoint(),
            "http://localhost:54321/functions/v1/chat-support-beta"
        );
        assert_eq!(client.request_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = ChatSupportClient::new("https://abc.supabase.co", "sb_publishable_s3cr3t");
        let printed = format!("{client:?}");

        assert!(!printed.contains("sb_publishable_s3cr3t"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("https://abc.supabase.co"));
    }

    #[test]
    fn test_unset_variable_is_missing_config() {
        assert!(matches!(
            read_env("ALLY_CHAT_TEST_UNSET_VARIABLE"),
            Err(ChatError::MissingConfig("ALLY_CHAT_TEST_UNSET_VARIABLE"))
        ));
    }
}
