use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use super::error::{OpenAIError, OpenAIResult};

/// Header required by the realtime endpoints.
pub(crate) const REALTIME_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "realtime=v1");

/// Header required by the assistants and threads endpoints.
pub(crate) const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Thin authenticated client for the OpenAI REST API.
///
/// Cloning is cheap: the underlying `reqwest::Client` is reference counted.
#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAIClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.endpoint(path)).bearer_auth(&self.api_key)
    }
}

/// Send a request and decode a JSON body, mapping non-2xx responses to `OpenAIError::Api`.
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> OpenAIResult<T> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OpenAIError::from_body(status.as_u16(), &body));
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| OpenAIError::InvalidResponse(e.to_string()))
}
