//! SDP offer/answer exchange with the realtime endpoint.
//!
//! The offer is POSTed as `application/sdp` to `{base}/realtime?model=<model>`
//! using the session token (not the server's secret key). The provider answers
//! with a raw SDP body; some deployments answer with JSON `{"type": "answer", "sdp": "..."}`,
//! which is accepted too.

use serde::Deserialize;

use super::client::REALTIME_BETA_HEADER;
use super::error::{OpenAIError, OpenAIResult};

#[derive(Deserialize)]
struct JsonAnswer {
    sdp: String,
}

/// Posts SDP offers on behalf of a session-token holder.
#[derive(Debug, Clone)]
pub struct SdpExchange {
    http: reqwest::Client,
    base_url: String,
}

impl SdpExchange {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send `offer_sdp` and return the remote answer SDP.
    pub async fn exchange(&self, token: &str, model: &str, offer_sdp: &str) -> OpenAIResult<String> {
        let url = format!("{}/realtime", self.base_url);

        let response = self
            .http
            .post(&url)
            .query(&[("model", model)])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .header(REALTIME_BETA_HEADER.0, REALTIME_BETA_HEADER.1)
            .body(offer_sdp.to_string())
            .send()
            .await?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = %status, "SDP exchange rejected");
            return Err(OpenAIError::from_body(status.as_u16(), &body));
        }

        let answer = if is_json {
            serde_json::from_str::<JsonAnswer>(&body)
                .map_err(|e| OpenAIError::InvalidResponse(format!("invalid SDP answer JSON: {e}")))?
                .sdp
        } else {
            body
        };

        if answer.trim().is_empty() {
            return Err(OpenAIError::InvalidResponse("empty SDP answer".to_string()));
        }

        tracing::debug!(bytes = answer.len(), "Received SDP answer");
        Ok(answer)
    }
}

impl super::OpenAIClient {
    /// SDP exchanger sharing this client's connection pool and base URL.
    pub fn sdp_exchange(&self) -> SdpExchange {
        SdpExchange::new(self.http().clone(), self.base_url())
    }
}
