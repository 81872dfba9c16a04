//! Twilio REST client: outbound call creation.

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TwilioError {
    #[error("Twilio request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx response carrying Twilio's error body
    #[error("Twilio error: {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
        more_info: Option<String>,
    },

    #[error("Unexpected Twilio response: {0}")]
    InvalidResponse(String),
}

impl TwilioError {
    /// Twilio client errors surface as 400; everything else is a bad gateway.
    pub fn status_code(&self) -> StatusCode {
        match self {
            TwilioError::Api { status, .. } if (400..500).contains(status) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            TwilioError::Api {
                status,
                code,
                message,
                more_info,
            } => Some(json!({
                "status": status,
                "code": code,
                "message": message,
                "more_info": more_info,
            })),
            _ => None,
        }
    }
}

pub type TwilioResult<T> = Result<T, TwilioError>;

/// What the call executes once answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallInstructions {
    /// Twilio fetches TwiML from this webhook.
    Url(String),
    /// Inline TwiML document.
    Twiml(String),
}

/// Parameters of `calls.create`.
#[derive(Debug, Clone)]
pub struct CreateCall {
    pub to: String,
    pub from: String,
    pub instructions: CallInstructions,
    pub status_callback: Option<String>,
    pub status_callback_events: Vec<String>,
    pub status_callback_method: Option<String>,
    pub record: bool,
}

impl CreateCall {
    pub fn new(to: impl Into<String>, from: impl Into<String>, instructions: CallInstructions) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            instructions,
            status_callback: None,
            status_callback_events: Vec::new(),
            status_callback_method: None,
            record: false,
        }
    }

    /// POST status callbacks to `url` for the given events.
    pub fn status_callback(mut self, url: impl Into<String>, events: &[&str]) -> Self {
        self.status_callback = Some(url.into());
        self.status_callback_events = events.iter().map(|e| e.to_string()).collect();
        self.status_callback_method = Some("POST".to_string());
        self
    }

    pub fn record(mut self, record: bool) -> Self {
        self.record = record;
        self
    }

    /// Form body; `StatusCallbackEvent` is repeated once per event.
    fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("To", self.to.clone()), ("From", self.from.clone())];
        match &self.instructions {
            CallInstructions::Url(url) => form.push(("Url", url.clone())),
            CallInstructions::Twiml(twiml) => form.push(("Twiml", twiml.clone())),
        }
        if let Some(callback) = &self.status_callback {
            form.push(("StatusCallback", callback.clone()));
        }
        for event in &self.status_callback_events {
            form.push(("StatusCallbackEvent", event.clone()));
        }
        if let Some(method) = &self.status_callback_method {
            form.push(("StatusCallbackMethod", method.clone()));
        }
        if self.record {
            form.push(("Record", "true".to_string()));
        }
        form
    }
}

/// Subset of the call resource returned by Twilio.
#[derive(Debug, Clone, Deserialize)]
pub struct CallResource {
    pub sid: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    more_info: Option<String>,
}

#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("account_sid", &self.account_sid)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TwilioClient {
    pub fn new(
        http: reqwest::Client,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.base_url, self.account_sid
        )
    }

    pub async fn create_call(&self, call: &CreateCall) -> TwilioResult<CallResource> {
        tracing::debug!(to = %call.to, "Creating Twilio call");

        let response = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&call.form())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let parsed: Option<ApiErrorBody> = serde_json::from_str(&body).ok();
            let (code, message, more_info) = match parsed {
                Some(b) => (b.code, b.message, b.more_info),
                None => (None, None, None),
            };
            let error = TwilioError::Api {
                status: status.as_u16(),
                code,
                message: message.unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
                more_info,
            };
            tracing::error!(status = %status, ?code, "Twilio rejected call creation");
            return Err(error);
        }

        let call: CallResource = serde_json::from_str(&body)
            .map_err(|e| TwilioError::InvalidResponse(e.to_string()))?;
        tracing::info!(call_sid = %call.sid, "Call initiated");
        Ok(call)
    }
}
