//! Outbound calls and Twilio status callbacks.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::ConfigError;
use crate::errors::{AppError, AppResult};
use crate::handlers::extract::ApiJson;
use crate::state::AppState;
use crate::telephony::{
    CALLBACK_STATUS_EVENTS, CallInstructions, CreateCall, PROVIDER_CALL_STATUS_EVENTS,
    provider_call_document, validate_phone_number,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(default)]
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub success: bool,
    pub call_sid: String,
}

/// `POST /callback`: call `phoneNumber` and let `/voice` drive the call.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CallRequest>,
) -> AppResult<Json<CallResponse>> {
    tracing::info!(phone_number = %request.phone_number, "Callback request");
    let to = validate_phone_number(&request.phone_number).map_err(AppError::BadRequest)?;

    let twilio = state.twilio()?;
    let from = state.config.twilio_credentials()?.phone_number;
    let base_url = state.config.public_base_url()?;

    let call = CreateCall::new(to, from, CallInstructions::Url(format!("{base_url}/voice")))
        .status_callback(format!("{base_url}/call-status"), CALLBACK_STATUS_EVENTS);

    let call = twilio.create_call(&call).await?;
    Ok(Json(CallResponse {
        success: true,
        call_sid: call.sid,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCallRequest {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub session_token: String,
}

/// `POST /api/twilio/call`: call `phoneNumber` and stream it straight to the
/// provider with a browser-issued session token. The call is recorded.
pub async fn provider_call(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ProviderCallRequest>,
) -> AppResult<Json<Value>> {
    if request.phone_number.trim().is_empty() || request.session_token.trim().is_empty() {
        return Err(AppError::bad_request(
            "Phone number and session token are required",
        ));
    }
    let to = validate_phone_number(&request.phone_number).map_err(AppError::BadRequest)?;

    let twilio = state.twilio()?;
    let from = state.config.twilio_credentials()?.phone_number;
    let base_url = state.config.public_base_url()?;

    let twiml = provider_call_document(
        &state.config.openai_realtime_url,
        &state.config.realtime_model,
        &request.session_token,
    )
    .map_err(|_| ConfigError::InvalidValue {
        key: "OPENAI_REALTIME_URL",
        value: state.config.openai_realtime_url.clone(),
    })?;

    let call = CreateCall::new(to, from, CallInstructions::Twiml(twiml))
        .status_callback(
            format!("{base_url}/api/twilio/status"),
            PROVIDER_CALL_STATUS_EVENTS,
        )
        .record(true);

    let call = twilio.create_call(&call).await?;
    Ok(Json(json!({ "callSid": call.sid })))
}

/// Fields of a Twilio status callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallStatusUpdate {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
    #[serde(rename = "CallDuration", default)]
    pub call_duration: Option<String>,
    #[serde(rename = "Direction", default)]
    pub direction: Option<String>,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
}

impl CallStatusUpdate {
    /// Parse a callback body sent as JSON or as a urlencoded form.
    fn parse(headers: &HeaderMap, body: &[u8]) -> Self {
        let is_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            return serde_json::from_slice(body).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Unparsable JSON status callback");
                Self::default()
            });
        }

        let fields: HashMap<String, String> = url::form_urlencoded::parse(body).into_owned().collect();
        let get = |key: &str| fields.get(key).cloned();
        Self {
            call_sid: get("CallSid"),
            call_status: get("CallStatus"),
            call_duration: get("CallDuration"),
            direction: get("Direction"),
            from: get("From"),
            to: get("To"),
        }
    }
}

/// `POST /call-status` and `POST /api/twilio/status`
pub async fn call_status(headers: HeaderMap, body: Bytes) -> Json<Value> {
    let update = CallStatusUpdate::parse(&headers, &body);
    tracing::info!(
        call_sid = ?update.call_sid,
        status = ?update.call_status,
        duration = ?update.call_duration,
        direction = ?update.direction,
        "Call status update"
    );
    Json(json!({ "success": true }))
}
