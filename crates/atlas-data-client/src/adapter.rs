use crate::config::DataApiConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tracing::warn;

pub const DATA_API_ACTION_PATH: &str = "endpoint/data/v1/action";
pub const API_KEY_HEADER: &str = "api-key";

/// Data API actions used by the collection client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataApiAction {
    FindOne,
    Find,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    InsertOne,
    InsertMany,
}

impl DataApiAction {
    pub const ALL: [DataApiAction; 8] = [
        DataApiAction::FindOne,
        DataApiAction::Find,
        DataApiAction::UpdateOne,
        DataApiAction::UpdateMany,
        DataApiAction::DeleteOne,
        DataApiAction::DeleteMany,
        DataApiAction::InsertOne,
        DataApiAction::InsertMany,
    ];

    /// Path segment of the action endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            DataApiAction::FindOne => "findOne",
            DataApiAction::Find => "find",
            DataApiAction::UpdateOne => "updateOne",
            DataApiAction::UpdateMany => "updateMany",
            DataApiAction::DeleteOne => "deleteOne",
            DataApiAction::DeleteMany => "deleteMany",
            DataApiAction::InsertOne => "insertOne",
            DataApiAction::InsertMany => "insertMany",
        }
    }
}

impl fmt::Display for DataApiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DataApiError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("endpoint not found: {0}")]
    NotFound(String),
    #[error("remote error (status {status}): {message}")]
    Remote { status: u16, message: String },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl DataApiError {
    /// Whether repeating the same request could plausibly succeed.
    ///
    /// The client never retries on its own; this is for callers that do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Remote { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type DataApiResult<T> = Result<T, DataApiError>;

/// Request/response primitive the collection client is built on.
#[async_trait]
pub trait DataApiTransport: Send + Sync {
    /// Posts `body` to the endpoint of `action` and returns the parsed JSON response.
    async fn send(&self, action: DataApiAction, body: Value) -> DataApiResult<Value>;
}

#[async_trait]
impl<T> DataApiTransport for std::sync::Arc<T>
where
    T: DataApiTransport + ?Sized,
{
    async fn send(&self, action: DataApiAction, body: Value) -> DataApiResult<Value> {
        (**self).send(action, body).await
    }
}

#[derive(Clone)]
pub struct ReqwestDataApiTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for ReqwestDataApiTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestDataApiTransport")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ReqwestDataApiTransport {
    pub fn new(config: &DataApiConfig) -> DataApiResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|err| {
            DataApiError::Configuration(format!("http client build failed: {err}"))
        })?;
        Ok(Self::with_client(client, config))
    }

    /// Shares an existing connection pool.
    pub fn with_client(client: reqwest::Client, config: &DataApiConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim().to_string(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn endpoint(&self, action: DataApiAction) -> String {
        action_endpoint(&self.base_url, action)
    }
}

#[async_trait]
impl DataApiTransport for ReqwestDataApiTransport {
    async fn send(&self, action: DataApiAction, body: Value) -> DataApiResult<Value> {
        let payload = serde_json::to_vec(&body).map_err(|err| {
            DataApiError::Serialization(format!("{action} request encode failed: {err}"))
        })?;

        let response = self
            .client
            .post(self.endpoint(action))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .body(payload)
            .send()
            .await
            .map_err(|err| DataApiError::Transport(format!("http post {action} failed: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| DataApiError::Transport(format!("http read body failed: {err}")))?;

        if !status.is_success() {
            warn!(%action, status = status.as_u16(), "data api request rejected");
            return Err(map_http_status(status, &text));
        }
        parse_response_body(status, &text)
    }
}

pub fn action_endpoint(base_url: &str, action: DataApiAction) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim().trim_end_matches('/'),
        DATA_API_ACTION_PATH,
        action.as_str()
    )
}

fn map_http_status(status: reqwest::StatusCode, body: &str) -> DataApiError {
    let message = error_message(body);
    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            DataApiError::Unauthorized(message)
        }
        reqwest::StatusCode::NOT_FOUND => DataApiError::NotFound(message),
        reqwest::StatusCode::BAD_REQUEST | reqwest::StatusCode::UNPROCESSABLE_ENTITY => {
            DataApiError::InvalidInput(message)
        }
        _ => DataApiError::Remote {
            status: status.as_u16(),
            message,
        },
    }
}

fn parse_response_body(status: reqwest::StatusCode, text: &str) -> DataApiResult<Value> {
    let payload: Value = serde_json::from_str(text).map_err(|err| {
        DataApiError::UnexpectedResponse(format!("http json decode failed: {err}"))
    })?;
    if payload.get("error").is_some_and(|error| !error.is_null()) {
        warn!(status = status.as_u16(), "data api reported an error payload");
        return Err(DataApiError::Remote {
            status: status.as_u16(),
            message: error_message(text),
        });
    }
    Ok(payload)
}

/// Condenses a Data API error body (`{"error": ..., "error_code": ...}`) into one line.
fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    let Ok(payload) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };
    let error = payload.get("error").and_then(Value::as_str);
    let code = payload.get("error_code").and_then(Value::as_str);
    match (code, error) {
        (Some(code), Some(error)) => format!("{code}: {error}"),
        (None, Some(error)) => error.to_string(),
        _ => trimmed.to_string(),
    }
}
