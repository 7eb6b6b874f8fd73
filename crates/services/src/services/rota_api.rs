//! Client for the remote rota API. Payloads are validated on the way in and
//! on the way out; reads are retried on transient failures, writes never.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use domain::{
    models::{
        leave::{Leave, LeavePayload},
        rota::{Rota, RotaStatus, UpdateRotaStatus},
        shift::{AssignShift, Shift, ShiftPayload},
        week::{RotaWeek, WeekKey},
    },
    validation::ValidationError,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use utils::response::ApiResponse;
use uuid::Uuid;

use super::config::PlannerConfig;

const API_PREFIX: &str = "api/v1/";
pub const LEAVE_COLLISION: &str = "LEAVE_COLLISION";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RotaApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("not authenticated")]
    Unauthorized,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("overlaps an existing absence: {0}")]
    LeaveCollision(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid api url: {0}")]
    InvalidUrl(String),
}

impl RotaApiError {
    /// Returns true if the error is transient and a read may be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

impl From<ValidationError> for RotaApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Remote operations the planner depends on
#[async_trait]
pub trait RotaApi: Send + Sync {
    /// Unified read: rota, shifts and leaves for one location-week
    async fn fetch_week(&self, key: WeekKey) -> Result<RotaWeek, RotaApiError>;

    async fn create_shift(&self, payload: &ShiftPayload) -> Result<Shift, RotaApiError>;

    async fn update_shift(
        &self,
        shift_id: Uuid,
        payload: &ShiftPayload,
    ) -> Result<Shift, RotaApiError>;

    async fn delete_shift(&self, shift_id: Uuid) -> Result<(), RotaApiError>;

    async fn assign_shift(&self, shift_id: Uuid, body: &AssignShift) -> Result<(), RotaApiError>;

    async fn update_rota_status(
        &self,
        rota_id: Uuid,
        status: RotaStatus,
    ) -> Result<Rota, RotaApiError>;

    async fn create_leave(&self, payload: &LeavePayload) -> Result<Leave, RotaApiError>;
}

/// `RotaApi` over HTTP JSON
#[derive(Debug)]
pub struct HttpRotaApi {
    http: Client,
    base: Url,
    token: Option<SecretString>,
    read_retries: usize,
}

impl HttpRotaApi {
    pub fn new(config: &PlannerConfig) -> Result<Self, RotaApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("rota-planner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RotaApiError::Transport(e.to_string()))?;

        let mut base = config.api_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .and_then(|url| url.join(API_PREFIX))
            .map_err(|e| RotaApiError::InvalidUrl(format!("{}: {}", config.api_url, e)))?;

        Ok(Self {
            http,
            base,
            token: config
                .api_token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_string())),
            read_retries: config.read_retries,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RotaApiError> {
        self.base
            .join(path)
            .map_err(|e| RotaApiError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Send the request and unwrap the response envelope
    async fn execute(&self, request: RequestBuilder) -> Result<Option<Value>, RotaApiError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        };

        let res = request.send().await.map_err(map_reqwest_error)?;
        let status = res.status();
        let body = res.text().await.map_err(map_reqwest_error)?;
        let envelope = serde_json::from_str::<ApiResponse<Value>>(&body).ok();

        if !status.is_success() {
            return Err(error_from_status(status, envelope, body));
        }

        let envelope = envelope.ok_or_else(|| {
            RotaApiError::Malformed(format!(
                "expected a response envelope, got: {}",
                body.chars().take(200).collect::<String>()
            ))
        })?;

        if !envelope.success {
            return Err(error_from_envelope(&envelope).unwrap_or_else(|| {
                RotaApiError::Rejected(
                    envelope
                        .message
                        .clone()
                        .unwrap_or_else(|| "request failed".to_string()),
                )
            }));
        }

        Ok(envelope.data)
    }

    async fn fetch_week_once(&self, key: WeekKey) -> Result<RotaWeek, RotaApiError> {
        let url = self.endpoint("rotas/week")?;
        let request = self.http.get(url).query(&[
            ("location_id", key.location_id.to_string()),
            ("week_start", key.week_start.to_string()),
        ]);
        let week: RotaWeek = decode(self.execute(request).await?, "rota week")?;
        week.validate()
            .map_err(|e| RotaApiError::Malformed(format!("rota week: {e}")))?;
        Ok(week)
    }
}

#[async_trait]
impl RotaApi for HttpRotaApi {
    async fn fetch_week(&self, key: WeekKey) -> Result<RotaWeek, RotaApiError> {
        (move || async move { self.fetch_week_once(key).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(250))
                    .with_max_delay(Duration::from_secs(5))
                    .with_max_times(self.read_retries)
                    .with_jitter(),
            )
            .when(|e: &RotaApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    location_id = %key.location_id,
                    week_start = %key.week_start,
                    "Rota fetch failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }

    async fn create_shift(&self, payload: &ShiftPayload) -> Result<Shift, RotaApiError> {
        payload.validate()?;
        let url = self.endpoint("shifts")?;
        let shift: Shift = decode(
            self.execute(self.http.post(url).json(payload)).await?,
            "created shift",
        )?;
        shift
            .validate()
            .map_err(|e| RotaApiError::Malformed(format!("created shift: {e}")))?;
        debug!(shift_id = %shift.id, "Shift created");
        Ok(shift)
    }

    async fn update_shift(
        &self,
        shift_id: Uuid,
        payload: &ShiftPayload,
    ) -> Result<Shift, RotaApiError> {
        payload.validate()?;
        let url = self.endpoint(&format!("shifts/{shift_id}"))?;
        let shift: Shift = decode(
            self.execute(self.http.put(url).json(payload)).await?,
            "updated shift",
        )?;
        shift
            .validate()
            .map_err(|e| RotaApiError::Malformed(format!("updated shift: {e}")))?;
        Ok(shift)
    }

    async fn delete_shift(&self, shift_id: Uuid) -> Result<(), RotaApiError> {
        let url = self.endpoint(&format!("shifts/{shift_id}"))?;
        self.execute(self.http.delete(url)).await?;
        Ok(())
    }

    async fn assign_shift(&self, shift_id: Uuid, body: &AssignShift) -> Result<(), RotaApiError> {
        let url = self.endpoint(&format!("shifts/{shift_id}/assign"))?;
        self.execute(self.http.post(url).json(body)).await?;
        Ok(())
    }

    async fn update_rota_status(
        &self,
        rota_id: Uuid,
        status: RotaStatus,
    ) -> Result<Rota, RotaApiError> {
        let url = self.endpoint(&format!("rotas/{rota_id}/status"))?;
        let body = UpdateRotaStatus { status };
        decode(
            self.execute(self.http.put(url).json(&body)).await?,
            "rota",
        )
    }

    async fn create_leave(&self, payload: &LeavePayload) -> Result<Leave, RotaApiError> {
        if payload.end_at <= payload.start_at {
            return Err(ValidationError::InvalidInterval { entity: "leave" }.into());
        }
        let url = self.endpoint("leaves")?;
        let leave: Leave = decode(
            self.execute(self.http.post(url).json(payload)).await?,
            "created leave",
        )?;
        leave
            .validate()
            .map_err(|e| RotaApiError::Malformed(format!("created leave: {e}")))?;
        Ok(leave)
    }
}

fn decode<T: DeserializeOwned>(data: Option<Value>, what: &str) -> Result<T, RotaApiError> {
    let value = data.ok_or_else(|| RotaApiError::Malformed(format!("{what}: missing data")))?;
    serde_json::from_value(value).map_err(|e| RotaApiError::Malformed(format!("{what}: {e}")))
}

/// Maps domain error codes carried by a failed envelope
fn error_from_envelope(envelope: &ApiResponse<Value>) -> Option<RotaApiError> {
    let message = envelope
        .message
        .clone()
        .unwrap_or_else(|| "request failed".to_string());
    match envelope.error_code.as_deref() {
        Some(LEAVE_COLLISION) => Some(RotaApiError::LeaveCollision(message)),
        _ => None,
    }
}

fn error_from_status(
    status: StatusCode,
    envelope: Option<ApiResponse<Value>>,
    body: String,
) -> RotaApiError {
    if let Some(err) = envelope.as_ref().and_then(error_from_envelope) {
        return err;
    }
    let message = envelope
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.clone());
    match status {
        StatusCode::UNAUTHORIZED => RotaApiError::Unauthorized,
        StatusCode::FORBIDDEN => RotaApiError::PermissionDenied(message),
        StatusCode::NOT_FOUND => RotaApiError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            RotaApiError::Validation(message)
        }
        s => RotaApiError::Http {
            status: s.as_u16(),
            body,
        },
    }
}

fn map_reqwest_error(e: reqwest::Error) -> RotaApiError {
    if e.is_timeout() {
        RotaApiError::Timeout
    } else {
        RotaApiError::Transport(e.to_string())
    }
}
