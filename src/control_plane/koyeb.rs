//! Client for the Koyeb REST API.
//!
//! Only two calls are made: reading the worker service's status and
//! triggering a redeploy. Missing credentials are a configuration error and
//! are never retried; upstream non-success statuses are passed through.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::config::ControlPlaneConfig;
use crate::error::ConsoleError;

/// Deployment facts about the worker service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceStatus {
    /// Service status (e.g. `HEALTHY`).
    pub status: Option<String>,
    /// Latest deployment id.
    pub deployment_id: Option<String>,
    /// Instance type.
    pub instance_type: Option<String>,
    /// Region.
    pub region: Option<String>,
    /// Build duration, as reported.
    pub build_time: Option<String>,
    /// Timestamp of the last deployment.
    pub last_deploy: Option<String>,
}

impl ServiceStatus {
    /// Maps a `GET /services/{id}` body. Unknown or missing fields stay
    /// `None`.
    #[must_use]
    pub fn from_api(body: &Value) -> Self {
        Self {
            status: first_text(body, &["/service/status", "/status"]),
            deployment_id: first_text(
                body,
                &[
                    "/service/latest_deployment_id",
                    "/service/active_deployment_id",
                    "/deployment_id",
                ],
            ),
            instance_type: first_text(
                body,
                &[
                    "/service/instance_type",
                    "/service/definition/instance_types/0/type",
                    "/instance_type",
                ],
            ),
            region: first_text(body, &["/service/regions/0", "/service/region", "/region"]),
            build_time: first_text(body, &["/service/build_time", "/build_time"]),
            last_deploy: first_text(
                body,
                &["/service/last_provisioned_deployment_at", "/service/updated_at", "/last_deploy"],
            ),
        }
    }
}

/// Result of a redeploy request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RedeployOutcome {
    /// Always `true` when returned; failures are errors.
    pub success: bool,
    /// Upstream response body.
    #[schema(value_type = Object)]
    pub data: Value,
}

/// Koyeb API client.
#[derive(Debug, Clone)]
pub struct KoyebClient {
    http: reqwest::Client,
    config: ControlPlaneConfig,
}

impl KoyebClient {
    /// Creates a client. Credentials are checked per call.
    #[must_use]
    pub fn new(config: ControlPlaneConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Whether both token and service id are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.credentials().is_ok()
    }

    fn credentials(&self) -> Result<(&str, &str), ConsoleError> {
        match (&self.config.api_token, &self.config.service_id) {
            (Some(token), Some(service)) => Ok((token, service)),
            _ => Err(ConsoleError::Configuration(
                "KOYEB_API_TOKEN and KOYEB_SERVICE_ID must be set".to_string(),
            )),
        }
    }

    fn service_url(&self, service: &str, suffix: &str) -> String {
        format!(
            "{}/services/{service}{suffix}",
            self.config.api_base.trim_end_matches('/')
        )
    }

    /// Fetches the service's deployment status.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::Configuration`] without credentials,
    /// [`ConsoleError::ControlPlane`] on a non-success status, and
    /// [`ConsoleError::ControlPlaneUnreachable`] on transport failure.
    pub async fn status(&self) -> Result<ServiceStatus, ConsoleError> {
        let (token, service) = self.credentials()?;
        let response = self
            .http
            .get(self.service_url(service, ""))
            .bearer_auth(token)
            .send()
            .await
            .map_err(unreachable)?;
        let body = read_success(response).await?;
        Ok(ServiceStatus::from_api(&body))
    }

    /// Triggers a redeploy of the service.
    ///
    /// # Errors
    ///
    /// Same as [`KoyebClient::status`].
    pub async fn redeploy(&self) -> Result<RedeployOutcome, ConsoleError> {
        let (token, service) = self.credentials()?;
        tracing::info!(service, "requesting redeploy");
        let response = self
            .http
            .post(self.service_url(service, "/redeploy"))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(unreachable)?;
        let data = read_success(response).await?;
        Ok(RedeployOutcome {
            success: true,
            data,
        })
    }
}

async fn read_success(response: reqwest::Response) -> Result<Value, ConsoleError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "control plane rejected request");
        return Err(ConsoleError::ControlPlane {
            status: status.as_u16(),
            message,
        });
    }
    let text = response.text().await.map_err(unreachable)?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| ConsoleError::ControlPlaneUnreachable(format!("malformed response: {e}")))
}

fn unreachable(err: reqwest::Error) -> ConsoleError {
    tracing::warn!(error = %err, "control plane unreachable");
    ConsoleError::ControlPlaneUnreachable(err.to_string())
}

fn first_text(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match body.pointer(p)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}
