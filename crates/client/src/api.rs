//! REST client for the generation backend.
//!
//! [`JobApi`] is the seam the polling engine and coordinator depend on;
//! [`ApiClient`] is its [`reqwest`] implementation. Every request carries
//! the session's bearer token and an `x-request-id` header. A 401 triggers
//! one token refresh (shared by all concurrent callers) and one retry.

use std::sync::Arc;

use async_trait::async_trait;
use lumo_core::error::CoreError;
use lumo_core::job::GenerationRequest;
use lumo_core::types::JobId;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::Session;
use crate::wire::{self, CreditBalance, HistoryEntry, JobStatusPayload};

/// Header carrying the client-generated request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Backend operations the job engine needs.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Submit a generation request and return the backend-assigned job id.
    async fn create_job(&self, request: &GenerationRequest) -> Result<JobId, ClientError>;

    /// Current status of a job, or `None` when it could not be determined.
    ///
    /// Never fails: transport errors, non-2xx responses, undecodable
    /// bodies and unknown statuses all yield `None`, and the caller simply
    /// tries again on its next tick.
    async fn get_job_status(&self, job_id: &str) -> Option<JobStatusPayload>;

    /// The user's persisted jobs, newest first.
    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, ClientError>;
}

/// HTTP client for the backend job API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    api_url: String,
    session: Arc<Session>,
}

impl ApiClient {
    /// Build a client with the configured timeout and a cookie store for
    /// the refresh cookie.
    pub fn new(config: &ClientConfig, session: Arc<Session>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .cookie_store(true)
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone(), session))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String, session: Arc<Session>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Current credit balance (`GET /credits`).
    pub async fn fetch_credits(&self) -> Result<CreditBalance, ClientError> {
        let response = self.send(Method::GET, "/credits", None).await?;
        let body = Self::parse_json(response).await?;
        wire::decode_credits(&body)
            .ok_or_else(|| ClientError::Decode("credits body has no balance".into()))
    }

    // ---- private helpers ----

    /// Send a request with session credentials, refreshing once on 401.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{}", self.api_url, path);
        let token = self.session.access_token().await;

        let response = self.dispatch(&method, &url, body, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(%url, "Request unauthorized, refreshing access token");
        if !self.refresh(token.as_deref()).await {
            return Err(ClientError::Unauthorized);
        }

        let token = self.session.access_token().await;
        let response = self.dispatch(&method, &url, body, token.as_deref()).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.session.clear().await;
            return Err(ClientError::Unauthorized);
        }
        Ok(response)
    }

    async fn dispatch(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(REQUEST_ID_HEADER, uuid::Uuid::new_v4().to_string());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Obtain a new access token. Returns `true` when a usable token is in
    /// the session afterwards.
    ///
    /// Callers that waited on the guard while another caller refreshed see
    /// a token different from the one they had rejected and skip the call.
    /// Once the backend has refused a refresh, no further refresh is tried
    /// until the session gets a new token.
    async fn refresh(&self, rejected: Option<&str>) -> bool {
        let _guard = self.session.refresh_guard().await;

        let current = self.session.access_token().await;
        if current.is_some() && current.as_deref() != rejected {
            return true;
        }
        if current.is_none() && self.session.refresh_refused() {
            tracing::debug!("Refresh already refused, not retrying");
            return false;
        }

        let url = format!("{}/auth/refresh", self.api_url);
        let result = self
            .client
            .post(&url)
            .header(REQUEST_ID_HEADER, uuid::Uuid::new_v4().to_string())
            .send()
            .await;

        let token = match result {
            Ok(response) if response.status().is_success() => response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| wire::decode_access_token(&body)),
            Ok(response) => {
                tracing::info!(status = response.status().as_u16(), "Token refresh rejected");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh request failed");
                None
            }
        };

        match token {
            Some(token) => {
                self.session.set_access_token(token).await;
                tracing::debug!("Access token refreshed");
                true
            }
            None => {
                self.session.refuse_refresh().await;
                false
            }
        }
    }

    /// Return the response unchanged on success, or a
    /// [`ClientError::Problem`] decoded from the body on failure.
    ///
    /// The request id echoed by the backend becomes the problem's trace id
    /// when the body carries none.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        let mut problem = wire::decode_problem(status.as_u16(), &body);
        if problem.trace_id.is_none() {
            problem.trace_id = request_id;
        }
        Err(ClientError::Problem {
            status: status.as_u16(),
            problem,
        })
    }

    async fn parse_json(response: reqwest::Response) -> Result<Value, ClientError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl JobApi for ApiClient {
    async fn create_job(&self, request: &GenerationRequest) -> Result<JobId, ClientError> {
        request.validate()?;

        let body = serde_json::to_value(request)
            .map_err(|e| ClientError::Core(CoreError::Internal(e.to_string())))?;
        let response = self.send(Method::POST, "/jobs", Some(&body)).await?;
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;

        let job_id = match serde_json::from_str::<Value>(&text) {
            Ok(value) => wire::extract_job_id(&value),
            Err(_) => wire::bare_text_job_id(&text),
        }
        .ok_or(ClientError::MissingJobId)?;

        tracing::info!(job_id = %job_id, model = %request.model, "Generation job created");
        Ok(job_id)
    }

    async fn get_job_status(&self, job_id: &str) -> Option<JobStatusPayload> {
        let path = format!("/jobs/{job_id}");
        let response = match self.send(Method::GET, &path, None).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(job_id, error = %e, "Status request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(job_id, status = response.status().as_u16(), "Status request rejected");
            return None;
        }

        match response.json::<Value>().await {
            Ok(body) => wire::decode_status(&body),
            Err(e) => {
                tracing::debug!(job_id, error = %e, "Status body was not JSON");
                None
            }
        }
    }

    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        let response = self.send(Method::GET, "/history", None).await?;
        let body = Self::parse_json(response).await?;
        let entries = wire::decode_history(&body).map_err(ClientError::Decode)?;
        tracing::debug!(count = entries.len(), "History fetched");
        Ok(entries)
    }
}
