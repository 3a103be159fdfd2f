//! Generation job state.
//!
//! Two status vocabularies exist: the UI-facing [`JobStatus`] that the
//! job list renders, and the raw [`BackendStatus`] strings that the
//! remote job API reports. [`JobStatus::from_backend`] is the only place
//! the two meet.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum prompt length accepted before a request is sent.
pub const MAX_PROMPT_LEN: usize = 4000;

/// Maximum number of outputs a single generation may ask for.
pub const MAX_OUTPUTS: u8 = 4;

/// Aspect ratios the generation backend understands.
pub const VALID_ASPECT_RATIOS: &[&str] = &["1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3"];

// ---------------------------------------------------------------------------
// Status vocabularies
// ---------------------------------------------------------------------------

/// UI-facing job status.
///
/// `Loading` and `Processing` are in flight; `Done` and `Failed` are
/// terminal and a job reaches one of them exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Loading,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    /// Whether a job in this status still needs polling.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Loading | Self::Processing)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_in_flight()
    }

    pub fn from_backend(status: BackendStatus) -> Self {
        match status {
            BackendStatus::Pending => Self::Loading,
            BackendStatus::Processing => Self::Processing,
            BackendStatus::Completed => Self::Done,
            BackendStatus::Failed => Self::Failed,
        }
    }
}

/// Raw status reported by the remote job API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BackendStatus {
    /// Parse a wire status string, case-insensitively.
    ///
    /// Accepts the canonical `PENDING | PROCESSING | COMPLETED | FAILED`
    /// plus the aliases older backend revisions emit. Returns `None` for
    /// anything unrecognised; callers treat that as "no update".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "QUEUED" | "CREATED" => Some(Self::Pending),
            "PROCESSING" | "IN_PROGRESS" | "RUNNING" | "STARTED" => Some(Self::Processing),
            "COMPLETED" | "COMPLETE" | "SUCCEEDED" | "SUCCESS" | "DONE" => Some(Self::Completed),
            "FAILED" | "FAILURE" | "ERROR" | "CANCELLED" | "CANCELED" => Some(Self::Failed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Generation request
// ---------------------------------------------------------------------------

/// What kind of asset a generation produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

/// Parameters sent to the backend when creating a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    #[serde(default)]
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Source image for image-to-video generations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_outputs: Option<u8>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            kind: MediaKind::Image,
            aspect_ratio: None,
            negative_prompt: None,
            image_url: None,
            num_outputs: None,
        }
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(aspect_ratio.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_num_outputs(mut self, n: u8) -> Self {
        self.num_outputs = Some(n);
        self
    }

    /// Validate the request before it leaves the client.
    ///
    /// Rules:
    /// - Prompt must not be blank and must not exceed `MAX_PROMPT_LEN` characters.
    /// - Model must not be blank.
    /// - Aspect ratio, when set, must be one of `VALID_ASPECT_RATIOS`.
    /// - `num_outputs`, when set, must be in `1..=MAX_OUTPUTS`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation(
                "Prompt must not be empty".to_string(),
            ));
        }
        if self.prompt.chars().count() > MAX_PROMPT_LEN {
            return Err(CoreError::Validation(format!(
                "Prompt must not exceed {MAX_PROMPT_LEN} characters"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(CoreError::Validation(
                "Model must not be empty".to_string(),
            ));
        }
        if let Some(ratio) = &self.aspect_ratio {
            if !VALID_ASPECT_RATIOS.contains(&ratio.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Unsupported aspect ratio \"{ratio}\""
                )));
            }
        }
        if let Some(n) = self.num_outputs {
            if n == 0 || n > MAX_OUTPUTS {
                return Err(CoreError::Validation(format!(
                    "num_outputs must be between 1 and {MAX_OUTPUTS}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One generation request as the job list sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Canonical result location. Equals `urls[0]` whenever `urls` is non-empty.
    pub url: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    pub aspect_ratio: Option<String>,
    pub prompt: Option<String>,
    pub error: Option<String>,
    pub created_at: Option<Timestamp>,
}

impl Job {
    /// A freshly created job awaiting its first status tick.
    pub fn pending(id: impl Into<JobId>, request: &GenerationRequest) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Loading,
            url: None,
            urls: Vec::new(),
            aspect_ratio: request.aspect_ratio.clone(),
            prompt: Some(request.prompt.clone()),
            error: None,
            created_at: Some(chrono::Utc::now()),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }

    /// Move a `Loading` job to `Processing`. A no-op if already processing.
    pub fn mark_processing(&mut self) -> Result<(), CoreError> {
        self.ensure_in_flight(JobStatus::Processing)?;
        self.status = JobStatus::Processing;
        Ok(())
    }

    /// Transition to `Done` with the given (already normalized) locations.
    ///
    /// When `urls` is non-empty its first element wins over `url`.
    pub fn complete(&mut self, url: Option<String>, urls: Vec<String>) -> Result<(), CoreError> {
        self.ensure_in_flight(JobStatus::Done)?;
        self.url = urls.first().cloned().or(url);
        self.urls = urls;
        self.status = JobStatus::Done;
        Ok(())
    }

    /// Transition to `Failed`.
    pub fn fail(&mut self, error: Option<String>) -> Result<(), CoreError> {
        self.ensure_in_flight(JobStatus::Failed)?;
        self.error = error;
        self.status = JobStatus::Failed;
        Ok(())
    }

    fn ensure_in_flight(&self, to: JobStatus) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
