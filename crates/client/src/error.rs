use lumo_core::error::CoreError;
use lumo_core::problem::Problem;

/// Errors from the job API client.
///
/// Only user-actionable operations (job creation, history, credits)
/// return these. Status polling never does; see
/// [`JobApi::get_job_status`](crate::JobApi::get_job_status).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("API error ({status}): {}", .problem.code)]
    Problem {
        /// HTTP status code.
        status: u16,
        /// Decoded (or synthesized) problem document.
        problem: Problem,
    },

    /// Job creation succeeded but no job id could be found in the response.
    #[error("Response did not contain a job id")]
    MissingJobId,

    /// No valid credentials and the refresh attempt failed.
    #[error("Not authenticated")]
    Unauthorized,

    /// A 2xx response whose body could not be understood.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request was rejected locally before being sent.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ClientError {
    /// Express this error as a problem document for the UI mapping table.
    pub fn problem(&self) -> Problem {
        match self {
            ClientError::Problem { problem, .. } => problem.clone(),
            ClientError::Request(e) if e.is_timeout() => {
                Problem::new("UPSTREAM_TIMEOUT").with_message(e.to_string())
            }
            ClientError::Request(e) => Problem::new("NETWORK_ERROR").with_message(e.to_string()),
            ClientError::MissingJobId => Problem::new("MISSING_JOB_ID")
                .with_message("The server accepted the request but returned no job id"),
            ClientError::Unauthorized => Problem::new("UNAUTHORIZED"),
            ClientError::Decode(msg) => Problem::new("DECODE_ERROR").with_message(msg.clone()),
            ClientError::Core(CoreError::Validation(msg)) => {
                Problem::new("VALIDATION_ERROR").with_message(msg.clone())
            }
            ClientError::Core(other) => {
                Problem::new("INTERNAL_ERROR").with_message(other.to_string())
            }
        }
    }

    /// HTTP status for errors that came from a backend response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Problem { status, .. } => Some(*status),
            ClientError::Unauthorized => Some(401),
            _ => None,
        }
    }
}
