//! Scripted [`JobApi`] stand-in for engine and coordinator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lumo_client::wire::{HistoryEntry, JobStatusPayload};
use lumo_client::{ClientError, JobApi};
use lumo_core::job::{BackendStatus, GenerationRequest};
use lumo_core::problem::Problem;
use lumo_core::types::JobId;

/// Returns scripted statuses per job id, in order, then `None` forever.
#[derive(Default)]
pub struct FakeApi {
    statuses: Mutex<HashMap<JobId, VecDeque<Option<JobStatusPayload>>>>,
    calls: Mutex<HashMap<JobId, usize>>,
    history: Mutex<Vec<HistoryEntry>>,
    history_fails: AtomicBool,
    history_calls: AtomicUsize,
    created: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeApi {
    /// Every status request takes `delay` to answer.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn script(&self, job_id: &str, statuses: Vec<Option<JobStatusPayload>>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.to_string(), statuses.into());
    }

    pub fn set_history(&self, entries: Vec<HistoryEntry>) {
        *self.history.lock().unwrap() = entries;
    }

    pub fn fail_history(&self) {
        self.history_fails.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self, job_id: &str) -> usize {
        self.calls.lock().unwrap().get(job_id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobApi for FakeApi {
    async fn create_job(&self, request: &GenerationRequest) -> Result<JobId, ClientError> {
        request.validate()?;
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("job-{n}"))
    }

    async fn get_job_status(&self, job_id: &str) -> Option<JobStatusPayload> {
        *self.calls.lock().unwrap().entry(job_id.to_string()).or_default() += 1;
        let next = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(VecDeque::pop_front)
            .flatten();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next
    }

    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if self.history_fails.load(Ordering::SeqCst) {
            return Err(ClientError::Problem {
                status: 502,
                problem: Problem::new("UPSTREAM_ERROR"),
            });
        }
        Ok(self.history.lock().unwrap().clone())
    }
}

pub fn completed(image_url: Option<&str>, image_urls: &[&str]) -> JobStatusPayload {
    JobStatusPayload {
        status: BackendStatus::Completed,
        image_url: image_url.map(str::to_string),
        image_urls: image_urls.iter().map(|u| u.to_string()).collect(),
        error: None,
    }
}

pub fn failed(error: &str) -> JobStatusPayload {
    JobStatusPayload {
        status: BackendStatus::Failed,
        image_url: None,
        image_urls: Vec::new(),
        error: Some(error.to_string()),
    }
}

pub fn processing() -> JobStatusPayload {
    JobStatusPayload {
        status: BackendStatus::Processing,
        image_url: None,
        image_urls: Vec::new(),
        error: None,
    }
}

/// A completed history record.
pub fn history_entry(id: &str, image_url: &str, created_at: &str) -> HistoryEntry {
    history_entry_with_status(id, image_url, created_at, "COMPLETED")
}

pub fn history_entry_with_status(
    id: &str,
    image_url: &str,
    created_at: &str,
    status: &str,
) -> HistoryEntry {
    HistoryEntry::from_value(&serde_json::json!({
        "id": id,
        "status": status,
        "imageUrl": image_url,
        "createdAt": created_at,
    }))
    .unwrap()
}
