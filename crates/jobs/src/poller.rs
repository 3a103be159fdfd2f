//! Job polling engine.
//!
//! [`JobPoller`] keeps one timer task per in-flight job. Each task asks the
//! backend for the job's status every `poll_interval` and reports back over
//! an unbounded channel of [`PollUpdate`]s; it never touches the job list
//! itself. Registrations are tagged with a generation number so a tick that
//! finishes after its registration was torn down or replaced is dropped
//! instead of delivered.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lumo_client::JobApi;
use lumo_core::assets::AssetUrls;
use lumo_core::job::{BackendStatus, Job};
use lumo_core::types::JobId;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long [`JobPoller::shutdown`] waits for each task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// Terminal outcome of a polled job.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Completed. URLs are already normalized; `url` is `urls[0]` when
    /// `urls` is non-empty.
    Done { url: Option<String>, urls: Vec<String> },
    Failed { error: Option<String> },
}

/// What a polling task reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum PollUpdate {
    /// The backend started processing the job.
    Progress { job_id: JobId },
    /// The job reached a terminal state and its registration is gone.
    Resolved { job_id: JobId, resolution: Resolution },
}

impl PollUpdate {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Progress { job_id } | Self::Resolved { job_id, .. } => job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

// ---------------------------------------------------------------------------
// JobPoller
// ---------------------------------------------------------------------------

/// Bookkeeping for one polled job.
struct Registration {
    generation: u64,
    /// Child of the engine's master token.
    cancel: CancellationToken,
    task_handle: JoinHandle<()>,
}

/// State shared between the engine and its tasks.
struct Shared {
    api: Arc<dyn JobApi>,
    assets: AssetUrls,
    registrations: Mutex<HashMap<JobId, Registration>>,
    updates: mpsc::UnboundedSender<PollUpdate>,
    /// Master cancellation token, cancelled on shutdown or drop.
    cancel: CancellationToken,
}

/// Polls in-flight jobs until they resolve.
///
/// Dropping the poller cancels every registration.
pub struct JobPoller {
    shared: Arc<Shared>,
    poll_interval: Duration,
    next_generation: AtomicU64,
}

impl JobPoller {
    /// Create an engine and the receiving end of its update channel.
    pub fn new(
        api: Arc<dyn JobApi>,
        assets: AssetUrls,
        poll_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PollUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            api,
            assets,
            registrations: Mutex::new(HashMap::new()),
            updates,
            cancel: CancellationToken::new(),
        });
        let poller = Self {
            shared,
            poll_interval,
            next_generation: AtomicU64::new(1),
        };
        (poller, rx)
    }

    /// Align registrations with a job list.
    ///
    /// Starts polling every in-flight job that has no registration and tears
    /// down registrations whose job is terminal or no longer listed.
    pub async fn reconcile(&self, jobs: &[Job]) {
        let in_flight: HashSet<&str> = jobs
            .iter()
            .filter(|job| job.is_in_flight())
            .map(|job| job.id.as_str())
            .collect();

        let mut registrations = self.shared.registrations.lock().await;

        let orphans: Vec<JobId> = registrations
            .keys()
            .filter(|id| !in_flight.contains(id.as_str()))
            .cloned()
            .collect();
        for job_id in orphans {
            if let Some(registration) = registrations.remove(&job_id) {
                registration.cancel.cancel();
                tracing::debug!(job_id = %job_id, "Stopped polling job");
            }
        }

        if self.shared.cancel.is_cancelled() {
            return;
        }

        for job_id in in_flight {
            if !registrations.contains_key(job_id) {
                let registration = self.spawn_registration(job_id.to_string());
                registrations.insert(job_id.to_string(), registration);
            }
        }
    }

    /// Stop polling one job. Returns whether it was being polled.
    pub async fn stop(&self, job_id: &str) -> bool {
        match self.shared.registrations.lock().await.remove(job_id) {
            Some(registration) => {
                registration.cancel.cancel();
                tracing::debug!(job_id, "Stopped polling job");
                true
            }
            None => false,
        }
    }

    /// Number of jobs currently being polled.
    pub async fn active_count(&self) -> usize {
        self.shared.registrations.lock().await.len()
    }

    pub async fn is_polling(&self, job_id: &str) -> bool {
        self.shared.registrations.lock().await.contains_key(job_id)
    }

    /// Cancel every registration and wait for the tasks to exit.
    ///
    /// Waits up to 5 seconds per task. The poller accepts no new
    /// registrations afterwards.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job poller");
        self.shared.cancel.cancel();

        // Drain before awaiting so a task trying to deliver is not blocked
        // on the lock held here.
        let drained: Vec<(JobId, Registration)> =
            self.shared.registrations.lock().await.drain().collect();

        for (job_id, registration) in drained {
            registration.cancel.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, registration.task_handle).await;
            tracing::debug!(job_id = %job_id, "Polling task stopped");
        }
        tracing::info!("Job poller shut down complete");
    }

    // ---- private helpers ----

    fn spawn_registration(&self, job_id: JobId) -> Registration {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shared.cancel.child_token();

        let shared = Arc::clone(&self.shared);
        let task_cancel = cancel.clone();
        let poll_interval = self.poll_interval;
        let task_job_id = job_id.clone();

        let task_handle = tokio::spawn(async move {
            poll_job(&shared, &task_job_id, generation, poll_interval, &task_cancel).await;
        });

        tracing::debug!(job_id = %job_id, generation, "Started polling job");
        Registration {
            generation,
            cancel,
            task_handle,
        }
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Polling task
// ---------------------------------------------------------------------------

/// One registration's tick loop. Runs until the job resolves or the
/// registration is cancelled.
///
/// Each tick's request is awaited before waiting for the next tick, so
/// ticks of the same job never overlap.
async fn poll_job(
    shared: &Shared,
    job_id: &str,
    generation: u64,
    poll_interval: Duration,
    cancel: &CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut reported_processing = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(payload) = shared.api.get_job_status(job_id).await else {
            tracing::trace!(job_id, "No status this tick");
            continue;
        };

        match payload.status {
            BackendStatus::Pending => {}
            BackendStatus::Processing => {
                if !reported_processing {
                    let update = PollUpdate::Progress {
                        job_id: job_id.to_string(),
                    };
                    if !shared.deliver(job_id, generation, update, false).await {
                        return;
                    }
                    reported_processing = true;
                }
            }
            BackendStatus::Completed => {
                let urls = shared.assets.normalize_all(&payload.image_urls);
                let url = urls
                    .first()
                    .cloned()
                    .or_else(|| shared.assets.normalize(payload.image_url.as_deref()));
                tracing::info!(job_id, url = ?url, "Job completed");

                let update = PollUpdate::Resolved {
                    job_id: job_id.to_string(),
                    resolution: Resolution::Done { url, urls },
                };
                shared.deliver(job_id, generation, update, true).await;
                return;
            }
            BackendStatus::Failed => {
                tracing::info!(job_id, error = ?payload.error, "Job failed");
                let update = PollUpdate::Resolved {
                    job_id: job_id.to_string(),
                    resolution: Resolution::Failed {
                        error: payload.error,
                    },
                };
                shared.deliver(job_id, generation, update, true).await;
                return;
            }
        }
    }
}

impl Shared {
    /// Send `update` if this task's registration is still the current one.
    ///
    /// With `finish`, the registration is removed in the same critical
    /// section. Returns `false` when the result was discarded as stale.
    async fn deliver(
        &self,
        job_id: &str,
        generation: u64,
        update: PollUpdate,
        finish: bool,
    ) -> bool {
        let mut registrations = self.registrations.lock().await;

        let current = registrations
            .get(job_id)
            .is_some_and(|registration| registration.generation == generation);
        if !current || self.cancel.is_cancelled() {
            tracing::debug!(job_id, generation, "Discarding stale poll result");
            return false;
        }

        if finish {
            registrations.remove(job_id);
        }
        // A send error only means the owner stopped listening.
        let _ = self.updates.send(update);
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
