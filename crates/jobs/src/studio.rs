//! Coordinator wiring job creation, polling and the job list together.
//!
//! [`Studio`] creates jobs through the [`JobApi`], lists them on the
//! [`JobBoard`], keeps the [`JobPoller`] aligned with the board, and applies
//! poll updates as they arrive. Completions optionally trigger a history
//! refetch and always announce a credit change on the [`EventBus`].

use std::sync::Arc;

use lumo_client::{ClientConfig, ClientError, JobApi};
use lumo_core::job::{GenerationRequest, Job, JobStatus};
use lumo_core::types::JobId;
use lumo_events::{EventBus, StudioEvent};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::board::JobBoard;
use crate::poller::{JobPoller, PollUpdate};

pub struct Studio {
    api: Arc<dyn JobApi>,
    poller: JobPoller,
    updates: Mutex<mpsc::UnboundedReceiver<PollUpdate>>,
    board: RwLock<JobBoard>,
    events: Arc<EventBus>,
    refresh_history_on_complete: bool,
}

impl Studio {
    pub fn new(api: Arc<dyn JobApi>, events: Arc<EventBus>, config: &ClientConfig) -> Self {
        let assets = config.asset_urls();
        let (poller, updates) =
            JobPoller::new(Arc::clone(&api), assets.clone(), config.poll_interval);
        Self {
            api,
            poller,
            updates: Mutex::new(updates),
            board: RwLock::new(JobBoard::new(config.max_jobs, assets)),
            events,
            refresh_history_on_complete: config.refresh_history_on_complete,
        }
    }

    /// Create a job, list it as `loading`, and start polling it.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<JobId, ClientError> {
        let job_id = self.api.create_job(request).await?;

        // The board guard is held across `reconcile` so a concurrent change
        // can never be reconciled against an older list.
        let mut board = self.board.write().await;
        board.push_created(Job::pending(job_id.clone(), request));
        self.poller.reconcile(board.jobs()).await;

        Ok(job_id)
    }

    /// Replace the job list with backend history and re-align polling.
    ///
    /// Jobs that history reports as finished before their own poll did are
    /// announced here, exactly as a poll result would have announced them.
    pub async fn load_history(&self) -> Result<usize, ClientError> {
        let entries = self.api.fetch_history().await?;

        let merge = {
            let mut board = self.board.write().await;
            let merge = board.load_history(entries);
            self.poller.reconcile(board.jobs()).await;
            merge
        };

        for job in &merge.resolved {
            tracing::info!(job_id = %job.id, status = ?job.status, "Job resolved by history");
            match job.status {
                JobStatus::Failed => self.announce_failure(job),
                _ => {
                    self.announce_completion(job);
                    self.events.publish(StudioEvent::credits_changed());
                }
            }
        }

        let count = merge.count;
        tracing::info!(count, "Job history loaded");
        self.events.publish(StudioEvent::HistoryReloaded { count });
        Ok(count)
    }

    /// Apply one poll update to the board and react to terminal outcomes.
    ///
    /// Returns the updated job, or `None` when the update was ignored.
    pub async fn handle_update(&self, update: PollUpdate) -> Option<Job> {
        let job = self.board.write().await.apply_update(&update)?;

        match job.status {
            JobStatus::Done => {
                self.announce_completion(&job);
                if self.refresh_history_on_complete {
                    if let Err(e) = self.load_history().await {
                        tracing::warn!(job_id = %job.id, error = %e, "History refetch failed");
                    }
                }
                self.events.publish(StudioEvent::credits_changed());
            }
            JobStatus::Failed => self.announce_failure(&job),
            JobStatus::Loading | JobStatus::Processing => {}
        }

        let board = self.board.read().await;
        self.poller.reconcile(board.jobs()).await;
        Some(job)
    }

    fn announce_completion(&self, job: &Job) {
        self.events.publish(StudioEvent::JobCompleted {
            job_id: job.id.clone(),
            url: job.url.clone(),
        });
    }

    fn announce_failure(&self, job: &Job) {
        self.events.publish(StudioEvent::JobFailed {
            job_id: job.id.clone(),
            error: job.error.clone(),
        });
    }

    /// Process updates until the given job is terminal.
    ///
    /// Returns the terminal job, or `None` if the job is not listed or the
    /// update stream ends first.
    pub async fn wait_for(&self, job_id: &str) -> Option<Job> {
        let mut updates = self.updates.lock().await;
        loop {
            {
                let board = self.board.read().await;
                match board.get(job_id) {
                    Some(job) if !job.is_in_flight() => return Some(job.clone()),
                    Some(_) => {}
                    None => return None,
                }
            }
            let update = updates.recv().await?;
            self.handle_update(update).await;
        }
    }

    /// Process updates until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut updates = self.updates.lock().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                update = updates.recv() => match update {
                    Some(update) => {
                        self.handle_update(update).await;
                    }
                    None => break,
                },
            }
        }
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.board.read().await.jobs().to_vec()
    }

    pub async fn selected(&self) -> Option<Job> {
        self.board.read().await.selected().cloned()
    }

    pub async fn select(&self, job_id: &str) -> bool {
        self.board.write().await.select(job_id)
    }

    pub fn poller(&self) -> &JobPoller {
        &self.poller
    }

    /// Stop all polling. Pending updates are dropped.
    pub async fn shutdown(&self) {
        self.poller.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::test_support::{completed, failed, history_entry, FakeApi};

    fn config(refresh: bool) -> ClientConfig {
        ClientConfig {
            asset_base_url: Some("https://cdn.x".into()),
            poll_interval: Duration::from_secs(3),
            refresh_history_on_complete: refresh,
            ..ClientConfig::default()
        }
    }

    fn studio(api: &Arc<FakeApi>, refresh: bool) -> (Studio, broadcast::Receiver<StudioEvent>) {
        let events = Arc::new(EventBus::default());
        let rx = events.subscribe();
        (Studio::new(api.clone(), events, &config(refresh)), rx)
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("a red fox", "flux-dev")
    }

    fn drain(rx: &mut broadcast::Receiver<StudioEvent>) -> Vec<StudioEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn submit_lists_loading_job_and_polls_it() {
        let api = Arc::new(FakeApi::default());
        let (studio, _rx) = studio(&api, false);

        let id = studio.submit(&request()).await.unwrap();

        let selected = studio.selected().await.unwrap();
        assert_eq!(selected.id, id);
        assert_eq!(selected.status, JobStatus::Loading);
        assert!(studio.poller().is_polling(&id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_request_lists_nothing() {
        let api = Arc::new(FakeApi::default());
        let (studio, _rx) = studio(&api, false);

        let err = studio.submit(&GenerationRequest::new("", "m")).await.unwrap_err();
        assert_eq!(err.problem().code, "VALIDATION_ERROR");
        assert!(studio.jobs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn completion_updates_job_and_announces_credits_once() {
        let api = Arc::new(FakeApi::default());
        api.script("job-1", vec![None, None, Some(completed(Some("/out/1.png"), &[]))]);
        let (studio, mut rx) = studio(&api, false);

        let id = studio.submit(&request()).await.unwrap();
        let job = studio.wait_for(&id).await.unwrap();

        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.url.as_deref(), Some("https://cdn.x/out/1.png"));

        let names: Vec<&str> = drain(&mut rx).iter().map(StudioEvent::name).collect();
        assert_eq!(names, vec!["job.completed", "credits.changed"]);
        assert_eq!(studio.poller().active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_history_refetch_keeps_job_done() {
        let api = Arc::new(FakeApi::default());
        api.script("job-1", vec![Some(completed(Some("a.png"), &[]))]);
        api.fail_history();
        let (studio, mut rx) = studio(&api, true);

        let id = studio.submit(&request()).await.unwrap();
        let job = studio.wait_for(&id).await.unwrap();

        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(api.history_calls(), 1);
        let credits = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, StudioEvent::CreditsChanged { .. }))
            .count();
        assert_eq!(credits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn history_refetch_merges_backend_records() {
        let api = Arc::new(FakeApi::default());
        api.script("job-1", vec![Some(completed(Some("a.png"), &[]))]);
        api.set_history(vec![history_entry("old", "o.png", "2024-01-01T00:00:00Z")]);
        let (studio, mut rx) = studio(&api, true);

        let id = studio.submit(&request()).await.unwrap();
        studio.wait_for(&id).await.unwrap();

        let ids: Vec<String> = studio.jobs().await.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![id.clone(), "old".to_string()]);

        let names: Vec<&str> = drain(&mut rx).iter().map(StudioEvent::name).collect();
        assert_eq!(names, vec!["job.completed", "history.reloaded", "credits.changed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_surfaces_in_place_without_credit_event() {
        let api = Arc::new(FakeApi::default());
        api.script("job-1", vec![Some(failed("upstream timeout"))]);
        let (studio, mut rx) = studio(&api, true);

        let id = studio.submit(&request()).await.unwrap();
        let job = studio.wait_for(&id).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("upstream timeout"));
        assert_eq!(api.history_calls(), 0);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "job.failed");
    }

    #[tokio::test(start_paused = true)]
    async fn history_reload_stops_polling_jobs_it_resolved() {
        let api = Arc::new(FakeApi::default());
        let (studio, mut rx) = studio(&api, false);

        let id = studio.submit(&request()).await.unwrap();
        api.set_history(vec![history_entry(&id, "done.png", "2024-01-01T00:00:00Z")]);
        studio.load_history().await.unwrap();

        assert!(!studio.poller().is_polling(&id).await);
        assert_eq!(studio.jobs().await[0].status, JobStatus::Done);

        let names: Vec<&str> = drain(&mut rx).iter().map(StudioEvent::name).collect();
        assert_eq!(names, vec!["job.completed", "credits.changed", "history.reloaded"]);
    }

    #[tokio::test(start_paused = true)]
    async fn history_refetch_announces_other_jobs_it_finished() {
        let api = Arc::new(FakeApi::default());
        api.script("job-1", vec![Some(completed(Some("a.png"), &[]))]);
        api.script("job-2", vec![None, None, Some(completed(Some("b.png"), &[]))]);
        let (studio, mut rx) = studio(&api, true);

        let first = studio.submit(&request()).await.unwrap();
        let second = studio.submit(&request()).await.unwrap();
        api.set_history(vec![history_entry(&second, "b.png", "2030-01-01T00:00:00Z")]);

        assert_eq!(studio.wait_for(&first).await.unwrap().status, JobStatus::Done);
        let job = studio.wait_for(&second).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.url.as_deref(), Some("https://cdn.x/b.png"));
        assert!(!studio.poller().is_polling(&second).await);

        let events = drain(&mut rx);
        let completed: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StudioEvent::JobCompleted { job_id, .. } => Some(job_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![first.as_str(), second.as_str()]);
        let credits = events
            .iter()
            .filter(|e| matches!(e, StudioEvent::CreditsChanged { .. }))
            .count();
        assert_eq!(credits, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submits_all_keep_polling() {
        let api = Arc::new(FakeApi::default());
        let (studio, _rx) = studio(&api, false);
        let studio = Arc::new(studio);

        let mut submits = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let studio = Arc::clone(&studio);
            submits.spawn(async move { studio.submit(&request()).await.unwrap() });
        }
        let mut ids = Vec::new();
        while let Some(id) = submits.join_next().await {
            ids.push(id.unwrap());
        }

        assert_eq!(studio.jobs().await.len(), 16);
        for id in &ids {
            assert!(studio.poller().is_polling(id).await, "{id} is listed but not polled");
        }
        assert_eq!(studio.poller().active_count().await, 16);
        studio.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn run_applies_updates_until_cancelled() {
        let api = Arc::new(FakeApi::default());
        api.script("job-1", vec![Some(completed(Some("a.png"), &[]))]);
        api.script("job-2", vec![None, Some(completed(Some("b.png"), &[]))]);
        let (studio, mut rx) = studio(&api, false);
        let studio = Arc::new(studio);

        studio.submit(&request()).await.unwrap();
        studio.submit(&request()).await.unwrap();

        let cancel = CancellationToken::new();
        let runner = tokio::spawn({
            let studio = Arc::clone(&studio);
            let cancel = cancel.clone();
            async move { studio.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();
        runner.await.unwrap();

        assert!(studio.jobs().await.iter().all(|j| j.status == JobStatus::Done));
        let credits = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, StudioEvent::CreditsChanged { .. }))
            .count();
        assert_eq!(credits, 2);
    }
}
