//! The UI-facing job list.
//!
//! [`JobBoard`] owns the ordered, newest-first list of jobs and the current
//! selection. It changes only through job creation, poll updates, and
//! history reconciliation. Each of these rewrites the list by job id, so an
//! update for a job that has since left the list is simply ignored.

use std::collections::HashSet;

use lumo_client::wire::HistoryEntry;
use lumo_core::assets::AssetUrls;
use lumo_core::job::{Job, JobStatus};
use lumo_core::types::JobId;

use crate::poller::{PollUpdate, Resolution};

#[derive(Debug, Clone)]
pub struct JobBoard {
    jobs: Vec<Job>,
    selected: Option<JobId>,
    max_jobs: usize,
    assets: AssetUrls,
}

impl JobBoard {
    pub fn new(max_jobs: usize, assets: AssetUrls) -> Self {
        Self {
            jobs: Vec::new(),
            selected: None,
            max_jobs: max_jobs.max(1),
            assets,
        }
    }

    /// Jobs, newest first.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == job_id)
    }

    pub fn selected(&self) -> Option<&Job> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    /// Select a listed job. Returns `false` (and keeps the current
    /// selection) when the id is not listed.
    pub fn select(&mut self, job_id: &str) -> bool {
        if self.get(job_id).is_none() {
            return false;
        }
        self.selected = Some(job_id.to_string());
        true
    }

    /// Prepend a freshly created job and select it.
    pub fn push_created(&mut self, job: Job) {
        self.jobs.retain(|existing| existing.id != job.id);
        self.selected = Some(job.id.clone());
        self.jobs.insert(0, job);
        self.jobs.truncate(self.max_jobs);
    }

    /// Apply a poll update to the job it names.
    ///
    /// Returns the updated job, or `None` when the job is no longer listed
    /// or already terminal.
    pub fn apply_update(&mut self, update: &PollUpdate) -> Option<Job> {
        let Some(job) = self.jobs.iter_mut().find(|job| job.id == update.job_id()) else {
            tracing::debug!(job_id = update.job_id(), "Update for unlisted job ignored");
            return None;
        };

        let applied = match update {
            PollUpdate::Progress { .. } => job.mark_processing(),
            PollUpdate::Resolved { resolution, .. } => match resolution {
                Resolution::Done { url, urls } => job.complete(url.clone(), urls.clone()),
                Resolution::Failed { error } => job.fail(error.clone()),
            },
        };

        match applied {
            Ok(()) => Some(job.clone()),
            Err(e) => {
                tracing::debug!(job_id = %job.id, error = %e, "Update ignored");
                None
            }
        }
    }

    /// Rebuild the list from backend history.
    ///
    /// History entries without a resolvable URL are not shown. A listed
    /// job is replaced by its history version only when that version is
    /// terminal, so history never rolls a finished job back into flight.
    /// Listed jobs that history does not mention yet are kept. The merged
    /// list is ordered newest first, capped, and its first job is selected.
    pub fn load_history(&mut self, entries: Vec<HistoryEntry>) -> HistoryMerge {
        let mut from_history: Vec<Job> = entries
            .into_iter()
            .filter_map(|entry| self.job_from_history(entry))
            .collect();
        from_history.retain(|job| job.status.is_terminal() || self.get(&job.id).is_none());

        let resolved: Vec<Job> = from_history
            .iter()
            .filter(|job| self.get(&job.id).is_some_and(Job::is_in_flight))
            .cloned()
            .collect();

        let replaced: HashSet<&str> = from_history.iter().map(|job| job.id.as_str()).collect();
        let mut merged: Vec<Job> = self
            .jobs
            .iter()
            .filter(|job| !replaced.contains(job.id.as_str()))
            .cloned()
            .collect();
        merged.extend(from_history);

        // Stable: jobs without timestamps keep their relative order, last.
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        merged.truncate(self.max_jobs);

        self.selected = merged.first().map(|job| job.id.clone());
        self.jobs = merged;
        HistoryMerge {
            count: self.jobs.len(),
            resolved,
        }
    }

    fn job_from_history(&self, entry: HistoryEntry) -> Option<Job> {
        let urls = self.assets.normalize_all(&entry.image_urls);
        let url = urls
            .first()
            .cloned()
            .or_else(|| self.assets.normalize(entry.image_url.as_deref()));
        let Some(url) = url else {
            tracing::trace!(job_id = %entry.id, "History entry without asset skipped");
            return None;
        };

        // Records without a recognised status are finished outputs.
        let status = entry
            .backend_status()
            .map_or(JobStatus::Done, JobStatus::from_backend);

        Some(Job {
            id: entry.id,
            status,
            url: Some(url),
            urls,
            aspect_ratio: entry.aspect_ratio,
            prompt: entry.prompt,
            error: None,
            created_at: entry.created_at,
        })
    }
}

/// Outcome of [`JobBoard::load_history`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryMerge {
    /// Jobs listed afterwards.
    pub count: usize,
    /// Jobs that were in flight and that history reported as finished.
    pub resolved: Vec<Job>,
}
