//! # Job Orchestration Module
//!
//! Durable background jobs composed of many admin facade calls: backup,
//! restore, bulk command, config deploy. Jobs are queued in the store,
//! checked against the per-node conflict table at queue time, and executed
//! by exactly one worker task system-wide.
//!
//! Cancellation is cooperative and advisory: `request_cancel_running` flips
//! a flag that handlers observe through their [`JobContext`] at explicit
//! checkpoints. A handler that never checkpoints is a handler defect, not a
//! queue defect — the queue never preempts.
//!
//! Handler failures (including panics) are caught at the worker boundary and
//! recorded as job failures; the worker loop itself never dies.

pub mod sequencer;

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::admin::AdminService;
use crate::storage::{JobRecord, JobStatus, JobType, ProgressEntry, Storage};

/// Worker idle poll interval when no job is eligible.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Successful queue admission.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedJob {
    pub job_id: u64,
    pub queue_position: usize,
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// A conflicting job is already queued or running for the same node.
    /// No job record is created.
    #[error("a {existing_type} job is already {existing_status} for this node: {existing_name}")]
    Conflict {
        existing_id: u64,
        existing_type: &'static str,
        existing_status: &'static str,
        existing_name: String,
    },
    #[error("job store error: {0}")]
    Store(String),
}

/// Raised (as a value) when a handler observes the cancel flag at a
/// checkpoint.
#[derive(Debug)]
pub struct JobCancelled;

/// What a handler reports back to the worker.
pub struct JobOutcome {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn ok(data: serde_json::Value) -> Self {
        JobOutcome {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        JobOutcome {
            success: false,
            data,
            error: Some(error.into()),
        }
    }
}

/// Explicit cancellation/progress handle threaded into every handler. This
/// is the only sanctioned way for a handler to observe the cancel flag or
/// publish progress.
#[derive(Clone)]
pub struct JobContext {
    job_id: u64,
    storage: Arc<Storage>,
}

impl JobContext {
    pub fn new(job_id: u64, storage: Arc<Storage>) -> Self {
        JobContext { job_id, storage }
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    pub async fn update(&self, progress: u8, message: impl Into<String>) {
        self.report(progress, message, false).await;
    }

    pub async fn report_error(&self, progress: u8, message: impl Into<String>) {
        self.report(progress, message, true).await;
    }

    async fn report(&self, progress: u8, message: impl Into<String>, is_error: bool) {
        let message = message.into();
        if let Err(e) = self
            .storage
            .update_job_progress(self.job_id, progress, Some(message), is_error)
            .await
        {
            warn!("progress update for job {} failed: {}", self.job_id, e);
        }
    }

    pub async fn cancel_requested(&self) -> bool {
        self.storage.cancel_requested(self.job_id).await
    }

    /// Cancellation checkpoint; call between every unit of work.
    pub async fn checkpoint(&self) -> Result<(), JobCancelled> {
        if self.cancel_requested().await {
            Err(JobCancelled)
        } else {
            Ok(())
        }
    }
}

/// Queue front-end plus the single worker loop.
pub struct JobService {
    storage: Arc<Storage>,
    admin: Arc<AdminService>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl JobService {
    pub fn new(storage: Arc<Storage>, admin: Arc<AdminService>) -> Self {
        JobService {
            storage,
            admin,
            worker: std::sync::Mutex::new(None),
        }
    }

    /// Sweep crash leftovers, then start the worker loop. Idempotent.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) {
        {
            let worker = self.worker.lock().unwrap();
            if worker.as_ref().is_some_and(|w| !w.is_finished()) {
                return;
            }
        }
        if let Err(e) = self.storage.sweep_orphaned_running().await {
            warn!("orphan sweep failed: {}", e);
        }
        let handle = spawn_worker(self.storage.clone(), self.admin.clone(), shutdown);
        *self.worker.lock().unwrap() = Some(handle);
        info!("job worker started");
    }

    /// Wait for the worker to observe shutdown and drain.
    pub async fn join(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|w| !w.is_finished())
    }

    /// Admit a job unless it conflicts with an in-flight job on the same
    /// node. Conflicts are rejected outright: no record is created.
    pub async fn queue_job(
        &self,
        job_type: JobType,
        name: &str,
        params: serde_json::Value,
        target_node: Option<u32>,
    ) -> Result<QueuedJob, QueueError> {
        if let Some(existing) = self.storage.conflicting_job(job_type, target_node).await {
            return Err(QueueError::Conflict {
                existing_id: existing.id,
                existing_type: existing.job_type.as_str(),
                existing_status: existing.status.as_str(),
                existing_name: existing.name,
            });
        }
        let job_id = self
            .storage
            .create_job(job_type, name, params, target_node)
            .await
            .map_err(|e| QueueError::Store(e.to_string()))?;
        let queue_position = self.storage.queue_position(job_id).await;
        info!(
            "queued {} job {} (position {})",
            job_type.as_str(),
            job_id,
            queue_position
        );
        Ok(QueuedJob {
            job_id,
            queue_position,
        })
    }

    pub async fn job(&self, id: u64) -> Option<JobRecord> {
        self.storage.job(id).await
    }

    pub async fn jobs(
        &self,
        status: Option<JobStatus>,
        job_type: Option<JobType>,
        target_node: Option<u32>,
        limit: usize,
    ) -> Vec<JobRecord> {
        self.storage
            .jobs_filtered(status, job_type, target_node, limit)
            .await
    }

    pub async fn active_jobs(&self) -> Vec<JobRecord> {
        self.storage.active_jobs().await
    }

    pub async fn progress_log(&self, id: u64, limit: usize) -> Vec<ProgressEntry> {
        self.storage.progress_log(id, limit).await
    }

    /// Cancel a job that has not started. Returns false for running and
    /// terminal jobs, leaving them unchanged.
    pub async fn cancel_job(&self, id: u64) -> bool {
        self.storage.cancel_queued_job(id).await.unwrap_or_else(|e| {
            error!("cancel of job {} failed: {}", id, e);
            false
        })
    }

    /// Flag a running job for cooperative cancellation; the handler stops at
    /// its next checkpoint.
    pub async fn request_cancel_running(&self, id: u64) -> bool {
        self.storage
            .request_cancel_running(id)
            .await
            .unwrap_or_else(|e| {
                error!("cancel request for job {} failed: {}", id, e);
                false
            })
    }

    pub async fn pause_job(&self, id: u64) -> bool {
        self.storage.pause_queued_job(id).await.unwrap_or(false)
    }

    pub async fn resume_job(&self, id: u64) -> bool {
        self.storage.resume_paused_job(id).await.unwrap_or(false)
    }
}

fn spawn_worker(
    storage: Arc<Storage>,
    admin: Arc<AdminService>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("job worker loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match storage.next_eligible_queued().await {
                Some(job) => {
                    process_job(&storage, &admin, job).await;
                }
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(POLL_INTERVAL) => {}
                        changed = shutdown.changed() => {
                            // A closed channel means the owner is gone: stop.
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        info!("job worker loop stopped");
    })
}

async fn process_job(storage: &Arc<Storage>, admin: &Arc<AdminService>, job: JobRecord) {
    let job_id = job.id;
    info!(
        "starting job {}: {} - {}",
        job_id,
        job.job_type.as_str(),
        job.name
    );
    match storage.mark_job_running(job_id).await {
        Ok(true) => {}
        Ok(false) => {
            // Cancelled or already picked up between poll and claim.
            return;
        }
        Err(e) => {
            error!("could not claim job {}: {}", job_id, e);
            return;
        }
    }

    let ctx = JobContext::new(job_id, storage.clone());
    let handler_admin = admin.clone();
    let handler_storage = storage.clone();
    let handler_job = job.clone();
    // The handler runs in its own task so a panic is contained as a join
    // error instead of taking down the worker loop.
    let handle = tokio::spawn(async move {
        match handler_job.job_type {
            JobType::Backup => {
                sequencer::run_backup(&handler_admin, &handler_storage, &handler_job, &ctx).await
            }
            JobType::Restore => {
                sequencer::run_restore(&handler_admin, &handler_storage, &handler_job, &ctx).await
            }
            JobType::BulkCommand => {
                sequencer::run_bulk_command(&handler_admin, &handler_job, &ctx).await
            }
            JobType::ConfigDeploy => {
                sequencer::run_config_deploy(&handler_admin, &handler_job, &ctx).await
            }
        }
    });

    match handle.await {
        Ok(Ok(outcome)) => {
            if let Err(e) = storage
                .complete_job(job_id, outcome.success, outcome.data, outcome.error)
                .await
            {
                error!("failed to record outcome of job {}: {}", job_id, e);
            }
            info!(
                "job {} completed: {}",
                job_id,
                if outcome.success { "success" } else { "failed" }
            );
        }
        Ok(Err(JobCancelled)) => {
            info!("job {} cancelled at checkpoint", job_id);
            if let Err(e) = storage.mark_job_cancelled(job_id, "cancelled by user").await {
                error!("failed to record cancellation of job {}: {}", job_id, e);
            }
        }
        Err(join_err) => {
            error!("job {} handler panicked: {}", job_id, join_err);
            let _ = storage
                .complete_job(
                    job_id,
                    false,
                    None,
                    Some(format!("handler panicked: {}", join_err)),
                )
                .await;
        }
    }
}
