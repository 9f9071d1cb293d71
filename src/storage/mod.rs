//! # Storage Module - Persistence Layer
//!
//! File-backed persistence for everything the engine must remember across
//! restarts: the admin command audit log, background job records with their
//! progress history, configuration backups, and the directory of nodes known
//! to answer admin traffic.
//!
//! ## Layout
//!
//! ```text
//! data/
//! ├── .lock               ← fs2 exclusive lock; one process per data dir
//! ├── audit/admin_log.json
//! ├── jobs/jobs.json
//! ├── jobs/progress/<id>.json
//! ├── backups/index.json
//! ├── backups/<id>.json
//! └── nodes.json
//! ```
//!
//! Documents are plain JSON, loaded once at startup and rewritten on every
//! mutation (write-to-temp + rename). All mutation goes through `&self`
//! methods guarded by per-document async mutexes; no caller touches the
//! underlying maps directly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::wire::{format_node_id, ChannelSettings, ConfigPayload, ModulePayload};

/// Terminal disposition of one logged admin command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Success,
    Failed,
    Timeout,
}

/// One row of the admin command audit log. Created `pending` at send time,
/// finalized exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub target_node: u32,
    pub command_type: String,
    pub request: serde_json::Value,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Backup,
    Restore,
    BulkCommand,
    ConfigDeploy,
}

impl JobType {
    /// Job types that may not share a target node with this one while either
    /// is queued or running.
    pub fn conflicts_with(&self) -> &'static [JobType] {
        match self {
            JobType::Backup | JobType::Restore | JobType::ConfigDeploy => {
                &[JobType::Backup, JobType::Restore, JobType::ConfigDeploy]
            }
            JobType::BulkCommand => &[JobType::BulkCommand],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Backup => "backup",
            JobType::Restore => "restore",
            JobType::BulkCommand => "bulk_command",
            JobType::ConfigDeploy => "config_deploy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: u64,
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node: Option<u32>,
    pub name: String,
    pub params: serde_json::Value,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(default)]
    pub cancel_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub at: DateTime<Utc>,
    pub progress: u8,
    pub message: String,
    #[serde(default)]
    pub is_error: bool,
}

/// Saved node configuration aggregate produced by a backup job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: u64,
    pub node: u32,
    pub node_hex: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub core_configs: BTreeMap<String, ConfigPayload>,
    pub module_configs: BTreeMap<String, ModulePayload>,
    pub channels: BTreeMap<String, ChannelSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdministrableNode {
    pub node: u32,
    pub node_hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// --- document files --------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuditFile {
    next_id: u64,
    entries: Vec<AuditEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JobsFile {
    next_id: u64,
    jobs: Vec<JobRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BackupsIndex {
    next_id: u64,
    entries: Vec<BackupSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSummary {
    pub id: u64,
    pub node: u32,
    pub node_hex: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub item_count: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NodesFile {
    nodes: BTreeMap<String, AdministrableNode>,
}

/// Cap on retained audit entries; the oldest are pruned past this.
const AUDIT_RETAIN: usize = 2000;

/// Main storage handle. One instance per process; the data directory is
/// locked exclusively for the lifetime of the handle.
pub struct Storage {
    data_dir: PathBuf,
    _dir_lock: std::fs::File,
    audit: Mutex<AuditFile>,
    jobs: Mutex<JobsFile>,
    backups: Mutex<BackupsIndex>,
    nodes: Mutex<NodesFile>,
}

async fn load_json<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    match fs::read_to_string(path).await {
        Ok(content) => {
            // Guard against a truncated write leaving leading NULs
            let trimmed = content.trim_start_matches('\0');
            serde_json::from_str(trimmed)
                .map_err(|e| anyhow!("corrupt store file {}: {}", path.display(), e))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(anyhow!("failed to read {}: {}", path.display(), e)),
    }
}

async fn persist_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

impl Storage {
    /// Open (or initialize) the store under `data_dir`.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        for sub in ["audit", "jobs", "jobs/progress", "backups"] {
            fs::create_dir_all(data_dir.join(sub))
                .await
                .with_context(|| format!("creating {}", data_dir.join(sub).display()))?;
        }

        // One writer per data dir: a second process would silently corrupt
        // the load-mutate-persist cycle.
        let lock_path = data_dir.join(".lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("opening {}", lock_path.display()))?;
        lock_file.try_lock_exclusive().map_err(|_| {
            anyhow!(
                "data directory {} is locked by another process",
                data_dir.display()
            )
        })?;

        let storage = Storage {
            audit: Mutex::new(load_json(&data_dir.join("audit/admin_log.json")).await?),
            jobs: Mutex::new(load_json(&data_dir.join("jobs/jobs.json")).await?),
            backups: Mutex::new(load_json(&data_dir.join("backups/index.json")).await?),
            nodes: Mutex::new(load_json(&data_dir.join("nodes.json")).await?),
            _dir_lock: lock_file,
            data_dir,
        };
        Ok(storage)
    }

    fn audit_path(&self) -> PathBuf {
        self.data_dir.join("audit/admin_log.json")
    }
    fn jobs_path(&self) -> PathBuf {
        self.data_dir.join("jobs/jobs.json")
    }
    fn backups_index_path(&self) -> PathBuf {
        self.data_dir.join("backups/index.json")
    }
    fn backup_path(&self, id: u64) -> PathBuf {
        self.data_dir.join(format!("backups/{}.json", id))
    }
    fn progress_path(&self, job_id: u64) -> PathBuf {
        self.data_dir.join(format!("jobs/progress/{}.json", job_id))
    }
    fn nodes_path(&self) -> PathBuf {
        self.data_dir.join("nodes.json")
    }

    // --- audit log ---------------------------------------------------------

    /// Insert a pending audit row for an outbound command, returning its id.
    pub async fn log_command(
        &self,
        target_node: u32,
        command_type: &str,
        request: serde_json::Value,
    ) -> Result<u64> {
        let mut audit = self.audit.lock().await;
        audit.next_id += 1;
        let id = audit.next_id;
        audit.entries.push(AuditEntry {
            id,
            target_node,
            command_type: command_type.to_string(),
            request,
            status: CommandStatus::Pending,
            response: None,
            error_message: None,
            sent_at: Utc::now(),
            responded_at: None,
        });
        if audit.entries.len() > AUDIT_RETAIN {
            let excess = audit.entries.len() - AUDIT_RETAIN;
            audit.entries.drain(..excess);
        }
        persist_json(&self.audit_path(), &*audit).await?;
        Ok(id)
    }

    /// Apply the single terminal update to a pending audit row. A second
    /// finalize for the same id is ignored with a warning.
    pub async fn finalize_command(
        &self,
        log_id: u64,
        status: CommandStatus,
        response: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut audit = self.audit.lock().await;
        let Some(entry) = audit.entries.iter_mut().find(|e| e.id == log_id) else {
            warn!("finalize for unknown audit entry {}", log_id);
            return Ok(());
        };
        if entry.status != CommandStatus::Pending {
            warn!(
                "audit entry {} already finalized as {:?}; ignoring update to {:?}",
                log_id, entry.status, status
            );
            return Ok(());
        }
        entry.status = status;
        entry.response = response;
        entry.error_message = error_message;
        entry.responded_at = Some(Utc::now());
        persist_json(&self.audit_path(), &*audit).await?;
        Ok(())
    }

    pub async fn admin_log(&self, target_node: Option<u32>, limit: usize) -> Vec<AuditEntry> {
        let audit = self.audit.lock().await;
        audit
            .entries
            .iter()
            .rev()
            .filter(|e| target_node.map_or(true, |t| e.target_node == t))
            .take(limit)
            .cloned()
            .collect()
    }

    // --- jobs --------------------------------------------------------------

    pub async fn create_job(
        &self,
        job_type: JobType,
        name: &str,
        params: serde_json::Value,
        target_node: Option<u32>,
    ) -> Result<u64> {
        let mut jobs = self.jobs.lock().await;
        jobs.next_id += 1;
        let id = jobs.next_id;
        let now = Utc::now();
        jobs.jobs.push(JobRecord {
            id,
            job_type,
            target_node,
            name: name.to_string(),
            params,
            status: JobStatus::Queued,
            progress: 0,
            progress_message: None,
            cancel_requested: false,
            result: None,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        });
        persist_json(&self.jobs_path(), &*jobs).await?;
        Ok(id)
    }

    pub async fn job(&self, id: u64) -> Option<JobRecord> {
        self.jobs
            .lock()
            .await
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
    }

    pub async fn jobs_filtered(
        &self,
        status: Option<JobStatus>,
        job_type: Option<JobType>,
        target_node: Option<u32>,
        limit: usize,
    ) -> Vec<JobRecord> {
        let jobs = self.jobs.lock().await;
        jobs.jobs
            .iter()
            .rev()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .filter(|j| job_type.map_or(true, |t| j.job_type == t))
            .filter(|j| target_node.map_or(true, |n| j.target_node == Some(n)))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Jobs that are queued, paused, or running.
    pub async fn active_jobs(&self) -> Vec<JobRecord> {
        let jobs = self.jobs.lock().await;
        jobs.jobs
            .iter()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect()
    }

    /// The queued-or-running job that blocks queueing `job_type` for
    /// `target_node`, if any. Jobs without a target never conflict.
    pub async fn conflicting_job(
        &self,
        job_type: JobType,
        target_node: Option<u32>,
    ) -> Option<JobRecord> {
        let target = target_node?;
        let conflicts = job_type.conflicts_with();
        let jobs = self.jobs.lock().await;
        jobs.jobs
            .iter()
            .find(|j| {
                matches!(j.status, JobStatus::Queued | JobStatus::Running)
                    && j.target_node == Some(target)
                    && conflicts.contains(&j.job_type)
            })
            .cloned()
    }

    /// Oldest queued job whose `(type, target)` does not conflict with any
    /// currently running job.
    pub async fn next_eligible_queued(&self) -> Option<JobRecord> {
        let jobs = self.jobs.lock().await;
        let running: Vec<(JobType, Option<u32>)> = jobs
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .map(|j| (j.job_type, j.target_node))
            .collect();
        jobs.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .find(|j| {
                let Some(target) = j.target_node else {
                    return true;
                };
                !running.iter().any(|(rt, rn)| {
                    *rn == Some(target) && j.job_type.conflicts_with().contains(rt)
                })
            })
            .cloned()
    }

    /// 1-based position of a queued job among queued jobs.
    pub async fn queue_position(&self, id: u64) -> usize {
        let jobs = self.jobs.lock().await;
        jobs.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .position(|j| j.id == id)
            .map(|p| p + 1)
            .unwrap_or(0)
    }

    async fn mutate_job<F>(&self, id: u64, f: F) -> Result<bool>
    where
        F: FnOnce(&mut JobRecord) -> bool,
    {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(false);
        };
        if !f(job) {
            return Ok(false);
        }
        job.updated_at = Utc::now();
        persist_json(&self.jobs_path(), &*jobs).await?;
        Ok(true)
    }

    pub async fn mark_job_running(&self, id: u64) -> Result<bool> {
        self.mutate_job(id, |j| {
            if j.status != JobStatus::Queued {
                return false;
            }
            j.status = JobStatus::Running;
            j.started_at = Some(Utc::now());
            true
        })
        .await
    }

    pub async fn complete_job(
        &self,
        id: u64,
        success: bool,
        result: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> Result<bool> {
        self.mutate_job(id, |j| {
            if j.status.is_terminal() {
                return false;
            }
            j.status = if success {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            j.result = result;
            j.error_message = error_message;
            j.completed_at = Some(Utc::now());
            if success {
                j.progress = 100;
            }
            true
        })
        .await
    }

    pub async fn mark_job_cancelled(&self, id: u64, reason: &str) -> Result<bool> {
        let reason = reason.to_string();
        self.mutate_job(id, move |j| {
            if j.status.is_terminal() {
                return false;
            }
            j.status = JobStatus::Cancelled;
            j.error_message = Some(reason);
            j.completed_at = Some(Utc::now());
            true
        })
        .await
    }

    pub async fn update_job_progress(
        &self,
        id: u64,
        progress: u8,
        message: Option<String>,
        is_error: bool,
    ) -> Result<()> {
        let msg = message.clone();
        self.mutate_job(id, move |j| {
            j.progress = progress.min(100);
            if msg.is_some() {
                j.progress_message = msg;
            }
            true
        })
        .await?;

        if let Some(message) = message {
            let path = self.progress_path(id);
            let mut log: Vec<ProgressEntry> = load_json(&path).await.unwrap_or_default();
            log.push(ProgressEntry {
                at: Utc::now(),
                progress: progress.min(100),
                message,
                is_error,
            });
            persist_json(&path, &log).await?;
        }
        Ok(())
    }

    pub async fn progress_log(&self, id: u64, limit: usize) -> Vec<ProgressEntry> {
        let log: Vec<ProgressEntry> = load_json(&self.progress_path(id)).await.unwrap_or_default();
        let skip = log.len().saturating_sub(limit);
        log.into_iter().skip(skip).collect()
    }

    /// Cancel a job that has not started yet. Running and terminal jobs are
    /// left untouched (returns false).
    pub async fn cancel_queued_job(&self, id: u64) -> Result<bool> {
        self.mutate_job(id, |j| {
            if j.status != JobStatus::Queued && j.status != JobStatus::Paused {
                return false;
            }
            j.status = JobStatus::Cancelled;
            j.completed_at = Some(Utc::now());
            true
        })
        .await
    }

    /// Flag a running job for cooperative cancellation. The handler observes
    /// the flag at its next checkpoint.
    pub async fn request_cancel_running(&self, id: u64) -> Result<bool> {
        self.mutate_job(id, |j| {
            if j.status != JobStatus::Running {
                return false;
            }
            j.cancel_requested = true;
            true
        })
        .await
    }

    pub async fn cancel_requested(&self, id: u64) -> bool {
        self.jobs
            .lock()
            .await
            .jobs
            .iter()
            .find(|j| j.id == id)
            .map(|j| j.cancel_requested)
            .unwrap_or(false)
    }

    pub async fn pause_queued_job(&self, id: u64) -> Result<bool> {
        self.mutate_job(id, |j| {
            if j.status != JobStatus::Queued {
                return false;
            }
            j.status = JobStatus::Paused;
            true
        })
        .await
    }

    pub async fn resume_paused_job(&self, id: u64) -> Result<bool> {
        self.mutate_job(id, |j| {
            if j.status != JobStatus::Paused {
                return false;
            }
            j.status = JobStatus::Queued;
            true
        })
        .await
    }

    /// Fail any job left `running` by a previous process. Called once before
    /// the worker starts polling.
    pub async fn sweep_orphaned_running(&self) -> Result<usize> {
        let mut jobs = self.jobs.lock().await;
        let mut swept = 0;
        for job in jobs.jobs.iter_mut() {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Failed;
                job.error_message =
                    Some("orphaned: left running by a previous process".to_string());
                job.completed_at = Some(Utc::now());
                job.updated_at = Utc::now();
                swept += 1;
            }
        }
        if swept > 0 {
            persist_json(&self.jobs_path(), &*jobs).await?;
            info!("swept {} orphaned running job(s) to failed", swept);
        }
        Ok(swept)
    }

    // --- backups -----------------------------------------------------------

    /// Persist a backup aggregate, returning its id.
    pub async fn store_backup(
        &self,
        node: u32,
        name: &str,
        description: &str,
        core_configs: BTreeMap<String, ConfigPayload>,
        module_configs: BTreeMap<String, ModulePayload>,
        channels: BTreeMap<String, ChannelSettings>,
    ) -> Result<u64> {
        let mut index = self.backups.lock().await;
        index.next_id += 1;
        let id = index.next_id;
        let record = BackupRecord {
            id,
            node,
            node_hex: format_node_id(node),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
            core_configs,
            module_configs,
            channels,
        };
        persist_json(&self.backup_path(id), &record).await?;
        index.entries.push(BackupSummary {
            id,
            node,
            node_hex: record.node_hex.clone(),
            name: record.name.clone(),
            created_at: record.created_at,
            item_count: record.core_configs.len()
                + record.module_configs.len()
                + record.channels.len(),
        });
        persist_json(&self.backups_index_path(), &*index).await?;
        Ok(id)
    }

    pub async fn backup(&self, id: u64) -> Option<BackupRecord> {
        match fs::read_to_string(self.backup_path(id)).await {
            Ok(content) => serde_json::from_str(&content).ok(),
            Err(_) => None,
        }
    }

    pub async fn backups(&self, node: Option<u32>) -> Vec<BackupSummary> {
        let index = self.backups.lock().await;
        index
            .entries
            .iter()
            .rev()
            .filter(|b| node.map_or(true, |n| b.node == n))
            .cloned()
            .collect()
    }

    // --- administrable nodes -----------------------------------------------

    /// Record that a node answered admin traffic (upsert, refreshing
    /// last-seen and firmware when known).
    pub async fn mark_node_administrable(
        &self,
        node: u32,
        firmware_version: Option<String>,
    ) -> Result<()> {
        let mut nodes = self.nodes.lock().await;
        let hex = format_node_id(node);
        let now = Utc::now();
        let entry = nodes.nodes.entry(hex.clone()).or_insert(AdministrableNode {
            node,
            node_hex: hex,
            firmware_version: None,
            first_seen: now,
            last_seen: now,
        });
        entry.last_seen = now;
        if firmware_version.is_some() {
            entry.firmware_version = firmware_version;
        }
        persist_json(&self.nodes_path(), &*nodes).await?;
        Ok(())
    }

    pub async fn administrable_nodes(&self) -> Vec<AdministrableNode> {
        self.nodes.lock().await.nodes.values().cloned().collect()
    }

    pub async fn is_node_administrable(&self, node: u32) -> bool {
        self.nodes
            .lock()
            .await
            .nodes
            .contains_key(&format_node_id(node))
    }
}

#[async_trait::async_trait]
impl crate::transport::NodeSink for Storage {
    async fn node_responded(&self, node: u32, firmware_version: Option<String>) {
        if let Err(e) = self.mark_node_administrable(node, firmware_version).await {
            warn!(
                "failed to record administrable node {}: {}",
                format_node_id(node),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::new(dir.path()).await.expect("storage");
        (dir, storage)
    }

    #[tokio::test]
    async fn audit_rows_finalize_exactly_once() {
        let (_dir, s) = storage().await;
        let id = s
            .log_command(0x1234, "get_config", serde_json::json!({"kind": "lora"}))
            .await
            .unwrap();
        s.finalize_command(id, CommandStatus::Success, None, None)
            .await
            .unwrap();
        // Second terminal update must be ignored
        s.finalize_command(id, CommandStatus::Failed, None, Some("late".into()))
            .await
            .unwrap();
        let log = s.admin_log(Some(0x1234), 10).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, CommandStatus::Success);
        assert!(log[0].error_message.is_none());
    }

    #[tokio::test]
    async fn conflicting_job_detection() {
        let (_dir, s) = storage().await;
        let id = s
            .create_job(JobType::Restore, "restore", serde_json::json!({}), Some(5))
            .await
            .unwrap();
        s.mark_job_running(id).await.unwrap();

        // backup on the same node conflicts with the running restore
        assert!(s.conflicting_job(JobType::Backup, Some(5)).await.is_some());
        // backup on a different node does not
        assert!(s.conflicting_job(JobType::Backup, Some(6)).await.is_none());
        // jobs without a target never conflict
        assert!(s.conflicting_job(JobType::Backup, None).await.is_none());
        // bulk command only conflicts with bulk command
        assert!(s
            .conflicting_job(JobType::BulkCommand, Some(5))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn next_eligible_skips_conflicts() {
        let (_dir, s) = storage().await;
        let running = s
            .create_job(JobType::Backup, "b1", serde_json::json!({}), Some(1))
            .await
            .unwrap();
        s.mark_job_running(running).await.unwrap();
        let _blocked = s
            .create_job(JobType::Restore, "r1", serde_json::json!({}), Some(1))
            .await
            .unwrap();
        let free = s
            .create_job(JobType::Backup, "b2", serde_json::json!({}), Some(2))
            .await
            .unwrap();

        let next = s.next_eligible_queued().await.expect("eligible job");
        assert_eq!(next.id, free);
    }

    #[tokio::test]
    async fn cancel_only_while_queued() {
        let (_dir, s) = storage().await;
        let id = s
            .create_job(JobType::Backup, "b", serde_json::json!({}), Some(1))
            .await
            .unwrap();
        assert!(s.cancel_queued_job(id).await.unwrap());

        let id2 = s
            .create_job(JobType::Backup, "b2", serde_json::json!({}), Some(1))
            .await
            .unwrap();
        s.mark_job_running(id2).await.unwrap();
        assert!(!s.cancel_queued_job(id2).await.unwrap());
        assert_eq!(s.job(id2).await.unwrap().status, JobStatus::Running);

        // advisory cancel works on running jobs
        assert!(s.request_cancel_running(id2).await.unwrap());
        assert!(s.cancel_requested(id2).await);

        s.complete_job(id2, true, None, None).await.unwrap();
        assert!(!s.cancel_queued_job(id2).await.unwrap());
        assert!(!s.request_cancel_running(id2).await.unwrap());
    }

    #[tokio::test]
    async fn orphan_sweep_fails_running_jobs() {
        let (_dir, s) = storage().await;
        let id = s
            .create_job(JobType::Backup, "b", serde_json::json!({}), Some(1))
            .await
            .unwrap();
        s.mark_job_running(id).await.unwrap();
        let swept = s.sweep_orphaned_running().await.unwrap();
        assert_eq!(swept, 1);
        let job = s.job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("orphaned"));
    }

    #[tokio::test]
    async fn pause_resume_queued_only() {
        let (_dir, s) = storage().await;
        let id = s
            .create_job(JobType::Backup, "b", serde_json::json!({}), Some(1))
            .await
            .unwrap();
        assert!(s.pause_queued_job(id).await.unwrap());
        assert_eq!(s.job(id).await.unwrap().status, JobStatus::Paused);
        // paused jobs are not eligible
        assert!(s.next_eligible_queued().await.is_none());
        assert!(s.resume_paused_job(id).await.unwrap());
        assert_eq!(s.job(id).await.unwrap().status, JobStatus::Queued);
        // cannot pause a running job
        s.mark_job_running(id).await.unwrap();
        assert!(!s.pause_queued_job(id).await.unwrap());
    }

    #[tokio::test]
    async fn backup_roundtrip() {
        let (_dir, s) = storage().await;
        let mut core = BTreeMap::new();
        core.insert(
            "lora".to_string(),
            ConfigPayload {
                variant: Some(crate::wire::config_payload::Variant::Lora(
                    crate::wire::LoraConfig {
                        region: 3,
                        hop_limit: 5,
                        ..Default::default()
                    },
                )),
            },
        );
        let id = s
            .store_backup(0xAB, "nightly", "", core, BTreeMap::new(), BTreeMap::new())
            .await
            .unwrap();
        let back = s.backup(id).await.expect("backup body");
        assert_eq!(back.node_hex, "!000000ab");
        assert!(back.core_configs.contains_key("lora"));
        let list = s.backups(Some(0xAB)).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].item_count, 1);
    }

    #[tokio::test]
    async fn administrable_upsert_refreshes() {
        let (_dir, s) = storage().await;
        s.mark_node_administrable(7, None).await.unwrap();
        s.mark_node_administrable(7, Some("2.5.1".into()))
            .await
            .unwrap();
        let nodes = s.administrable_nodes().await;
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].firmware_version.as_deref(), Some("2.5.1"));
        assert!(s.is_node_administrable(7).await);
        assert!(!s.is_node_administrable(8).await);
    }
}
