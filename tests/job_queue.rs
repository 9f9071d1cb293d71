//! Queue-time conflict control and job lifecycle through the service
//! surface (the storage-level rules have their own unit tests).

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{stack_with, MockPublisher};
use meshadmin::jobs::{JobService, QueueError};
use meshadmin::storage::{JobStatus, JobType};
use meshadmin::transport::TransportKind;
use serde_json::json;

const NODE_A: u32 = 0xAAAA;
const NODE_B: u32 = 0xBBBB;

async fn service() -> (common::TestStack, Arc<JobService>) {
    let stack = stack_with(MockPublisher::answering(TransportKind::Socket)).await;
    let jobs = Arc::new(JobService::new(stack.storage.clone(), stack.admin.clone()));
    (stack, jobs)
}

#[tokio::test]
async fn conflicting_job_is_rejected_without_a_record() {
    let (stack, jobs) = service().await;

    // A restore is running for node A
    let restore = jobs
        .queue_job(JobType::Restore, "restore A", json!({"backup_id": 1}), Some(NODE_A))
        .await
        .unwrap();
    stack.storage.mark_job_running(restore.job_id).await.unwrap();

    // Backup for the same node: rejected
    let err = jobs
        .queue_job(JobType::Backup, "backup A", json!({}), Some(NODE_A))
        .await
        .unwrap_err();
    match err {
        QueueError::Conflict {
            existing_type,
            existing_status,
            ..
        } => {
            assert_eq!(existing_type, "restore");
            assert_eq!(existing_status, "running");
        }
        other => panic!("expected conflict, got {:?}", other),
    }
    // No record was created for the rejected job
    assert_eq!(stack.storage.active_jobs().await.len(), 1);

    // Backup for a different node: admitted
    let ok = jobs
        .queue_job(JobType::Backup, "backup B", json!({}), Some(NODE_B))
        .await
        .unwrap();
    assert_eq!(ok.queue_position, 1);
}

#[tokio::test]
async fn bulk_command_only_conflicts_with_itself() {
    let (stack, jobs) = service().await;

    let bulk = jobs
        .queue_job(
            JobType::BulkCommand,
            "mass reboot",
            json!({"command": "reboot", "node_ids": [1, 2]}),
            Some(NODE_A),
        )
        .await
        .unwrap();
    stack.storage.mark_job_running(bulk.job_id).await.unwrap();

    // A backup on the same node is fine
    assert!(jobs
        .queue_job(JobType::Backup, "backup", json!({}), Some(NODE_A))
        .await
        .is_ok());
    // Another bulk command on the same node is not
    assert!(jobs
        .queue_job(
            JobType::BulkCommand,
            "again",
            json!({"command": "reboot", "node_ids": [1]}),
            Some(NODE_A)
        )
        .await
        .is_err());
}

#[tokio::test]
async fn untargeted_jobs_never_conflict() {
    let (stack, jobs) = service().await;
    let first = jobs
        .queue_job(JobType::BulkCommand, "one", json!({"command": "reboot", "node_ids": [1]}), None)
        .await
        .unwrap();
    stack.storage.mark_job_running(first.job_id).await.unwrap();
    assert!(jobs
        .queue_job(JobType::BulkCommand, "two", json!({"command": "reboot", "node_ids": [2]}), None)
        .await
        .is_ok());
}

#[tokio::test]
async fn cancel_succeeds_only_while_queued() {
    let (stack, jobs) = service().await;
    let queued = jobs
        .queue_job(JobType::Backup, "b", json!({}), Some(NODE_A))
        .await
        .unwrap();
    assert!(jobs.cancel_job(queued.job_id).await);
    assert_eq!(
        stack.storage.job(queued.job_id).await.unwrap().status,
        JobStatus::Cancelled
    );

    let running = jobs
        .queue_job(JobType::Backup, "b2", json!({}), Some(NODE_A))
        .await
        .unwrap();
    stack.storage.mark_job_running(running.job_id).await.unwrap();
    assert!(!jobs.cancel_job(running.job_id).await);
    assert_eq!(
        stack.storage.job(running.job_id).await.unwrap().status,
        JobStatus::Running,
        "cancel of a running job must leave it unchanged"
    );

    // Advisory cancel flags it instead
    assert!(jobs.request_cancel_running(running.job_id).await);
    assert!(stack.storage.cancel_requested(running.job_id).await);

    // Terminal jobs reject both
    stack
        .storage
        .complete_job(running.job_id, true, None, None)
        .await
        .unwrap();
    assert!(!jobs.cancel_job(running.job_id).await);
    assert!(!jobs.request_cancel_running(running.job_id).await);
}

#[tokio::test]
async fn pause_and_resume_queued_jobs() {
    let (_stack, jobs) = service().await;
    let queued = jobs
        .queue_job(JobType::Backup, "b", json!({}), Some(NODE_A))
        .await
        .unwrap();
    assert!(jobs.pause_job(queued.job_id).await);
    assert!(jobs.resume_job(queued.job_id).await);
    // Resuming a queued job is a no-op failure
    assert!(!jobs.resume_job(queued.job_id).await);
}

#[tokio::test]
async fn orphaned_running_jobs_are_failed_on_start() {
    let (stack, jobs) = service().await;
    let orphan = jobs
        .queue_job(JobType::Backup, "crashed", json!({}), Some(NODE_A))
        .await
        .unwrap();
    stack.storage.mark_job_running(orphan.job_id).await.unwrap();

    // start() sweeps before polling
    let (_tx, rx) = tokio::sync::watch::channel(false);
    jobs.start(rx).await;

    // Give the sweep a moment; the orphan must be failed, not re-run
    tokio::time::sleep(Duration::from_millis(50)).await;
    let job = stack.storage.job(orphan.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    drop(_tx);
}

#[tokio::test]
async fn worker_runs_a_config_deploy_job() {
    let (stack, jobs) = service().await;
    let (tx, rx) = tokio::sync::watch::channel(false);
    jobs.start(rx).await;

    let queued = jobs
        .queue_job(
            JobType::ConfigDeploy,
            "deploy lora",
            json!({
                "config_type": "lora",
                "config": {
                    "use_preset": true, "modem_preset": 0, "bandwidth": 0,
                    "spread_factor": 0, "coding_rate": 0, "frequency_offset": 0.0,
                    "region": 3, "hop_limit": 3, "tx_enabled": true,
                    "tx_power": 27, "channel_num": 0
                }
            }),
            Some(NODE_A),
        )
        .await
        .unwrap();

    // Worker polls every 2s; allow a couple of cycles
    let mut done = None;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(120)).await;
        let job = stack.storage.job(queued.job_id).await.unwrap();
        if job.status.is_terminal() {
            done = Some(job);
            break;
        }
    }
    let job = done.expect("deploy job should finish");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(stack.publisher.sent_ops(), vec!["set_config"]);

    let _ = tx.send(true);
    jobs.join().await;
}
