//! Backup and restore sequencing end to end: partial success is a normal
//! outcome, skip flags are honored, and a restore can be fed from a backup
//! produced by the same stack.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{stack_with, MockAction, MockPublisher, TestStack};
use meshadmin::jobs::JobService;
use meshadmin::storage::{JobRecord, JobStatus, JobType};
use meshadmin::transport::TransportKind;
use meshadmin::wire::admin_request::Op;
use serde_json::json;

const NODE: u32 = 0x12345678;

async fn run_to_completion(
    stack: &TestStack,
    _jobs: &Arc<JobService>,
    job_id: u64,
    budget: Duration,
) -> JobRecord {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let job = stack.storage.job(job_id).await.expect("job exists");
        if job.status.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} did not finish in time (status {:?})",
            job_id,
            job.status
        );
    }
}

#[tokio::test]
async fn backup_with_all_channel_reads_failing_is_partial_success() {
    // Core and module reads answer; every channel read is silent.
    let publisher = MockPublisher::new(TransportKind::Socket, |req, _t| match req.op {
        Some(Op::GetChannel(_)) => MockAction::Silence,
        _ => MockAction::Reply,
    });
    let stack = stack_with(publisher).await;
    let jobs = Arc::new(JobService::new(stack.storage.clone(), stack.admin.clone()));
    let (tx, rx) = tokio::sync::watch::channel(false);
    jobs.start(rx).await;

    let queued = jobs
        .queue_job(
            JobType::Backup,
            "partial backup",
            json!({"backup_name": "partial"}),
            Some(NODE),
        )
        .await
        .unwrap();

    let job = run_to_completion(&stack, &jobs, queued.job_id, Duration::from_secs(30)).await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error_message);

    let result = job.result.expect("result data");
    let failed: Vec<String> = result["failed_configs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(failed.len(), 8, "exactly the 8 channel reads fail: {:?}", failed);
    assert!(failed.iter().all(|f| f.starts_with("channel:")));

    let successful = result["successful_configs"].as_array().unwrap().len();
    assert_eq!(successful, 8 + 13, "all core and module configs succeed");
    assert_eq!(
        result["total_configs"].as_u64().unwrap() as usize,
        successful + 8
    );

    // The aggregate was persisted because at least one item succeeded
    let backup_id = result["backup_id"].as_u64().unwrap();
    let record = stack.storage.backup(backup_id).await.expect("stored backup");
    assert_eq!(record.core_configs.len(), 8);
    assert_eq!(record.module_configs.len(), 13);
    assert!(record.channels.is_empty());

    let _ = tx.send(true);
    jobs.join().await;
}

#[tokio::test]
async fn backup_failing_every_item_fails_the_job() {
    let publisher = MockPublisher::new(TransportKind::Socket, |_req, _t| MockAction::Silence);
    let stack = stack_with(publisher).await;
    let jobs = Arc::new(JobService::new(stack.storage.clone(), stack.admin.clone()));
    let (tx, rx) = tokio::sync::watch::channel(false);
    jobs.start(rx).await;

    let queued = jobs
        .queue_job(JobType::Backup, "doomed", json!({}), Some(NODE))
        .await
        .unwrap();
    let job = run_to_completion(&stack, &jobs, queued.job_id, Duration::from_secs(60)).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_message
        .unwrap()
        .contains("failed to retrieve any configuration"));
    assert!(stack.storage.backups(Some(NODE)).await.is_empty());

    let _ = tx.send(true);
    jobs.join().await;
}

#[tokio::test]
async fn restore_skips_primary_channel_and_security_by_default() {
    // Build a full backup first, with every read answering.
    let publisher = MockPublisher::answering(TransportKind::Socket);
    let stack = stack_with(publisher).await;
    let jobs = Arc::new(JobService::new(stack.storage.clone(), stack.admin.clone()));
    let (tx, rx) = tokio::sync::watch::channel(false);
    jobs.start(rx).await;

    let backup_job = jobs
        .queue_job(JobType::Backup, "full", json!({}), Some(NODE))
        .await
        .unwrap();
    let done = run_to_completion(&stack, &jobs, backup_job.job_id, Duration::from_secs(30)).await;
    assert_eq!(done.status, JobStatus::Completed);
    let backup_id = done.result.unwrap()["backup_id"].as_u64().unwrap();

    stack.publisher.sent.lock().unwrap().clear();

    let restore_job = jobs
        .queue_job(
            JobType::Restore,
            "restore defaults",
            json!({"backup_id": backup_id}),
            Some(NODE),
        )
        .await
        .unwrap();
    let done = run_to_completion(&stack, &jobs, restore_job.job_id, Duration::from_secs(30)).await;
    assert_eq!(done.status, JobStatus::Completed);

    let result = done.result.unwrap();
    let restored: Vec<String> = result["successful_restores"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();

    // security is skipped by default, lora is not
    assert!(!restored.contains(&"core:security".to_string()));
    assert!(restored.contains(&"core:lora".to_string()));
    // channel 0 (primary) is skipped by default, others restore
    assert!(!restored.contains(&"channel:0".to_string()));
    assert!(restored.contains(&"channel:1".to_string()));
    // no reboot was requested
    assert_eq!(result["reboot_sent"], json!(false));
    let ops = stack.publisher.sent_ops();
    assert!(!ops.contains(&"reboot".to_string()));

    let _ = tx.send(true);
    jobs.join().await;
}

#[tokio::test]
async fn restore_with_reboot_sends_reboot_last() {
    let publisher = MockPublisher::answering(TransportKind::Socket);
    let stack = stack_with(publisher).await;
    let jobs = Arc::new(JobService::new(stack.storage.clone(), stack.admin.clone()));
    let (tx, rx) = tokio::sync::watch::channel(false);
    jobs.start(rx).await;

    let backup_job = jobs
        .queue_job(JobType::Backup, "full", json!({}), Some(NODE))
        .await
        .unwrap();
    let done = run_to_completion(&stack, &jobs, backup_job.job_id, Duration::from_secs(30)).await;
    let backup_id = done.result.unwrap()["backup_id"].as_u64().unwrap();

    stack.publisher.sent.lock().unwrap().clear();
    let restore_job = jobs
        .queue_job(
            JobType::Restore,
            "restore+reboot",
            json!({"backup_id": backup_id, "reboot_after": true}),
            Some(NODE),
        )
        .await
        .unwrap();
    let done = run_to_completion(&stack, &jobs, restore_job.job_id, Duration::from_secs(30)).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.result.unwrap()["reboot_sent"], json!(true));

    let ops = stack.publisher.sent_ops();
    assert_eq!(ops.last().map(|s| s.as_str()), Some("reboot"));

    let _ = tx.send(true);
    jobs.join().await;
}

#[tokio::test]
async fn running_backup_stops_at_cancellation_checkpoint() {
    // Every read is silent, so the backup crawls through timeouts and the
    // cancel flag is observed between items.
    let publisher = MockPublisher::new(TransportKind::Socket, |_req, _t| MockAction::Silence);
    let stack = stack_with(publisher).await;
    let jobs = Arc::new(JobService::new(stack.storage.clone(), stack.admin.clone()));
    let (tx, rx) = tokio::sync::watch::channel(false);
    jobs.start(rx).await;

    let queued = jobs
        .queue_job(JobType::Backup, "to cancel", json!({}), Some(NODE))
        .await
        .unwrap();

    // Wait for it to start running, then request cancellation
    let mut flagged = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let job = stack.storage.job(queued.job_id).await.unwrap();
        if job.status == JobStatus::Running {
            assert!(jobs.request_cancel_running(queued.job_id).await);
            flagged = true;
            break;
        }
    }
    assert!(flagged, "job never started running");

    let job = run_to_completion(&stack, &jobs, queued.job_id, Duration::from_secs(30)).await;
    assert_eq!(job.status, JobStatus::Cancelled);

    let _ = tx.send(true);
    jobs.join().await;
}
