//! Bounded retry orchestration for read-class admin commands.
//!
//! One attempt = dispatch, then wait for a reply up to the per-attempt
//! timeout. A dispatch that fails outright (no command id) still consumes an
//! attempt. The loop stops on the first attempt whose reply parses to a
//! value; otherwise all attempts are consumed and the caller gets the full
//! per-attempt log for the audit trail.

use std::future::Future;
use std::time::Duration;

use log::debug;
use serde::Serialize;

use crate::transport::Reply;

/// Retry tunables. The default (3 attempts, 30s per attempt, 2s between)
/// suits multi-hop mesh paths; callers override per command.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt with the given wait, no inter-attempt delay. Used for
    /// write-class commands.
    pub fn single(wait: Duration) -> Self {
        RetryPolicy {
            max_attempts: 1,
            attempt_timeout: wait,
            retry_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Transport returned no command id; nothing was dispatched.
    SendFailed,
    /// Dispatched but no reply within the attempt timeout.
    Timeout,
    /// A reply arrived but did not parse to a usable result.
    ParseFailed,
    Success,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub status: AttemptStatus,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate outcome of a retried exchange.
pub struct RetryOutcome<T> {
    pub success: bool,
    pub value: Option<T>,
    /// Command id of the attempt that produced the result (or the last one).
    pub command_id: Option<u32>,
    pub attempts: Vec<AttemptRecord>,
}

impl<T> RetryOutcome<T> {
    /// True when every consumed attempt timed out (distinguishes "node is
    /// silent" from "could not dispatch" in the audit log).
    pub fn all_timeouts(&self) -> bool {
        !self.attempts.is_empty()
            && self
                .attempts
                .iter()
                .all(|a| a.status == AttemptStatus::Timeout)
    }
}

/// Run `send` + `wait` under `policy`, classifying each attempt.
///
/// * `send()` dispatches a fresh command and yields its id, or `None` on
///   dispatch failure — each call uses a new id, never a reused one.
/// * `wait(command_id)` resolves to the correlated reply or `None` on
///   timeout (the closure applies `policy.attempt_timeout`).
/// * `parse(&reply)` extracts the typed result; `None` marks the attempt
///   `parse_failed` and the loop continues.
pub async fn run_with_retry<T, S, SF, W, WF, P>(
    policy: &RetryPolicy,
    mut send: S,
    mut wait: W,
    mut parse: P,
) -> RetryOutcome<T>
where
    S: FnMut() -> SF,
    SF: Future<Output = Option<u32>>,
    W: FnMut(u32) -> WF,
    WF: Future<Output = Option<Reply>>,
    P: FnMut(&Reply) -> Option<T>,
{
    let mut attempts = Vec::with_capacity(policy.max_attempts as usize);
    let mut last_command_id = None;

    for attempt in 1..=policy.max_attempts.max(1) {
        let started = tokio::time::Instant::now();

        let command_id = match send().await {
            Some(id) => id,
            None => {
                attempts.push(AttemptRecord {
                    attempt,
                    status: AttemptStatus::SendFailed,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    detail: Some("dispatch failed".to_string()),
                });
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.retry_delay).await;
                }
                continue;
            }
        };
        last_command_id = Some(command_id);

        match wait(command_id).await {
            Some(reply) => match parse(&reply) {
                Some(value) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        status: AttemptStatus::Success,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        detail: None,
                    });
                    return RetryOutcome {
                        success: true,
                        value: Some(value),
                        command_id: last_command_id,
                        attempts,
                    };
                }
                None => {
                    debug!(
                        "attempt {}: reply received but not interpretable",
                        attempt
                    );
                    attempts.push(AttemptRecord {
                        attempt,
                        status: AttemptStatus::ParseFailed,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        detail: Some("response received but uninterpretable".to_string()),
                    });
                }
            },
            None => {
                attempts.push(AttemptRecord {
                    attempt,
                    status: AttemptStatus::Timeout,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    detail: Some(format!(
                        "no response within {}s",
                        policy.attempt_timeout.as_secs()
                    )),
                });
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    RetryOutcome {
        success: false,
        value: None,
        command_id: last_command_id,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::wire::AdminReply;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            attempt_timeout: Duration::from_millis(50),
            retry_delay: Duration::from_millis(1),
        }
    }

    fn ok_reply() -> Reply {
        Reply::Admin {
            from: 1,
            message: AdminReply::default(),
        }
    }

    #[tokio::test]
    async fn dispatch_failure_consumes_all_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let outcome: RetryOutcome<()> = run_with_retry(
            &fast_policy(3),
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    None
                }
            },
            |_id| async move { None },
            |_r| Some(()),
        )
        .await;

        assert!(!outcome.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome
            .attempts
            .iter()
            .all(|a| a.status == AttemptStatus::SendFailed));
    }

    #[tokio::test]
    async fn stops_on_kth_success() {
        let parses = Arc::new(AtomicU32::new(0));
        let p = parses.clone();
        let outcome = run_with_retry(
            &fast_policy(5),
            || async move { Some(7) },
            |_id| async move { Some(ok_reply()) },
            // Only the 3rd reply is acceptable
            move |_r| {
                if p.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                    Some(42u32)
                } else {
                    None
                }
            },
        )
        .await;

        assert!(outcome.success);
        assert_eq!(outcome.value, Some(42));
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(parses.load(Ordering::SeqCst), 3);
        assert_eq!(
            outcome.attempts.last().unwrap().status,
            AttemptStatus::Success
        );
    }

    #[tokio::test]
    async fn timeouts_then_success_are_logged_in_order() {
        let attempt_no = Arc::new(AtomicU32::new(0));
        let a = attempt_no.clone();
        let outcome = run_with_retry(
            &fast_policy(3),
            || async move { Some(7) },
            move |_id| {
                let a = a.clone();
                async move {
                    if a.fetch_add(1, Ordering::SeqCst) < 2 {
                        None // first two attempts time out
                    } else {
                        Some(ok_reply())
                    }
                }
            },
            |_r| Some("payload".to_string()),
        )
        .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts.len(), 3);
        let statuses: Vec<AttemptStatus> = outcome.attempts.iter().map(|a| a.status).collect();
        assert_eq!(
            statuses,
            vec![
                AttemptStatus::Timeout,
                AttemptStatus::Timeout,
                AttemptStatus::Success
            ]
        );
    }

    #[tokio::test]
    async fn all_timeouts_is_detected() {
        let outcome: RetryOutcome<()> = run_with_retry(
            &fast_policy(2),
            || async move { Some(1) },
            |_id| async move { None },
            |_r| Some(()),
        )
        .await;
        assert!(!outcome.success);
        assert!(outcome.all_timeouts());
    }
}
