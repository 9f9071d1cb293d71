//! Connection health supervision for the socket transport.
//!
//! A background loop probes the link with heartbeat frames. Misses are
//! counted; after `max_missed_heartbeats` consecutive failures the link is
//! declared dead and the bounded reconnect sequence runs. All waits abort
//! promptly when the shutdown signal fires.

use std::sync::atomic::Ordering;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::tcp::TcpPublisher;
use super::Publisher;

/// Tunables for heartbeat supervision and recovery.
#[derive(Debug, Clone)]
pub struct HealthPolicy {
    pub heartbeat_interval: Duration,
    pub max_missed_heartbeats: u32,
    pub reconnect_attempts: u32,
    pub reconnect_wait: Duration,
    /// Hard cap on how long a disconnect may take before resources are
    /// force-cleaned.
    pub disconnect_timeout: Duration,
    /// Pause between disconnect and the first reconnect attempt.
    pub settle_delay: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        HealthPolicy {
            heartbeat_interval: Duration::from_secs(30),
            max_missed_heartbeats: 3,
            reconnect_attempts: 3,
            reconnect_wait: Duration::from_secs(5),
            disconnect_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Spawn the heartbeat loop for a socket publisher. The task runs until the
/// shutdown signal flips true.
pub fn spawn_supervisor(
    publisher: TcpPublisher,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let policy = publisher.health_policy().clone();
    tokio::spawn(async move {
        info!(
            "health supervisor started (interval {:?}, {} misses tolerated)",
            policy.heartbeat_interval, policy.max_missed_heartbeats
        );
        let mut ticker = tokio::time::interval(policy.heartbeat_interval);
        // First tick fires immediately; skip it so a fresh connection is not
        // probed before it finishes its handshake.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if !publisher.is_connected() {
                continue;
            }

            if publisher.send_heartbeat().await {
                continue;
            }

            let missed = publisher
                .shared()
                .missed_heartbeats
                .load(Ordering::SeqCst);
            warn!(
                "heartbeat failed ({}/{})",
                missed, policy.max_missed_heartbeats
            );
            if missed >= policy.max_missed_heartbeats {
                warn!(
                    "connection presumed dead after {} missed heartbeats; recovering",
                    missed
                );
                if !publisher.reconnect(&mut shutdown).await {
                    // Bounded recovery exhausted (or shutdown fired). The
                    // link stays down until an outbound call runs
                    // ensure_healthy, which reuses the same sequence.
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("health supervisor stopped");
    })
}
