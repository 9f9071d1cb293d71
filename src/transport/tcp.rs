//! Socket transport: direct TCP link to a node's network API.
//!
//! One background reader task per connection feeds inbound frames through the
//! [`FrameDecoder`](crate::wire::framer::FrameDecoder) into the shared
//! dispatch path; sends go through a writer half guarded by a mutex. A
//! connect-in-progress guard serializes reconnect attempts so two callers can
//! never race two sockets into existence.
//!
//! This is the only transport with keepalive supervision (see
//! [`health`](super::health)): heartbeat frames are cheap on a direct socket
//! and let us distinguish "idle" from "dead NAT entry".

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::wire::framer::{encode_frame, FrameDecoder};
use crate::wire::{format_node_id, AdminRequest, MeshEnvelope, PortKind, RadioPayload};

use super::correlator::ResponseCorrelator;
use super::health::HealthPolicy;
use super::session::SessionTokenCache;
use super::{
    build_envelope, dispatch_inbound, new_command_id, HealthSnapshot, Publisher, Reply,
    TransportKind,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) struct TcpShared {
    host: String,
    port: u16,
    local_node: u32,
    pub(crate) correlator: ResponseCorrelator,
    sessions: SessionTokenCache,
    connected: AtomicBool,
    /// Serializes connect/reconnect sequences.
    connect_guard: Mutex<()>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    pub(crate) missed_heartbeats: AtomicU32,
    last_activity: StdMutex<Option<Instant>>,
}

impl TcpShared {
    pub(crate) fn stamp_activity(&self) {
        *self.last_activity.lock().unwrap() = Some(Instant::now());
    }

    fn seconds_since_activity(&self) -> Option<u64> {
        self.last_activity
            .lock()
            .unwrap()
            .map(|t| t.elapsed().as_secs())
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// TCP socket publisher. Cheap to clone; all clones drive the same link.
#[derive(Clone)]
pub struct TcpPublisher {
    shared: Arc<TcpShared>,
    health: HealthPolicy,
}

impl TcpPublisher {
    pub fn new(host: impl Into<String>, port: u16, local_node: u32, health: HealthPolicy) -> Self {
        TcpPublisher {
            shared: Arc::new(TcpShared {
                host: host.into(),
                port,
                local_node,
                correlator: ResponseCorrelator::new(),
                sessions: SessionTokenCache::new(),
                connected: AtomicBool::new(false),
                connect_guard: Mutex::new(()),
                writer: Mutex::new(None),
                reader_task: StdMutex::new(None),
                missed_heartbeats: AtomicU32::new(0),
                last_activity: StdMutex::new(None),
            }),
            health,
        }
    }

    pub fn health_policy(&self) -> &HealthPolicy {
        &self.health
    }

    pub(crate) fn shared(&self) -> &Arc<TcpShared> {
        &self.shared
    }

    /// Write one envelope to the socket. Returns false on any failure and
    /// marks the link disconnected so the supervisor picks it up.
    async fn write_envelope(&self, envelope: &MeshEnvelope) -> bool {
        let bytes = encode_frame(&envelope.encode_to_vec());
        let mut writer = self.shared.writer.lock().await;
        let Some(w) = writer.as_mut() else {
            return false;
        };
        if let Err(e) = w.write_all(&bytes).await {
            warn!("socket write failed: {}", e);
            self.shared.mark_disconnected();
            return false;
        }
        if let Err(e) = w.flush().await {
            warn!("socket flush failed: {}", e);
            self.shared.mark_disconnected();
            return false;
        }
        self.shared.stamp_activity();
        true
    }

    /// Probe the link with a heartbeat frame. A successful write resets the
    /// missed counter; a failure increments it.
    pub async fn send_heartbeat(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        let envelope = MeshEnvelope {
            from: self.shared.local_node,
            to: self.shared.local_node,
            id: new_command_id(),
            channel: 0,
            want_ack: false,
            hop_limit: 0,
            body: Some(crate::wire::mesh_envelope::Body::Plain(RadioPayload {
                port: PortKind::Heartbeat as i32,
                payload: Vec::new(),
                want_response: false,
                request_id: 0,
            })),
        };
        let ok = self.write_envelope(&envelope).await;
        if ok {
            self.shared.missed_heartbeats.store(0, Ordering::SeqCst);
        } else {
            self.shared.missed_heartbeats.fetch_add(1, Ordering::SeqCst);
        }
        ok
    }

    /// Tear down and reconnect within the bounded policy: disconnect under a
    /// hard timeout, settle, then up to `reconnect_attempts` connects spaced
    /// by `reconnect_wait`. Aborts promptly when `shutdown` fires.
    pub async fn reconnect(&self, shutdown: &mut tokio::sync::watch::Receiver<bool>) -> bool {
        info!(
            "reconnecting socket transport {}:{}",
            self.shared.host, self.shared.port
        );
        // Disconnect can stall on a wedged socket; cap it and force-clean.
        if tokio::time::timeout(self.health.disconnect_timeout, self.disconnect())
            .await
            .is_err()
        {
            warn!("disconnect exceeded hard timeout; forcing resource cleanup");
            self.force_cleanup();
        }

        if sleep_or_shutdown(self.health.settle_delay, shutdown).await {
            return false;
        }

        for attempt in 1..=self.health.reconnect_attempts {
            if *shutdown.borrow() {
                return false;
            }
            if self.connect().await {
                info!("reconnect succeeded on attempt {}", attempt);
                return true;
            }
            warn!(
                "reconnect attempt {}/{} failed",
                attempt, self.health.reconnect_attempts
            );
            if attempt < self.health.reconnect_attempts
                && sleep_or_shutdown(self.health.reconnect_wait, shutdown).await
            {
                return false;
            }
        }
        error!(
            "socket transport {}:{} could not be restored after {} attempts",
            self.shared.host, self.shared.port, self.health.reconnect_attempts
        );
        false
    }

    fn force_cleanup(&self) {
        if let Some(task) = self.shared.reader_task.lock().unwrap().take() {
            task.abort();
        }
        // Writer half is dropped next time the lock is taken by connect().
        self.shared.mark_disconnected();
    }
}

/// Sleep that aborts early on shutdown. Returns true if shutdown fired (a
/// closed channel counts as shutdown).
async fn sleep_or_shutdown(
    dur: Duration,
    shutdown: &mut tokio::sync::watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(dur) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[async_trait]
impl Publisher for TcpPublisher {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn descriptor(&self) -> String {
        format!("{}:{}", self.shared.host, self.shared.port)
    }

    async fn connect(&self) -> bool {
        let _guard = self.shared.connect_guard.lock().await;
        if self.is_connected() {
            return true;
        }

        let addr = format!("{}:{}", self.shared.host, self.shared.port);
        info!("connecting to node at {}", addr);
        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                error!("failed to connect to {}: {}", addr, e);
                return false;
            }
            Err(_) => {
                error!("connect to {} timed out", addr);
                return false;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed (continuing): {}", e);
        }

        let (mut read_half, write_half) = stream.into_split();
        *self.shared.writer.lock().await = Some(write_half);

        // Reader task: owns the read half until EOF/error, feeding the
        // correlator through the shared dispatch path.
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buf = [0u8; 4096];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        info!("socket closed by peer");
                        break;
                    }
                    Ok(n) => {
                        shared.stamp_activity();
                        decoder.push(&buf[..n]);
                        while let Some(frame) = decoder.next_frame() {
                            match MeshEnvelope::decode(&frame[..]) {
                                Ok(env) => {
                                    if let Some(crate::wire::mesh_envelope::Body::Plain(payload)) =
                                        &env.body
                                    {
                                        dispatch_inbound(
                                            &shared.correlator,
                                            &shared.sessions,
                                            env.from,
                                            payload,
                                        );
                                    }
                                }
                                Err(e) => debug!(
                                    "undecodable frame dropped ({}): {}",
                                    crate::logutil::hex_preview(&frame, 16),
                                    e
                                ),
                            }
                        }
                    }
                    Err(e) => {
                        warn!("socket read error: {}", e);
                        break;
                    }
                }
            }
            shared.mark_disconnected();
        });

        if let Some(old) = self.shared.reader_task.lock().unwrap().replace(task) {
            old.abort();
        }

        self.shared.connected.store(true, Ordering::SeqCst);
        self.shared.missed_heartbeats.store(0, Ordering::SeqCst);
        self.shared.stamp_activity();
        info!(
            "connected to {} as local node {}",
            addr,
            format_node_id(self.shared.local_node)
        );
        true
    }

    async fn disconnect(&self) {
        if let Some(task) = self.shared.reader_task.lock().unwrap().take() {
            task.abort();
        }
        let mut writer = self.shared.writer.lock().await;
        if let Some(mut w) = writer.take() {
            let _ = w.shutdown().await;
        }
        self.shared.mark_disconnected();
        info!("disconnected from {}:{}", self.shared.host, self.shared.port);
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn local_node_id(&self) -> Option<u32> {
        Some(self.shared.local_node)
    }

    async fn send(&self, target: u32, mut request: AdminRequest, want_response: bool) -> Option<u32> {
        if !self.is_connected() {
            warn!("cannot send {}: socket not connected", request.op_name());
            return None;
        }
        request.session_token = self.shared.sessions.token_for(target);

        let command_id = new_command_id();
        let envelope = build_envelope(
            self.shared.local_node,
            target,
            command_id,
            0,
            &request,
            want_response,
        );
        if want_response {
            self.shared.correlator.register(command_id);
        }
        if !self.write_envelope(&envelope).await {
            self.shared.correlator.unregister(command_id);
            return None;
        }
        debug!(
            "sent {} to {} command_id={:08x}",
            request.op_name(),
            format_node_id(target),
            command_id
        );
        Some(command_id)
    }

    async fn await_response(&self, command_id: u32, timeout: Duration) -> Option<Reply> {
        self.shared.correlator.await_response(command_id, timeout).await
    }

    /// Thorough pre-send check: connect if needed, verify with a heartbeat,
    /// and run the bounded reconnect sequence if the probe fails.
    async fn ensure_healthy(&self) -> bool {
        if !self.is_connected() && !self.connect().await {
            return false;
        }
        if self.send_heartbeat().await {
            return true;
        }
        warn!("socket connection unhealthy; attempting recovery");
        // A manual recovery outside the supervisor is not shutdown-aware;
        // use a dummy receiver that never fires.
        let (_tx, mut rx) = tokio::sync::watch::channel(false);
        if self.reconnect(&mut rx).await {
            return self.send_heartbeat().await;
        }
        false
    }

    fn health(&self) -> Option<HealthSnapshot> {
        let missed = self.shared.missed_heartbeats.load(Ordering::SeqCst);
        let connected = self.is_connected();
        Some(HealthSnapshot {
            healthy: connected && missed < self.health.max_missed_heartbeats,
            connected,
            missed_heartbeats: missed,
            seconds_since_activity: self.shared.seconds_since_activity(),
            reason: if connected {
                None
            } else {
                Some("not connected".to_string())
            },
        })
    }
}
