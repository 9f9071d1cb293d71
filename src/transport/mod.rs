//! # Transport Module
//!
//! Interchangeable publishers for the three ways an administration frame can
//! reach a node:
//!
//! - [`tcp`] — direct IP socket to a node's network API
//! - [`serial`] — USB/UART link to locally attached hardware (feature `serial`)
//! - [`mqtt`] — shared publish/subscribe radio gateway (broadcast)
//!
//! All three implement the [`Publisher`] trait and share the same receive
//! plumbing: inbound envelopes are decoded, session tokens harvested into the
//! per-target [`session::SessionTokenCache`], and replies routed to waiting
//! commands through the [`correlator::ResponseCorrelator`].
//!
//! Send never raises: a publisher that is disconnected or whose write fails
//! returns `None` from [`Publisher::send`], and callers treat that as "could
//! not dispatch" (one consumed retry attempt, never a reused command id).

pub mod correlator;
pub mod health;
pub mod mqtt;
#[cfg(feature = "serial")]
pub mod serial;
pub mod session;
pub mod tcp;

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use prost::Message;
use rand::Rng;
use thiserror::Error;

use crate::wire::{
    format_node_id, AdminReply, AdminRequest, MeshEnvelope, PortKind, RadioPayload, RouteAck,
};
use correlator::ResponseCorrelator;
use session::SessionTokenCache;

/// Which physical/logical link a publisher drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Socket,
    Serial,
    Broadcast,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Socket => "socket",
            TransportKind::Serial => "serial",
            TransportKind::Broadcast => "broadcast",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "socket" | "tcp" => Ok(TransportKind::Socket),
            "serial" | "usb" => Ok(TransportKind::Serial),
            "broadcast" | "mqtt" | "gateway" => Ok(TransportKind::Broadcast),
            other => Err(format!("unknown transport kind '{}'", other)),
        }
    }
}

/// Transport-level failures. These stay inside the engine; the admin facade
/// folds them into structured command results before anything user-visible.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("operation not supported on {0} transport")]
    UnsupportedOperation(TransportKind),
}

/// A correlated inbound reply delivered to a waiting command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Decoded administration reply from the target node.
    Admin { from: u32, message: AdminReply },
    /// Routing-level delivery report (ACK or NAK).
    Route { from: u32, ack: RouteAck },
}

impl Reply {
    pub fn from_node(&self) -> u32 {
        match self {
            Reply::Admin { from, .. } => *from,
            Reply::Route { from, .. } => *from,
        }
    }

    /// Explicit negative acknowledgement?
    pub fn is_nak(&self) -> bool {
        match self {
            Reply::Route { ack, .. } => !ack.is_ack(),
            Reply::Admin { message, .. } => {
                matches!(message.body, Some(crate::wire::admin_reply::Body::Ack(false)))
            }
        }
    }

    pub fn admin_message(&self) -> Option<&AdminReply> {
        match self {
            Reply::Admin { message, .. } => Some(message),
            Reply::Route { .. } => None,
        }
    }
}

/// Point-in-time connection health, as reported by supervised transports.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub connected: bool,
    pub missed_heartbeats: u32,
    pub seconds_since_activity: Option<u64>,
    pub reason: Option<String>,
}

/// Uniform surface over the three transports.
///
/// `send` encodes and dispatches one [`AdminRequest`] to `target`, returning
/// the command id on success and `None` on any dispatch failure (not
/// connected, write error). Callers must never retry under the same id; a
/// retry is a fresh `send`.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Human-readable endpoint (host:port, device path, broker url) for status output.
    fn descriptor(&self) -> String;

    async fn connect(&self) -> bool;

    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Node id this publisher sends as (gateway/local identity).
    fn local_node_id(&self) -> Option<u32>;

    async fn send(&self, target: u32, request: AdminRequest, want_response: bool) -> Option<u32>;

    /// Block the calling task until a reply correlated to `command_id`
    /// arrives, an uncorrelated fallback reply is claimed, or `timeout`
    /// elapses (returns `None`).
    async fn await_response(&self, command_id: u32, timeout: Duration) -> Option<Reply>;

    /// Verify the link is usable before an outbound call, reconnecting if the
    /// transport supports it. Default: connect if not connected.
    async fn ensure_healthy(&self) -> bool {
        if self.is_connected() {
            true
        } else {
            self.connect().await
        }
    }

    /// Health detail for supervised transports; `None` where unsupervised.
    fn health(&self) -> Option<HealthSnapshot> {
        None
    }
}

/// Sink for "this node answered an admin request" side effects. The
/// broadcast transport observes every frame on the gateway and records
/// responding nodes in the administrable-nodes store through this seam.
#[async_trait]
pub trait NodeSink: Send + Sync {
    async fn node_responded(&self, node: u32, firmware_version: Option<String>);
}

/// Allocate a fresh command id. Ids are random and only need to be unique
/// while outstanding; zero is reserved for "uncorrelated".
pub(crate) fn new_command_id() -> u32 {
    loop {
        let id: u32 = rand::thread_rng().gen();
        if id != 0 {
            return id;
        }
    }
}

/// Summary of one decoded inbound frame, for transports that react to
/// arbitrary traffic (the broadcast link records responding nodes).
pub(crate) struct InboundFrame {
    pub from: u32,
    pub admin_reply: bool,
    pub firmware_version: Option<String>,
}

/// Shared receive path: classify a decoded payload, harvest the session
/// token, and hand the reply to the correlator. Returns a summary for
/// transport-specific side effects.
pub(crate) fn dispatch_inbound(
    correlator: &ResponseCorrelator,
    sessions: &SessionTokenCache,
    from: u32,
    payload: &RadioPayload,
) -> Option<InboundFrame> {
    match PortKind::try_from(payload.port) {
        Ok(PortKind::Admin) => {
            let message = match AdminReply::decode(&payload.payload[..]) {
                Ok(m) => m,
                Err(e) => {
                    warn!(
                        "undecodable admin reply from {}: {}",
                        format_node_id(from),
                        e
                    );
                    return None;
                }
            };
            if !message.session_token.is_empty() {
                sessions.store(from, message.session_token.clone());
            }
            let firmware_version = match &message.body {
                Some(crate::wire::admin_reply::Body::DeviceMetadata(meta)) => {
                    Some(meta.firmware_version.clone())
                }
                _ => None,
            };
            let reply = Reply::Admin { from, message };
            if payload.request_id != 0 {
                correlator.complete(payload.request_id, reply);
            } else {
                correlator.complete_generic(reply);
            }
            Some(InboundFrame {
                from,
                admin_reply: true,
                firmware_version,
            })
        }
        Ok(PortKind::Routing) => {
            let ack = match RouteAck::decode(&payload.payload[..]) {
                Ok(a) => a,
                Err(e) => {
                    debug!("undecodable route ack from {}: {}", format_node_id(from), e);
                    return None;
                }
            };
            let request_id = ack.request_id;
            let reply = Reply::Route { from, ack };
            if request_id != 0 {
                correlator.complete(request_id, reply);
            } else {
                correlator.complete_generic(reply);
            }
            Some(InboundFrame {
                from,
                admin_reply: false,
                firmware_version: None,
            })
        }
        Ok(PortKind::Heartbeat) => None,
        _ => None,
    }
}

/// Build the standard outbound envelope for an admin request.
pub(crate) fn build_envelope(
    from: u32,
    to: u32,
    command_id: u32,
    channel: u32,
    request: &AdminRequest,
    want_response: bool,
) -> MeshEnvelope {
    MeshEnvelope {
        from,
        to,
        id: command_id,
        channel,
        want_ack: true,
        hop_limit: 3,
        body: Some(crate::wire::mesh_envelope::Body::Plain(RadioPayload {
            port: PortKind::Admin as i32,
            payload: request.encode_to_vec(),
            want_response,
            request_id: 0,
        })),
    }
}
