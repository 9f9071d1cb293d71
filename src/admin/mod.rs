//! # Admin Facade Module
//!
//! One call per remote-administration operation. Every method resolves the
//! admin-designated publisher, writes a pending audit row, runs the exchange
//! under the operation's policy, finalizes the audit row exactly once, and
//! returns a structured [`CommandResult`] — failures are data, never raised
//! errors crossing this boundary.
//!
//! ## Operation classes
//!
//! | class        | operations                                  | policy |
//! |--------------|---------------------------------------------|--------|
//! | read         | metadata, config, module config, channel    | bounded retry (default 3 × 30s, 2s apart) |
//! | write        | set config / module config / channel        | single attempt, 10s wait; **silence is soft success** |
//! | dispatch     | reboot, shutdown                            | fire-and-forget |
//! | transaction  | begin / commit edit settings                | socket only, explicit ack required |
//! | destructive  | remove node, nodedb reset, factory resets   | socket only, single attempt |
//!
//! The write class deliberately treats a missing acknowledgement as "likely
//! applied": store-and-forward mesh delivery loses ACKs far more often than
//! it loses the write itself. An explicit negative acknowledgement is still
//! a hard failure.

pub mod catalog;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;
use serde_json::json;

use crate::connections::ConnectionManager;
use crate::storage::{CommandStatus, Storage};
use crate::transport::{Publisher, Reply, TransportKind};
use crate::wire::{
    admin_reply, admin_request, format_node_id, AdminRequest, ChannelSettings, ConfigPayload,
    DeviceMetadata, ModulePayload, CHANNEL_SLOTS,
};

use catalog::{ConfigKind, ModuleKind};
use retry::{run_with_retry, AttemptRecord, RetryOutcome, RetryPolicy};

/// Default wait for write-class and transaction commands.
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Uniform result of one admin operation.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempts consumed (0 when nothing was dispatched).
    pub attempts: u32,
    /// Per-attempt log for multi-attempt calls.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retry_info: Vec<AttemptRecord>,
    /// Write-class only: whether the node positively acknowledged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged: Option<bool>,
}

impl CommandResult {
    fn failure(error: impl Into<String>) -> Self {
        CommandResult {
            success: false,
            command_id: None,
            log_id: None,
            response: None,
            error: Some(error.into()),
            attempts: 0,
            retry_info: Vec::new(),
            acknowledged: None,
        }
    }

    fn success_with(response: serde_json::Value) -> Self {
        CommandResult {
            success: true,
            command_id: None,
            log_id: None,
            response: Some(response),
            error: None,
            attempts: 0,
            retry_info: Vec::new(),
            acknowledged: None,
        }
    }
}

/// High-level remote administration service.
///
/// Explicitly constructed by the composition root and shared via `Arc`; it
/// owns no global state and can be instantiated freely in tests.
pub struct AdminService {
    connections: Arc<ConnectionManager>,
    storage: Arc<Storage>,
    read_policy: RetryPolicy,
    write_wait: Duration,
}

impl AdminService {
    pub fn new(connections: Arc<ConnectionManager>, storage: Arc<Storage>) -> Self {
        AdminService {
            connections,
            storage,
            read_policy: RetryPolicy::default(),
            write_wait: WRITE_WAIT,
        }
    }

    pub fn with_read_policy(mut self, policy: RetryPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    pub fn with_write_wait(mut self, wait: Duration) -> Self {
        self.write_wait = wait;
        self
    }

    pub fn read_policy(&self) -> &RetryPolicy {
        &self.read_policy
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Transport used for sequencing decisions (pacing between job items).
    pub fn active_transport(&self) -> Option<TransportKind> {
        self.connections.admin_publisher().map(|p| p.kind())
    }

    fn admin_publisher(&self) -> Result<Arc<dyn Publisher>, String> {
        self.connections
            .admin_publisher()
            .ok_or_else(|| "no admin connection configured".to_string())
    }

    async fn log(&self, target: u32, command_type: &str, request: serde_json::Value) -> Option<u64> {
        match self.storage.log_command(target, command_type, request).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("audit insert failed for {}: {}", command_type, e);
                None
            }
        }
    }

    async fn finalize(
        &self,
        log_id: Option<u64>,
        status: CommandStatus,
        response: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        if let Some(id) = log_id {
            if let Err(e) = self.storage.finalize_command(id, status, response, error).await {
                warn!("audit finalize failed for entry {}: {}", id, e);
            }
        }
    }

    // --- read class --------------------------------------------------------

    async fn execute_read<T: Serialize>(
        &self,
        target: u32,
        command_type: &str,
        audit_request: serde_json::Value,
        op: admin_request::Op,
        parse: impl FnMut(&Reply) -> Option<T>,
        policy: Option<RetryPolicy>,
    ) -> CommandResult {
        let publisher = match self.admin_publisher() {
            Ok(p) => p,
            Err(msg) => return CommandResult::failure(msg),
        };
        let log_id = self.log(target, command_type, audit_request).await;

        if !publisher.ensure_healthy().await {
            let msg = format!(
                "transport unavailable: {} connection could not be established",
                publisher.kind()
            );
            self.finalize(log_id, CommandStatus::Failed, None, Some(msg.clone()))
                .await;
            let mut result = CommandResult::failure(msg);
            result.log_id = log_id;
            return result;
        }

        let policy = policy.unwrap_or_else(|| self.read_policy.clone());
        let attempt_timeout = policy.attempt_timeout;
        let send_publisher = publisher.clone();
        let wait_publisher = publisher.clone();
        let send_op = op;
        let outcome: RetryOutcome<T> = run_with_retry(
            &policy,
            move || {
                let p = send_publisher.clone();
                let op = send_op.clone();
                async move { p.send(target, AdminRequest::new(op), true).await }
            },
            move |command_id| {
                let p = wait_publisher.clone();
                async move { p.await_response(command_id, attempt_timeout).await }
            },
            parse,
        )
        .await;

        let attempts = outcome.attempts.len() as u32;
        if outcome.success {
            let response = outcome
                .value
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok());
            self.finalize(log_id, CommandStatus::Success, response.clone(), None)
                .await;
            return CommandResult {
                success: true,
                command_id: outcome.command_id,
                log_id,
                response,
                error: None,
                attempts,
                retry_info: outcome.attempts,
                acknowledged: None,
            };
        }

        let (status, error) = if outcome.all_timeouts() {
            (
                CommandStatus::Timeout,
                format!(
                    "no response received after {} attempt(s) (timeout)",
                    attempts
                ),
            )
        } else {
            (
                CommandStatus::Failed,
                format!(
                    "command failed after {} attempt(s) via {}",
                    attempts,
                    publisher.kind()
                ),
            )
        };
        self.finalize(log_id, status, None, Some(error.clone())).await;
        CommandResult {
            success: false,
            command_id: outcome.command_id,
            log_id,
            response: None,
            error: Some(error),
            attempts,
            retry_info: outcome.attempts,
            acknowledged: None,
        }
    }

    /// Request device metadata. A response both proves the node is
    /// administrable (recorded with its firmware version) and returns the
    /// metadata itself.
    pub async fn get_device_metadata(
        &self,
        target: u32,
        policy: Option<RetryPolicy>,
    ) -> CommandResult {
        let result = self
            .execute_read::<DeviceMetadata>(
                target,
                "get_device_metadata",
                json!({"action": "get_device_metadata"}),
                admin_request::Op::GetDeviceMetadata(true),
                |reply| match reply.admin_message()?.body.as_ref()? {
                    admin_reply::Body::DeviceMetadata(meta) => Some(meta.clone()),
                    _ => None,
                },
                policy,
            )
            .await;

        if result.success {
            let firmware = result
                .response
                .as_ref()
                .and_then(|r| r.get("firmware_version"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            info!(
                "node {} is administrable (firmware {})",
                format_node_id(target),
                crate::logutil::escape_log(firmware.as_deref().unwrap_or("unknown"))
            );
            if let Err(e) = self.storage.mark_node_administrable(target, firmware).await {
                warn!("failed to record administrable node: {}", e);
            }
        }
        result
    }

    /// Convenience probe used by the UI/CLI "test node" action.
    pub async fn test_node(&self, target: u32) -> CommandResult {
        self.get_device_metadata(target, None).await
    }

    pub async fn get_config(
        &self,
        target: u32,
        kind: ConfigKind,
        policy: Option<RetryPolicy>,
    ) -> CommandResult {
        self.execute_read::<ConfigPayload>(
            target,
            "get_config",
            json!({"config_type": kind.as_str()}),
            admin_request::Op::GetConfig(kind.wire_value()),
            move |reply| match reply.admin_message()?.body.as_ref()? {
                admin_reply::Body::Config(payload) if kind.matches(payload) => {
                    Some(payload.clone())
                }
                _ => None,
            },
            policy,
        )
        .await
    }

    pub async fn get_module_config(
        &self,
        target: u32,
        kind: ModuleKind,
        policy: Option<RetryPolicy>,
    ) -> CommandResult {
        self.execute_read::<ModulePayload>(
            target,
            "get_module_config",
            json!({"module_type": kind.as_str()}),
            admin_request::Op::GetModuleConfig(kind.wire_value()),
            move |reply| match reply.admin_message()?.body.as_ref()? {
                admin_reply::Body::ModuleConfig(payload) if kind.matches(payload) => {
                    Some(payload.clone())
                }
                _ => None,
            },
            policy,
        )
        .await
    }

    /// Fetch one channel slot. Callers address slots 0–7; the wire value is
    /// 1-based so the request can distinguish "slot 0" from "unset".
    pub async fn get_channel(
        &self,
        target: u32,
        channel_index: u32,
        policy: Option<RetryPolicy>,
    ) -> CommandResult {
        if channel_index >= CHANNEL_SLOTS {
            return CommandResult::failure(format!(
                "channel index {} out of range (0-{})",
                channel_index,
                CHANNEL_SLOTS - 1
            ));
        }
        self.execute_read::<ChannelSettings>(
            target,
            "get_channel",
            json!({"channel_index": channel_index}),
            admin_request::Op::GetChannel(channel_index + 1),
            move |reply| match reply.admin_message()?.body.as_ref()? {
                admin_reply::Body::Channel(ch) if ch.index == channel_index => Some(ch.clone()),
                _ => None,
            },
            policy,
        )
        .await
    }

    // --- write class -------------------------------------------------------

    /// Single-attempt write. An explicit NAK is a hard failure; silence
    /// within the wait window is a soft success ("likely applied") because
    /// store-and-forward delivery frequently drops the acknowledgement.
    async fn execute_write(
        &self,
        target: u32,
        command_type: &str,
        audit_request: serde_json::Value,
        op: admin_request::Op,
    ) -> CommandResult {
        let publisher = match self.admin_publisher() {
            Ok(p) => p,
            Err(msg) => return CommandResult::failure(msg),
        };
        let log_id = self.log(target, command_type, audit_request).await;

        if !publisher.ensure_healthy().await {
            let msg = format!("transport unavailable via {}", publisher.kind());
            self.finalize(log_id, CommandStatus::Failed, None, Some(msg.clone()))
                .await;
            let mut result = CommandResult::failure(msg);
            result.log_id = log_id;
            return result;
        }

        let Some(command_id) = publisher.send(target, AdminRequest::new(op), true).await else {
            let msg = format!("failed to dispatch {} via {}", command_type, publisher.kind());
            self.finalize(log_id, CommandStatus::Failed, None, Some(msg.clone()))
                .await;
            let mut result = CommandResult::failure(msg);
            result.log_id = log_id;
            return result;
        };

        match publisher.await_response(command_id, self.write_wait).await {
            Some(reply) if reply.is_nak() => {
                let reason = match &reply {
                    Reply::Route { ack, .. } => ack.reason().to_string(),
                    _ => "rejected".to_string(),
                };
                let msg = format!("node rejected {}: {}", command_type, reason);
                self.finalize(log_id, CommandStatus::Failed, None, Some(msg.clone()))
                    .await;
                CommandResult {
                    success: false,
                    command_id: Some(command_id),
                    log_id,
                    response: None,
                    error: Some(msg),
                    attempts: 1,
                    retry_info: Vec::new(),
                    acknowledged: Some(false),
                }
            }
            Some(_reply) => {
                let response = json!({"message": format!("{} applied (acknowledged)", command_type)});
                self.finalize(log_id, CommandStatus::Success, Some(response.clone()), None)
                    .await;
                CommandResult {
                    success: true,
                    command_id: Some(command_id),
                    log_id,
                    response: Some(response),
                    error: None,
                    attempts: 1,
                    retry_info: Vec::new(),
                    acknowledged: Some(true),
                }
            }
            None => {
                let response = json!({
                    "message": format!(
                        "{} sent, no ACK within {}s; change likely applied",
                        command_type,
                        self.write_wait.as_secs()
                    )
                });
                self.finalize(log_id, CommandStatus::Success, Some(response.clone()), None)
                    .await;
                CommandResult {
                    success: true,
                    command_id: Some(command_id),
                    log_id,
                    response: Some(response),
                    error: None,
                    attempts: 1,
                    retry_info: Vec::new(),
                    acknowledged: Some(false),
                }
            }
        }
    }

    pub async fn set_config(&self, target: u32, payload: ConfigPayload) -> CommandResult {
        let kind = ConfigKind::of(&payload);
        let audit = json!({
            "config_type": kind.map(|k| k.as_str()),
            "config": serde_json::to_value(&payload).unwrap_or_default(),
        });
        if kind.is_none() {
            return CommandResult::failure("set_config payload carries no category");
        }
        self.execute_write(target, "set_config", audit, admin_request::Op::SetConfig(payload))
            .await
    }

    pub async fn set_module_config(&self, target: u32, payload: ModulePayload) -> CommandResult {
        let kind = ModuleKind::of(&payload);
        let audit = json!({
            "module_type": kind.map(|k| k.as_str()),
            "config": serde_json::to_value(&payload).unwrap_or_default(),
        });
        if kind.is_none() {
            return CommandResult::failure("set_module_config payload carries no category");
        }
        self.execute_write(
            target,
            "set_module_config",
            audit,
            admin_request::Op::SetModuleConfig(payload),
        )
        .await
    }

    pub async fn set_channel(&self, target: u32, settings: ChannelSettings) -> CommandResult {
        if settings.index >= CHANNEL_SLOTS {
            return CommandResult::failure(format!(
                "channel index {} out of range (0-{})",
                settings.index,
                CHANNEL_SLOTS - 1
            ));
        }
        let audit = json!({
            "channel_index": settings.index,
            "channel": serde_json::to_value(&settings).unwrap_or_default(),
        });
        self.execute_write(target, "set_channel", audit, admin_request::Op::SetChannel(settings))
            .await
    }

    // --- dispatch class ----------------------------------------------------

    /// Fire-and-forget. Success means "dispatched", never "confirmed": nodes
    /// do not answer a command that powers them down.
    async fn execute_dispatch(
        &self,
        target: u32,
        command_type: &str,
        audit_request: serde_json::Value,
        op: admin_request::Op,
        done_message: String,
    ) -> CommandResult {
        let publisher = match self.admin_publisher() {
            Ok(p) => p,
            Err(msg) => return CommandResult::failure(msg),
        };
        let log_id = self.log(target, command_type, audit_request).await;

        if !publisher.ensure_healthy().await {
            let msg = format!("transport unavailable via {}", publisher.kind());
            self.finalize(log_id, CommandStatus::Failed, None, Some(msg.clone()))
                .await;
            let mut result = CommandResult::failure(msg);
            result.log_id = log_id;
            return result;
        }

        let Some(command_id) = publisher.send(target, AdminRequest::new(op), false).await else {
            let msg = format!("failed to dispatch {} via {}", command_type, publisher.kind());
            self.finalize(log_id, CommandStatus::Failed, None, Some(msg.clone()))
                .await;
            let mut result = CommandResult::failure(msg);
            result.log_id = log_id;
            return result;
        };

        let response = json!({ "message": done_message });
        self.finalize(log_id, CommandStatus::Success, Some(response.clone()), None)
            .await;
        let mut result = CommandResult::success_with(response);
        result.command_id = Some(command_id);
        result.log_id = log_id;
        result.attempts = 1;
        result
    }

    pub async fn reboot_node(&self, target: u32, delay_seconds: u32) -> CommandResult {
        self.execute_dispatch(
            target,
            "reboot",
            json!({"delay_seconds": delay_seconds}),
            admin_request::Op::RebootSeconds(delay_seconds),
            format!("reboot dispatched; node restarts in {}s", delay_seconds),
        )
        .await
    }

    pub async fn shutdown_node(&self, target: u32, delay_seconds: u32) -> CommandResult {
        self.execute_dispatch(
            target,
            "shutdown",
            json!({"delay_seconds": delay_seconds}),
            admin_request::Op::ShutdownSeconds(delay_seconds),
            format!("shutdown dispatched; node powers off in {}s", delay_seconds),
        )
        .await
    }

    // --- socket-only classes -----------------------------------------------

    fn require_socket(&self, command_type: &str) -> Result<Arc<dyn Publisher>, CommandResult> {
        let publisher = match self.admin_publisher() {
            Ok(p) => p,
            Err(msg) => return Err(CommandResult::failure(msg)),
        };
        if publisher.kind() != TransportKind::Socket {
            return Err(CommandResult::failure(format!(
                "{} is not supported on the {} transport",
                command_type,
                publisher.kind()
            )));
        }
        Ok(publisher)
    }

    /// Transaction bracket and destructive commands: single attempt on the
    /// socket transport, explicit positive acknowledgement required.
    async fn execute_acknowledged(
        &self,
        target: u32,
        command_type: &str,
        audit_request: serde_json::Value,
        op: admin_request::Op,
        wait: Duration,
    ) -> CommandResult {
        let publisher = match self.require_socket(command_type) {
            Ok(p) => p,
            Err(result) => return result,
        };
        let log_id = self.log(target, command_type, audit_request).await;

        if !publisher.ensure_healthy().await {
            let msg = "transport unavailable via socket".to_string();
            self.finalize(log_id, CommandStatus::Failed, None, Some(msg.clone()))
                .await;
            let mut result = CommandResult::failure(msg);
            result.log_id = log_id;
            return result;
        }

        let Some(command_id) = publisher.send(target, AdminRequest::new(op), true).await else {
            let msg = format!("failed to dispatch {} via socket", command_type);
            self.finalize(log_id, CommandStatus::Failed, None, Some(msg.clone()))
                .await;
            let mut result = CommandResult::failure(msg);
            result.log_id = log_id;
            return result;
        };

        match publisher.await_response(command_id, wait).await {
            Some(reply) if !reply.is_nak() => {
                let response = json!({"message": format!("{} acknowledged", command_type)});
                self.finalize(log_id, CommandStatus::Success, Some(response.clone()), None)
                    .await;
                let mut result = CommandResult::success_with(response);
                result.command_id = Some(command_id);
                result.log_id = log_id;
                result.attempts = 1;
                result.acknowledged = Some(true);
                result
            }
            Some(reply) => {
                let reason = match &reply {
                    Reply::Route { ack, .. } => ack.reason().to_string(),
                    _ => "rejected".to_string(),
                };
                let msg = format!("node rejected {}: {}", command_type, reason);
                self.finalize(log_id, CommandStatus::Failed, None, Some(msg.clone()))
                    .await;
                let mut result = CommandResult::failure(msg);
                result.command_id = Some(command_id);
                result.log_id = log_id;
                result.attempts = 1;
                result.acknowledged = Some(false);
                result
            }
            None => {
                let msg = format!(
                    "no acknowledgement for {} within {}s",
                    command_type,
                    wait.as_secs()
                );
                self.finalize(log_id, CommandStatus::Timeout, None, Some(msg.clone()))
                    .await;
                let mut result = CommandResult::failure(msg);
                result.command_id = Some(command_id);
                result.log_id = log_id;
                result.attempts = 1;
                result.acknowledged = Some(false);
                result
            }
        }
    }

    /// Open an edit transaction: the node buffers subsequent set-* calls in
    /// memory until `commit_edit_settings` applies them atomically.
    pub async fn begin_edit_settings(&self, target: u32) -> CommandResult {
        self.execute_acknowledged(
            target,
            "begin_edit_settings",
            json!({}),
            admin_request::Op::BeginEditSettings(true),
            self.write_wait,
        )
        .await
    }

    pub async fn commit_edit_settings(&self, target: u32) -> CommandResult {
        self.execute_acknowledged(
            target,
            "commit_edit_settings",
            json!({}),
            admin_request::Op::CommitEditSettings(true),
            self.write_wait,
        )
        .await
    }

    /// Ask `target` to drop `node` from its node database.
    pub async fn remove_node(&self, target: u32, node: u32) -> CommandResult {
        self.execute_acknowledged(
            target,
            "remove_node",
            json!({"node": format_node_id(node)}),
            admin_request::Op::RemoveNode(node),
            self.read_policy.attempt_timeout,
        )
        .await
    }

    pub async fn reset_nodedb(&self, target: u32) -> CommandResult {
        self.execute_acknowledged(
            target,
            "nodedb_reset",
            json!({}),
            admin_request::Op::NodedbReset(true),
            self.read_policy.attempt_timeout,
        )
        .await
    }

    pub async fn factory_reset_config(&self, target: u32) -> CommandResult {
        self.execute_acknowledged(
            target,
            "factory_reset_config",
            json!({}),
            admin_request::Op::FactoryResetConfig(true),
            self.read_policy.attempt_timeout,
        )
        .await
    }

    pub async fn factory_reset_device(&self, target: u32) -> CommandResult {
        self.execute_acknowledged(
            target,
            "factory_reset_device",
            json!({}),
            admin_request::Op::FactoryResetDevice(true),
            self.read_policy.attempt_timeout,
        )
        .await
    }

    // --- status ------------------------------------------------------------

    /// Aggregate connection status for the CLI / job decisions.
    pub async fn connection_status(&self) -> serde_json::Value {
        self.connections.status()
    }
}
