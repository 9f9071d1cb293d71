//! Job handlers: the command sequences behind each job type.
//!
//! Every handler is a bounded sequence of admin facade calls with a
//! cancellation checkpoint between items and per-item progress reporting.
//! Partial success is the normal aggregate outcome for backup and restore:
//! individual item failures are listed, and the job succeeds as long as at
//! least one item went through.

use std::collections::BTreeMap;
use std::time::Duration;

use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::admin::catalog::{
    config_payload_from_json, module_payload_from_json, ConfigKind, ModuleKind,
};
use crate::admin::AdminService;
use crate::storage::{JobRecord, Storage};
use crate::transport::TransportKind;
use crate::wire::{format_node_id, ChannelSettings, ConfigPayload, ModulePayload, CHANNEL_SLOTS};

use super::{JobCancelled, JobContext, JobOutcome};

/// Items per full backup sweep: 8 core + 13 module + 8 channels.
const BACKUP_ITEMS: usize = ConfigKind::ALL.len() + ModuleKind::ALL.len() + CHANNEL_SLOTS as usize;

fn percent(current: usize, total: usize) -> u8 {
    ((current * 100) / total.max(1)).min(100) as u8
}

/// Pause between sequenced commands so a burst does not congest the mesh.
/// Direct links need none; the broadcast gateway gets a conservative gap.
fn pacing_delay(override_ms: Option<u64>, transport: Option<TransportKind>) -> Duration {
    if let Some(ms) = override_ms {
        return Duration::from_millis(ms);
    }
    match transport {
        Some(TransportKind::Socket) | Some(TransportKind::Serial) => Duration::ZERO,
        _ => Duration::from_millis(1500),
    }
}

fn missing_target() -> Result<JobOutcome, JobCancelled> {
    Ok(JobOutcome::fail("job has no target node", None))
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BackupParams {
    #[serde(default = "default_backup_name")]
    backup_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    inter_request_delay_ms: Option<u64>,
}

fn default_backup_name() -> String {
    "Backup".to_string()
}

/// Sweep every core config, module config, and channel slot of the target
/// node into one stored backup record.
pub async fn run_backup(
    admin: &AdminService,
    storage: &Storage,
    job: &JobRecord,
    ctx: &JobContext,
) -> Result<JobOutcome, JobCancelled> {
    let Some(node) = job.target_node else {
        return missing_target();
    };
    let params: BackupParams = serde_json::from_value(job.params.clone()).unwrap_or(BackupParams {
        backup_name: default_backup_name(),
        description: String::new(),
        inter_request_delay_ms: None,
    });
    let delay = pacing_delay(params.inter_request_delay_ms, admin.active_transport());

    let mut core_configs: BTreeMap<String, ConfigPayload> = BTreeMap::new();
    let mut module_configs: BTreeMap<String, ModulePayload> = BTreeMap::new();
    let mut channels: BTreeMap<String, ChannelSettings> = BTreeMap::new();
    let mut successful: Vec<String> = Vec::new();
    let mut failed: Vec<String> = Vec::new();
    let mut item = 0usize;

    ctx.update(0, format!("Backing up {}", format_node_id(node))).await;

    for kind in ConfigKind::ALL {
        ctx.checkpoint().await?;
        item += 1;
        let pct = percent(item, BACKUP_ITEMS);
        ctx.update(pct, format!("Fetching {} config", kind)).await;

        let result = admin.get_config(node, kind, None).await;
        if result.success {
            if let Some(payload) = result
                .response
                .and_then(|v| serde_json::from_value::<ConfigPayload>(v).ok())
            {
                core_configs.insert(kind.as_str().to_string(), payload);
                successful.push(format!("core:{}", kind));
                ctx.update(pct, format!("{} config retrieved", kind)).await;
            } else {
                failed.push(format!("core:{}: unreadable response", kind));
                ctx.report_error(pct, format!("{} config unreadable", kind)).await;
            }
        } else {
            let detail = result.error.unwrap_or_else(|| "unknown error".to_string());
            failed.push(format!("core:{}: {}", kind, detail));
            ctx.report_error(pct, format!("{} config failed: {}", kind, detail))
                .await;
        }
        if item < BACKUP_ITEMS && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    for kind in ModuleKind::ALL {
        ctx.checkpoint().await?;
        item += 1;
        let pct = percent(item, BACKUP_ITEMS);
        ctx.update(pct, format!("Fetching {} module", kind)).await;

        let result = admin.get_module_config(node, kind, None).await;
        if result.success {
            if let Some(payload) = result
                .response
                .and_then(|v| serde_json::from_value::<ModulePayload>(v).ok())
            {
                module_configs.insert(kind.as_str().to_string(), payload);
                successful.push(format!("module:{}", kind));
                ctx.update(pct, format!("{} module retrieved", kind)).await;
            } else {
                failed.push(format!("module:{}: unreadable response", kind));
                ctx.report_error(pct, format!("{} module unreadable", kind)).await;
            }
        } else {
            let detail = result.error.unwrap_or_else(|| "unknown error".to_string());
            failed.push(format!("module:{}: {}", kind, detail));
            ctx.report_error(pct, format!("{} module failed: {}", kind, detail))
                .await;
        }
        if item < BACKUP_ITEMS && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    for index in 0..CHANNEL_SLOTS {
        ctx.checkpoint().await?;
        item += 1;
        let pct = percent(item, BACKUP_ITEMS);
        ctx.update(pct, format!("Fetching channel {}", index)).await;

        let result = admin.get_channel(node, index, None).await;
        if result.success {
            if let Some(settings) = result
                .response
                .and_then(|v| serde_json::from_value::<ChannelSettings>(v).ok())
            {
                channels.insert(index.to_string(), settings);
                successful.push(format!("channel:{}", index));
                ctx.update(pct, format!("Channel {} retrieved", index)).await;
            } else {
                failed.push(format!("channel:{}: unreadable response", index));
                ctx.report_error(pct, format!("Channel {} unreadable", index)).await;
            }
        } else {
            let detail = result.error.unwrap_or_else(|| "unknown error".to_string());
            failed.push(format!("channel:{}: {}", index, detail));
            ctx.report_error(pct, format!("Channel {} failed: {}", index, detail))
                .await;
        }
        if item < BACKUP_ITEMS && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    if successful.is_empty() {
        return Ok(JobOutcome::fail(
            "failed to retrieve any configuration from node",
            Some(json!({ "failed_configs": failed })),
        ));
    }

    ctx.update(98, "Saving backup").await;
    let backup_id = match storage
        .store_backup(
            node,
            &params.backup_name,
            &params.description,
            core_configs,
            module_configs,
            channels,
        )
        .await
    {
        Ok(id) => id,
        Err(e) => {
            return Ok(JobOutcome::fail(
                format!("backup collected but could not be saved: {}", e),
                Some(json!({ "failed_configs": failed })),
            ));
        }
    };
    ctx.update(100, "Backup complete").await;
    info!(
        "backup {} stored for {} ({} ok / {} failed)",
        backup_id,
        format_node_id(node),
        successful.len(),
        failed.len()
    );

    Ok(JobOutcome::ok(json!({
        "backup_id": backup_id,
        "backup_name": params.backup_name,
        "successful_configs": successful,
        "failed_configs": failed,
        "total_configs": successful.len() + failed.len(),
    })))
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RestoreParams {
    backup_id: u64,
    /// Slot 0 carries the primary mesh channel; restoring it can cut the
    /// node off the mesh, so it is skipped unless explicitly requested.
    #[serde(default = "default_true")]
    skip_primary_channel: bool,
    /// Radio-link (lora) parameters; restoring across regions is legitimate,
    /// so this defaults to restore.
    #[serde(default)]
    skip_radio_config: bool,
    /// Keys and admin grants; skipped by default.
    #[serde(default = "default_true")]
    skip_security: bool,
    #[serde(default)]
    reboot_after: bool,
    #[serde(default)]
    selected_core_configs: Option<Vec<String>>,
    #[serde(default)]
    selected_module_configs: Option<Vec<String>>,
    #[serde(default)]
    selected_channels: Option<Vec<u32>>,
}

fn default_true() -> bool {
    true
}

enum RestoreItem {
    Core(ConfigKind, ConfigPayload),
    Module(ModuleKind, ModulePayload),
    Channel(u32, ChannelSettings),
}

impl RestoreItem {
    fn label(&self) -> String {
        match self {
            RestoreItem::Core(kind, _) => format!("core:{}", kind),
            RestoreItem::Module(kind, _) => format!("module:{}", kind),
            RestoreItem::Channel(index, _) => format!("channel:{}", index),
        }
    }
}

/// Apply a stored backup back onto a node, honoring skip flags and optional
/// per-item selection, optionally rebooting afterwards.
pub async fn run_restore(
    admin: &AdminService,
    storage: &Storage,
    job: &JobRecord,
    ctx: &JobContext,
) -> Result<JobOutcome, JobCancelled> {
    let Some(node) = job.target_node else {
        return missing_target();
    };
    let params: RestoreParams = match serde_json::from_value(job.params.clone()) {
        Ok(p) => p,
        Err(e) => return Ok(JobOutcome::fail(format!("invalid restore parameters: {}", e), None)),
    };

    let Some(backup) = storage.backup(params.backup_id).await else {
        return Ok(JobOutcome::fail(
            format!("backup {} not found", params.backup_id),
            None,
        ));
    };

    let mut items: Vec<RestoreItem> = Vec::new();
    for kind in ConfigKind::ALL {
        let Some(payload) = backup.core_configs.get(kind.as_str()) else {
            continue;
        };
        if let Some(selected) = &params.selected_core_configs {
            if !selected.iter().any(|s| s == kind.as_str()) {
                continue;
            }
        }
        // Skip flags win over selection
        if kind == ConfigKind::Lora && params.skip_radio_config {
            continue;
        }
        if kind == ConfigKind::Security && params.skip_security {
            continue;
        }
        items.push(RestoreItem::Core(kind, payload.clone()));
    }
    for kind in ModuleKind::ALL {
        let Some(payload) = backup.module_configs.get(kind.as_str()) else {
            continue;
        };
        if let Some(selected) = &params.selected_module_configs {
            if !selected.iter().any(|s| s == kind.as_str()) {
                continue;
            }
        }
        items.push(RestoreItem::Module(kind, payload.clone()));
    }
    for (key, settings) in &backup.channels {
        let Ok(index) = key.parse::<u32>() else {
            continue;
        };
        if index == 0 && params.skip_primary_channel {
            continue;
        }
        if let Some(selected) = &params.selected_channels {
            if !selected.contains(&index) {
                continue;
            }
        }
        items.push(RestoreItem::Channel(index, settings.clone()));
    }

    let total = items.len();
    if total == 0 {
        return Ok(JobOutcome::fail("no configurations to restore in backup", None));
    }

    let mut successful: Vec<String> = Vec::new();
    let mut failed: Vec<String> = Vec::new();

    ctx.update(
        1,
        format!(
            "Restoring {} configuration(s) to {}",
            total,
            format_node_id(node)
        ),
    )
    .await;

    for (i, restore_item) in items.into_iter().enumerate() {
        ctx.checkpoint().await?;
        let pct = (percent(i + 1, total) as u32 * 95 / 100) as u8 + 2;
        let label = restore_item.label();
        ctx.update(pct, format!("Restoring {}", label)).await;

        let result = match restore_item {
            RestoreItem::Core(_, payload) => admin.set_config(node, payload).await,
            RestoreItem::Module(_, payload) => admin.set_module_config(node, payload).await,
            RestoreItem::Channel(index, mut settings) => {
                settings.index = index;
                admin.set_channel(node, settings).await
            }
        };

        if result.success {
            successful.push(label.clone());
            ctx.update(pct, format!("{} restored", label)).await;
        } else {
            let detail = result.error.unwrap_or_else(|| "unknown error".to_string());
            failed.push(format!("{}: {}", label, detail));
            ctx.report_error(pct, format!("{} failed: {}", label, detail)).await;
        }
    }

    let mut reboot_sent = false;
    let mut reboot_error = None;
    if params.reboot_after && !successful.is_empty() {
        ctx.update(97, "Sending reboot").await;
        let result = admin.reboot_node(node, 5).await;
        if result.success {
            reboot_sent = true;
            ctx.update(99, "Node reboots in 5s").await;
        } else {
            reboot_error = result.error;
            ctx.report_error(
                99,
                format!(
                    "reboot failed: {}",
                    reboot_error.as_deref().unwrap_or("unknown")
                ),
            )
            .await;
        }
    }

    if successful.is_empty() {
        return Ok(JobOutcome::fail(
            "failed to restore any configurations",
            Some(json!({ "failed_restores": failed })),
        ));
    }

    ctx.update(100, "Restore complete").await;
    Ok(JobOutcome::ok(json!({
        "message": format!("restored {} configuration(s)", successful.len()),
        "successful_restores": successful,
        "failed_restores": failed,
        "total_restored": successful.len(),
        "total_failed": failed.len(),
        "reboot_after": params.reboot_after,
        "reboot_sent": reboot_sent,
        "reboot_error": reboot_error,
    })))
}

// ---------------------------------------------------------------------------
// Bulk command
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BulkCommandParams {
    command: String,
    node_ids: Vec<u32>,
}

/// Run one dispatch-class command (reboot/shutdown) across a node list.
pub async fn run_bulk_command(
    admin: &AdminService,
    job: &JobRecord,
    ctx: &JobContext,
) -> Result<JobOutcome, JobCancelled> {
    let params: BulkCommandParams = match serde_json::from_value(job.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            return Ok(JobOutcome::fail(
                format!("invalid bulk command parameters: {}", e),
                None,
            ))
        }
    };
    if params.node_ids.is_empty() {
        return Ok(JobOutcome::fail("no target nodes given", None));
    }

    let total = params.node_ids.len();
    let mut successful: Vec<String> = Vec::new();
    let mut failed: Vec<serde_json::Value> = Vec::new();

    for (i, node) in params.node_ids.iter().copied().enumerate() {
        ctx.checkpoint().await?;
        let pct = percent(i + 1, total);
        let hex = format_node_id(node);
        ctx.update(pct, format!("Executing {} on {}", params.command, hex))
            .await;

        let result = match params.command.as_str() {
            "reboot" => admin.reboot_node(node, 5).await,
            "shutdown" => admin.shutdown_node(node, 5).await,
            other => {
                failed.push(json!({"node": hex, "error": format!("unknown command: {}", other)}));
                ctx.report_error(pct, format!("unknown command: {}", other)).await;
                continue;
            }
        };

        if result.success {
            successful.push(hex.clone());
            ctx.update(pct, format!("{} sent to {}", params.command, hex)).await;
        } else {
            let detail = result.error.unwrap_or_else(|| "unknown error".to_string());
            failed.push(json!({"node": hex, "error": detail.clone()}));
            ctx.report_error(pct, format!("{} failed for {}: {}", params.command, hex, detail))
                .await;
        }
    }

    ctx.update(100, format!("Completed {}/{} node(s)", successful.len(), total))
        .await;

    let success = !successful.is_empty();
    let data = json!({
        "command": params.command,
        "successful": successful,
        "failed": failed,
        "total_nodes": total,
    });
    Ok(if success {
        JobOutcome::ok(data)
    } else {
        JobOutcome::fail("command failed on every node", Some(data))
    })
}

// ---------------------------------------------------------------------------
// Config deploy
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConfigDeployParams {
    config_type: String,
    config: serde_json::Value,
}

/// Push a single configuration payload to one node.
pub async fn run_config_deploy(
    admin: &AdminService,
    job: &JobRecord,
    ctx: &JobContext,
) -> Result<JobOutcome, JobCancelled> {
    let Some(node) = job.target_node else {
        return missing_target();
    };
    let params: ConfigDeployParams = match serde_json::from_value(job.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            return Ok(JobOutcome::fail(
                format!("invalid config deploy parameters: {}", e),
                None,
            ))
        }
    };

    ctx.checkpoint().await?;
    ctx.update(10, format!("Deploying {} configuration", params.config_type))
        .await;

    let result = if let Some(kind) = ConfigKind::from_name(&params.config_type) {
        match config_payload_from_json(kind, params.config) {
            Ok(payload) => admin.set_config(node, payload).await,
            Err(e) => {
                return Ok(JobOutcome::fail(
                    format!("invalid {} payload: {}", params.config_type, e),
                    None,
                ))
            }
        }
    } else if let Some(kind) = ModuleKind::from_name(&params.config_type) {
        match module_payload_from_json(kind, params.config) {
            Ok(payload) => admin.set_module_config(node, payload).await,
            Err(e) => {
                return Ok(JobOutcome::fail(
                    format!("invalid {} payload: {}", params.config_type, e),
                    None,
                ))
            }
        }
    } else {
        return Ok(JobOutcome::fail(
            format!("unknown config type: {}", params.config_type),
            None,
        ));
    };

    if result.success {
        ctx.update(100, format!("{} configuration deployed", params.config_type))
            .await;
        Ok(JobOutcome::ok(json!({
            "config_type": params.config_type,
            "log_id": result.log_id,
            "acknowledged": result.acknowledged,
        })))
    } else {
        Ok(JobOutcome::fail(
            result
                .error
                .unwrap_or_else(|| "deploy failed".to_string()),
            None,
        ))
    }
}
