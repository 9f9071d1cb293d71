//! # Connection Registry
//!
//! Central registry of transport publishers with role designation. One
//! connection serves `admin` traffic (backups, restores, config), another may
//! serve `client` traffic (monitoring, interactive probes); both roles can be
//! backed by any transport.
//!
//! Selection prefers a currently connected instance of the requested role and
//! falls back to the first registered one, which then connects lazily on the
//! first send. The registry is built once by the composition root from
//! configuration — there are no ambient singletons to reach for.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::transport::{Publisher, TransportKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    #[default]
    Admin,
    Client,
}

impl ConnectionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionRole::Admin => "admin",
            ConnectionRole::Client => "client",
        }
    }
}

#[derive(Clone)]
pub struct ConnectionEntry {
    pub id: String,
    pub kind: TransportKind,
    pub role: ConnectionRole,
    pub auto_connect: bool,
    pub publisher: Arc<dyn Publisher>,
}

#[derive(Default)]
pub struct ConnectionManager {
    entries: Mutex<Vec<ConnectionEntry>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &self,
        id: impl Into<String>,
        role: ConnectionRole,
        auto_connect: bool,
        publisher: Arc<dyn Publisher>,
    ) {
        let id = id.into();
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.iter().position(|e| e.id == id) {
            warn!("connection '{}' already registered; replacing", id);
            entries.remove(existing);
        }
        info!(
            "registered connection '{}' ({}, {})",
            id,
            publisher.kind(),
            role.as_str()
        );
        entries.push(ConnectionEntry {
            id,
            kind: publisher.kind(),
            role,
            auto_connect,
            publisher,
        });
    }

    pub async fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut entries = self.entries.lock().unwrap();
            match entries.iter().position(|e| e.id == id) {
                Some(pos) => Some(entries.remove(pos)),
                None => None,
            }
        };
        match removed {
            Some(entry) => {
                if entry.publisher.is_connected() {
                    entry.publisher.disconnect().await;
                }
                info!("removed connection '{}'", id);
                true
            }
            None => {
                warn!("connection '{}' not found", id);
                false
            }
        }
    }

    pub fn set_role(&self, id: &str, role: ConnectionRole) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                info!(
                    "connection '{}' role changed {} -> {}",
                    id,
                    entry.role.as_str(),
                    role.as_str()
                );
                entry.role = role;
                true
            }
            None => false,
        }
    }

    fn publisher_for(&self, role: ConnectionRole) -> Option<Arc<dyn Publisher>> {
        let entries = self.entries.lock().unwrap();
        let candidates: Vec<&ConnectionEntry> =
            entries.iter().filter(|e| e.role == role).collect();
        if candidates.is_empty() {
            warn!("no {} connection configured", role.as_str());
            return None;
        }
        // Prefer a live connection; otherwise the first registered entry,
        // which will connect on demand.
        if let Some(live) = candidates.iter().find(|e| e.publisher.is_connected()) {
            debug!("using connected {} connection '{}'", role.as_str(), live.id);
            return Some(live.publisher.clone());
        }
        debug!(
            "using {} connection '{}' (not yet connected)",
            role.as_str(),
            candidates[0].id
        );
        Some(candidates[0].publisher.clone())
    }

    pub fn admin_publisher(&self) -> Option<Arc<dyn Publisher>> {
        self.publisher_for(ConnectionRole::Admin)
    }

    pub fn client_publisher(&self) -> Option<Arc<dyn Publisher>> {
        self.publisher_for(ConnectionRole::Client)
    }

    pub fn entries(&self) -> Vec<ConnectionEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Connect every auto-connect entry (optionally one role only).
    pub async fn connect_all(&self, role: Option<ConnectionRole>) -> Vec<(String, bool)> {
        let targets = self.entries();
        let mut results = Vec::new();
        for entry in targets {
            if role.is_some_and(|r| r != entry.role) {
                continue;
            }
            if !entry.auto_connect {
                debug!("skipping '{}' (auto_connect disabled)", entry.id);
                results.push((entry.id, false));
                continue;
            }
            let ok = entry.publisher.connect().await;
            if ok {
                info!("connected '{}' ({})", entry.id, entry.role.as_str());
            } else {
                warn!("failed to connect '{}'", entry.id);
            }
            results.push((entry.id, ok));
        }
        results
    }

    pub async fn disconnect_all(&self) {
        for entry in self.entries() {
            if entry.publisher.is_connected() {
                entry.publisher.disconnect().await;
                info!("disconnected '{}'", entry.id);
            }
        }
    }

    /// Status snapshot for the CLI and the facade.
    pub fn status(&self) -> serde_json::Value {
        let entries = self.entries.lock().unwrap();
        let connections: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                json!({
                    "id": e.id,
                    "transport": e.kind.as_str(),
                    "role": e.role.as_str(),
                    "auto_connect": e.auto_connect,
                    "connected": e.publisher.is_connected(),
                    "endpoint": e.publisher.descriptor(),
                    "local_node": e.publisher.local_node_id().map(crate::wire::format_node_id),
                    "health": e.publisher.health(),
                })
            })
            .collect();
        let admin_connected = entries
            .iter()
            .any(|e| e.role == ConnectionRole::Admin && e.publisher.is_connected());
        let client_connected = entries
            .iter()
            .any(|e| e.role == ConnectionRole::Client && e.publisher.is_connected());
        json!({
            "total_connections": entries.len(),
            "admin_connected": admin_connected,
            "client_connected": client_connected,
            "connections": connections,
        })
    }
}
