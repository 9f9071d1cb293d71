//! # Configuration Management Module
//!
//! TOML configuration for the administration engine: which transports exist
//! and in which role, broker and key material for the broadcast link, retry
//! and health policies, storage location, and logging.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [gateway]
//! node_id = "!a1b2c3d4"        # identity used as the sender of admin frames
//!
//! [[connections]]
//! id = "lan"
//! transport = "socket"
//! role = "admin"
//! host = "192.168.1.20"
//! port = 4403
//!
//! [[connections]]
//! id = "usb"
//! transport = "serial"
//! role = "client"
//! device = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [broadcast]
//! broker_host = "mqtt.example.net"
//! broker_port = 1883
//! topic_prefix = "mesh"
//! psk_base64 = "AQ=="
//! admin_channel = "admin"
//! channel_names = ["LongFast", "admin"]
//!
//! [retry]
//! max_attempts = 3
//! attempt_timeout_secs = 30
//! retry_delay_secs = 2
//! write_wait_secs = 10
//!
//! [storage]
//! data_dir = "./data"
//!
//! [logging]
//! level = "info"
//! file = "meshadmin.log"
//! ```
//!
//! Values not present fall back to defaults chosen for multi-hop mesh paths.

use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::Engine;
use log::warn;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::admin::retry::RetryPolicy;
use crate::connections::ConnectionRole;
use crate::transport::health::HealthPolicy;
use crate::transport::mqtt::BroadcastSettings;
use crate::transport::TransportKind;
use crate::wire::parse_node_id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity this process administers the mesh as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Node id in `!hex`, `0xhex`, or decimal form.
    pub node_id: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            node_id: "!00000001".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn parsed_node_id(&self) -> Result<u32> {
        parse_node_id(&self.node_id)
            .ok_or_else(|| anyhow!("invalid gateway node_id '{}'", self.node_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    pub transport: TransportKind,
    #[serde(default)]
    pub role: ConnectionRole,
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    /// Socket transport: node address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Serial transport: device path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    pub broker_host: String,
    pub broker_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub topic_prefix: String,
    /// Base64 pre-shared key for channel payload encryption. Absent =
    /// transmit unencrypted (loud warning at send time).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psk_base64: Option<String>,
    /// Channel designated for admin traffic, by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_channel: Option<String>,
    /// Channel names by slot index.
    #[serde(default)]
    pub channel_names: Vec<String>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastConfig {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            username: None,
            password: None,
            topic_prefix: "mesh".to_string(),
            psk_base64: None,
            admin_channel: None,
            channel_names: Vec::new(),
        }
    }
}

impl BroadcastConfig {
    /// Decode key material. A malformed key degrades to the all-zero key
    /// with a warning rather than refusing to start.
    pub fn decoded_psk(&self) -> Option<Vec<u8>> {
        let encoded = self.psk_base64.as_ref()?;
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("pre-shared key is not valid base64 ({}); using zero key", e);
                Some(vec![0u8; 32])
            }
        }
    }

    pub fn to_settings(&self, gateway_node: u32) -> BroadcastSettings {
        BroadcastSettings {
            broker_host: self.broker_host.clone(),
            broker_port: self.broker_port,
            username: self.username.clone(),
            password: self.password.clone(),
            topic_prefix: self.topic_prefix.clone(),
            channel_names: self.channel_names.clone(),
            admin_channel: self.admin_channel.clone(),
            psk: self.decoded_psk(),
            gateway_node,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub attempt_timeout_secs: u64,
    pub retry_delay_secs: u64,
    /// Wait window for write-class commands (single attempt).
    pub write_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            attempt_timeout_secs: 30,
            retry_delay_secs: 2,
            write_wait_secs: 10,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs.max(1)),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub heartbeat_interval_secs: u64,
    pub max_missed_heartbeats: u32,
    pub reconnect_attempts: u32,
    pub reconnect_wait_secs: u64,
    pub disconnect_timeout_secs: u64,
    pub settle_delay_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            heartbeat_interval_secs: 30,
            max_missed_heartbeats: 3,
            reconnect_attempts: 3,
            reconnect_wait_secs: 5,
            disconnect_timeout_secs: 5,
            settle_delay_ms: 1000,
        }
    }
}

impl HealthConfig {
    pub fn to_policy(&self) -> HealthPolicy {
        HealthPolicy {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            max_missed_heartbeats: self.max_missed_heartbeats.max(1),
            reconnect_attempts: self.reconnect_attempts.max(1),
            reconnect_wait: Duration::from_secs(self.reconnect_wait_secs),
            disconnect_timeout: Duration::from_secs(self.disconnect_timeout_secs.max(1)),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: Some("meshadmin.log".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        Ok(config)
    }

    /// Write a starter configuration file.
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;
        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gateway: GatewayConfig::default(),
            connections: vec![ConnectionConfig {
                id: "lan".to_string(),
                transport: TransportKind::Socket,
                role: ConnectionRole::Admin,
                auto_connect: true,
                host: Some("192.168.1.1".to_string()),
                port: Some(4403),
                device: None,
                baud_rate: None,
            }],
            broadcast: BroadcastConfig::default(),
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roundtrips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.connections.len(), 1);
        assert_eq!(back.connections[0].transport, TransportKind::Socket);
        assert_eq!(back.retry.max_attempts, 3);
        assert_eq!(back.retry.write_wait_secs, 10);
        assert_eq!(back.health.heartbeat_interval_secs, 30);
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[connections]]
            id = "usb"
            transport = "serial"
            device = "/dev/ttyUSB0"
            "#,
        )
        .unwrap();
        assert_eq!(config.connections[0].role, ConnectionRole::Admin);
        assert!(config.connections[0].auto_connect);
        assert_eq!(config.connections[0].baud_rate, None);
        assert_eq!(config.retry.to_policy().max_attempts, 3);
        assert_eq!(config.storage.data_dir, "./data");
    }

    #[test]
    fn gateway_node_id_forms() {
        for form in ["!a1b2c3d4", "0xa1b2c3d4", "2712847316"] {
            let gw = GatewayConfig {
                node_id: form.to_string(),
            };
            assert_eq!(gw.parsed_node_id().unwrap(), 0xa1b2c3d4, "form {}", form);
        }
        let bad = GatewayConfig {
            node_id: "not-a-node".to_string(),
        };
        assert!(bad.parsed_node_id().is_err());
    }

    #[test]
    fn malformed_psk_degrades_to_zero_key() {
        let broadcast = BroadcastConfig {
            psk_base64: Some("!!!not-base64!!!".to_string()),
            ..Default::default()
        };
        assert_eq!(broadcast.decoded_psk(), Some(vec![0u8; 32]));

        let none = BroadcastConfig::default();
        assert_eq!(none.decoded_psk(), None);
    }
}
