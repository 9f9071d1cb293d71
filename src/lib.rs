//! # Meshadmin - Remote Administration Engine for Mesh Radio Nodes
//!
//! Meshadmin administers mesh radio nodes remotely over three
//! interchangeable transports: a direct TCP socket, a USB/serial link to
//! attached hardware, and a shared MQTT radio gateway. It speaks a compact
//! binary control protocol, correlates asynchronous replies to the commands
//! that caused them, retries with bounded policies, and sequences long
//! conversations (full configuration backups and restores) into durable
//! background jobs.
//!
//! ## Features
//!
//! - **Transport Abstraction**: One [`transport::Publisher`] contract, three
//!   implementations; the active one is chosen per role (admin/client) by the
//!   [`connections::ConnectionManager`].
//! - **Command Correlation**: Random 32-bit command ids matched to replies,
//!   with a fallback slot for transports that do not echo ids.
//! - **Bounded Retries**: Read commands retry with a full per-attempt audit
//!   log; write commands are deliberately single-shot with a
//!   silence-is-soft-success policy suited to lossy mesh delivery.
//! - **Session Tokens**: Per-node opaque tokens cached and echoed
//!   transparently.
//! - **Health Supervision**: Heartbeats, missed-beat counting, and bounded
//!   automatic reconnects on the socket transport.
//! - **Payload Encryption**: Channel-scoped AES-256-CTR for the broadcast
//!   gateway link.
//! - **Background Jobs**: Queue with per-node conflict rules, one worker,
//!   cooperative cancellation, and partial-success aggregation for
//!   backup/restore.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use meshadmin::admin::AdminService;
//! use meshadmin::config::Config;
//! use meshadmin::connections::{ConnectionManager, ConnectionRole};
//! use meshadmin::storage::Storage;
//! use meshadmin::transport::tcp::TcpPublisher;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let storage = Arc::new(Storage::new(&config.storage.data_dir).await?);
//!
//!     let manager = Arc::new(ConnectionManager::new());
//!     let tcp = TcpPublisher::new("192.168.1.20", 4403, 0xa1b2c3d4, config.health.to_policy());
//!     manager.add("lan", ConnectionRole::Admin, true, Arc::new(tcp));
//!
//!     let admin = AdminService::new(manager, storage);
//!     let result = admin.test_node(0x5678abcd).await;
//!     println!("administrable: {}", result.success);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`wire`] - Wire message definitions, stream framing, payload cipher
//! - [`transport`] - Socket / serial / broadcast publishers, correlation,
//!   sessions, health supervision
//! - [`connections`] - Role-designated connection registry
//! - [`admin`] - Operation facade, catalogue, retry orchestration
//! - [`jobs`] - Job queue, worker, and backup/restore sequencing
//! - [`storage`] - Audit log, job, backup, and node persistence
//! - [`config`] - Configuration management
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  Job Worker  │ ← queue, conflicts, progress, cancellation
//! └──────┬───────┘
//! ┌──────┴───────┐
//! │ Admin Facade │ ← operation catalogue, audit, retry policy
//! └──────┬───────┘
//! ┌──────┴───────┐
//! │  Transports  │ ← socket / serial / broadcast + correlator
//! └──────┬───────┘
//!        ▼ radio mesh
//! ```

pub mod admin;
pub mod config;
pub mod connections;
pub mod jobs;
pub mod logutil;
pub mod storage;
pub mod transport;
pub mod wire;
