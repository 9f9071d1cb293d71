//! Binary entrypoint for the meshadmin CLI.
//!
//! Commands:
//! - `start` - run the engine (connections, health supervision, job worker)
//! - `init` - create a starter `config.toml`
//! - `status` - print connection, job, and serial-port status
//! - `test-node --node <id>` - probe whether a node answers admin requests
//! - `get-config --node <id> --kind <category>` - fetch one config category
//! - `backup --node <id> [--name <n>]` - run a full configuration backup
//! - `restore --node <id> --backup-id <id>` - apply a stored backup
//! - `jobs [--active]` - list background jobs
//!
//! See the library crate docs for module-level details: `meshadmin::`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;
use tokio::sync::watch;

use meshadmin::admin::catalog::ConfigKind;
use meshadmin::admin::AdminService;
use meshadmin::config::Config;
use meshadmin::connections::ConnectionManager;
use meshadmin::jobs::JobService;
use meshadmin::storage::{JobStatus, JobType, Storage};
use meshadmin::transport::health;
use meshadmin::transport::mqtt::MqttPublisher;
use meshadmin::transport::tcp::TcpPublisher;
use meshadmin::transport::{NodeSink, TransportKind};
use meshadmin::wire::parse_node_id;

#[derive(Parser)]
#[command(name = "meshadmin")]
#[command(about = "Remote administration engine for mesh radio nodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until interrupted
    Start,
    /// Create a starter configuration file
    Init,
    /// Show connection and job status
    Status,
    /// Probe whether a node answers admin requests
    TestNode {
        /// Target node (!hex, 0xhex, or decimal)
        #[arg(short, long)]
        node: String,
    },
    /// Fetch one configuration category from a node
    GetConfig {
        #[arg(short, long)]
        node: String,
        /// Category: device, position, power, network, display, lora,
        /// bluetooth, security
        #[arg(short, long)]
        kind: String,
    },
    /// Back up every configuration category of a node
    Backup {
        #[arg(short, long)]
        node: String,
        /// Name for the stored backup
        #[arg(long, default_value = "CLI backup")]
        name: String,
    },
    /// Restore a stored backup onto a node
    Restore {
        #[arg(short, long)]
        node: String,
        #[arg(short, long)]
        backup_id: u64,
        /// Send a reboot after the restore completes
        #[arg(long)]
        reboot: bool,
        /// Leave the lora radio settings untouched
        #[arg(long)]
        skip_radio: bool,
        /// Also restore security settings (keys, admin grants)
        #[arg(long)]
        include_security: bool,
    },
    /// List background jobs
    Jobs {
        /// Only queued/running/paused jobs
        #[arg(long)]
        active: bool,
    },
}

struct Engine {
    storage: Arc<Storage>,
    manager: Arc<ConnectionManager>,
    admin: Arc<AdminService>,
    jobs: Arc<JobService>,
    tcp_publishers: Vec<TcpPublisher>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

async fn build_engine(config: &Config) -> Result<Engine> {
    let storage = Arc::new(Storage::new(&config.storage.data_dir).await?);
    let gateway = config.gateway.parsed_node_id()?;
    let manager = Arc::new(ConnectionManager::new());
    let mut tcp_publishers = Vec::new();

    for conn in &config.connections {
        match conn.transport {
            TransportKind::Socket => {
                let host = conn
                    .host
                    .clone()
                    .ok_or_else(|| anyhow!("connection '{}' is missing host", conn.id))?;
                let port = conn.port.unwrap_or(4403);
                let publisher = TcpPublisher::new(host, port, gateway, config.health.to_policy());
                tcp_publishers.push(publisher.clone());
                manager.add(&conn.id, conn.role, conn.auto_connect, Arc::new(publisher));
            }
            TransportKind::Serial => {
                #[cfg(feature = "serial")]
                {
                    let device = conn
                        .device
                        .clone()
                        .ok_or_else(|| anyhow!("connection '{}' is missing device", conn.id))?;
                    let baud = conn.baud_rate.unwrap_or(115_200);
                    let publisher =
                        meshadmin::transport::serial::SerialPublisher::new(device, baud, gateway);
                    manager.add(&conn.id, conn.role, conn.auto_connect, Arc::new(publisher));
                }
                #[cfg(not(feature = "serial"))]
                {
                    log::warn!(
                        "serial support not compiled in; skipping connection '{}'",
                        conn.id
                    );
                }
            }
            TransportKind::Broadcast => {
                let settings = config.broadcast.to_settings(gateway);
                let sink: Arc<dyn NodeSink> = storage.clone();
                let publisher = MqttPublisher::new(settings, Some(sink));
                manager.add(&conn.id, conn.role, conn.auto_connect, Arc::new(publisher));
            }
        }
    }

    let admin = Arc::new(
        AdminService::new(manager.clone(), storage.clone())
            .with_read_policy(config.retry.to_policy())
            .with_write_wait(config.retry.write_wait()),
    );
    let jobs = Arc::new(JobService::new(storage.clone(), admin.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    Ok(Engine {
        storage,
        manager,
        admin,
        jobs,
        tcp_publishers,
        shutdown_tx,
        shutdown_rx,
    })
}

impl Engine {
    /// Bring up connections, supervision, and the job worker.
    async fn start_background(&self) {
        self.manager.connect_all(None).await;
        for tcp in &self.tcp_publishers {
            health::spawn_supervisor(tcp.clone(), self.shutdown_rx.clone());
        }
        self.jobs.start(self.shutdown_rx.clone()).await;
    }

    async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.jobs.join().await;
        self.manager.disconnect_all().await;
    }
}

fn parse_node_arg(s: &str) -> Result<u32> {
    parse_node_id(s).ok_or_else(|| anyhow!("'{}' is not a node id (!hex, 0xhex, or decimal)", s))
}

fn init_logging(config: Option<&Config>, verbose: u8) {
    let level = match verbose {
        0 => config
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|| "info".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if !atty::is(atty::Stream::Stderr) {
        builder.write_style(env_logger::WriteStyle::Never);
    }
    let _ = builder.try_init();
}

/// Drive a queued job to completion, echoing progress to stdout.
async fn wait_for_job(engine: &Engine, job_id: u64) -> Result<bool> {
    let mut last_message = String::new();
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let Some(job) = engine.storage.job(job_id).await else {
            return Err(anyhow!("job {} disappeared from the store", job_id));
        };
        if let Some(msg) = &job.progress_message {
            if *msg != last_message {
                println!("[{:3}%] {}", job.progress, msg);
                last_message = msg.clone();
            }
        }
        if job.status.is_terminal() {
            match job.status {
                JobStatus::Completed => {
                    if let Some(result) = &job.result {
                        println!("{}", serde_json::to_string_pretty(result)?);
                    }
                    return Ok(true);
                }
                _ => {
                    println!(
                        "job {} {}: {}",
                        job_id,
                        job.status.as_str(),
                        job.error_message.as_deref().unwrap_or("no detail")
                    );
                    return Ok(false);
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(pre_config.as_ref(), cli.verbose);

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            println!("wrote starter configuration to {}", cli.config);
            println!("edit the [gateway] and [[connections]] sections, then run: meshadmin start");
            Ok(())
        }
        Commands::Start => {
            let config = pre_config
                .ok_or_else(|| anyhow!("no configuration found; run 'meshadmin init' first"))?;
            let engine = build_engine(&config).await?;
            engine.start_background().await;
            info!("meshadmin running; press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            engine.shutdown().await;
            Ok(())
        }
        Commands::Status => {
            let config = pre_config
                .ok_or_else(|| anyhow!("no configuration found; run 'meshadmin init' first"))?;
            let engine = build_engine(&config).await?;
            let status = engine.admin.connection_status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);

            let active = engine.storage.active_jobs().await;
            println!("active jobs: {}", active.len());
            for job in active {
                println!(
                    "  #{} {} {} ({}%)",
                    job.id,
                    job.job_type.as_str(),
                    job.status.as_str(),
                    job.progress
                );
            }

            #[cfg(feature = "serial")]
            {
                let ports = meshadmin::transport::serial::discover_ports();
                println!("serial ports: {}", ports.len());
                for port in ports {
                    println!(
                        "  {} {}{}",
                        port.device,
                        port.description.as_deref().unwrap_or("-"),
                        if port.likely_radio { " (radio?)" } else { "" }
                    );
                }
            }
            Ok(())
        }
        Commands::TestNode { node } => {
            let config = pre_config
                .ok_or_else(|| anyhow!("no configuration found; run 'meshadmin init' first"))?;
            let target = parse_node_arg(&node)?;
            let engine = build_engine(&config).await?;
            let result = engine.admin.test_node(target).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            std::process::exit(if result.success { 0 } else { 1 });
        }
        Commands::GetConfig { node, kind } => {
            let config = pre_config
                .ok_or_else(|| anyhow!("no configuration found; run 'meshadmin init' first"))?;
            let target = parse_node_arg(&node)?;
            let kind = ConfigKind::from_name(&kind)
                .ok_or_else(|| anyhow!("unknown config category '{}'", kind))?;
            let engine = build_engine(&config).await?;
            let result = engine.admin.get_config(target, kind, None).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            std::process::exit(if result.success { 0 } else { 1 });
        }
        Commands::Backup { node, name } => {
            let config = pre_config
                .ok_or_else(|| anyhow!("no configuration found; run 'meshadmin init' first"))?;
            let target = parse_node_arg(&node)?;
            let engine = build_engine(&config).await?;
            engine.start_background().await;

            let queued = engine
                .jobs
                .queue_job(
                    JobType::Backup,
                    &format!("Backup of {}", node),
                    serde_json::json!({ "backup_name": name }),
                    Some(target),
                )
                .await
                .map_err(|e| anyhow!("{}", e))?;
            println!("queued backup job {}", queued.job_id);

            let ok = wait_for_job(&engine, queued.job_id).await?;
            engine.shutdown().await;
            std::process::exit(if ok { 0 } else { 1 });
        }
        Commands::Restore {
            node,
            backup_id,
            reboot,
            skip_radio,
            include_security,
        } => {
            let config = pre_config
                .ok_or_else(|| anyhow!("no configuration found; run 'meshadmin init' first"))?;
            let target = parse_node_arg(&node)?;
            let engine = build_engine(&config).await?;
            engine.start_background().await;

            let queued = engine
                .jobs
                .queue_job(
                    JobType::Restore,
                    &format!("Restore backup {} to {}", backup_id, node),
                    serde_json::json!({
                        "backup_id": backup_id,
                        "reboot_after": reboot,
                        "skip_radio_config": skip_radio,
                        "skip_security": !include_security,
                    }),
                    Some(target),
                )
                .await
                .map_err(|e| anyhow!("{}", e))?;
            println!("queued restore job {}", queued.job_id);

            let ok = wait_for_job(&engine, queued.job_id).await?;
            engine.shutdown().await;
            std::process::exit(if ok { 0 } else { 1 });
        }
        Commands::Jobs { active } => {
            let config = pre_config
                .ok_or_else(|| anyhow!("no configuration found; run 'meshadmin init' first"))?;
            let engine = build_engine(&config).await?;
            let jobs = if active {
                engine.storage.active_jobs().await
            } else {
                engine.storage.jobs_filtered(None, None, None, 50).await
            };
            if jobs.is_empty() {
                println!("no jobs");
            }
            for job in jobs {
                println!(
                    "#{} {} {} {} {}% {}",
                    job.id,
                    job.job_type.as_str(),
                    job.status.as_str(),
                    job.target_node
                        .map(meshadmin::wire::format_node_id)
                        .unwrap_or_else(|| "-".to_string()),
                    job.progress,
                    job.progress_message.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
    }
}
