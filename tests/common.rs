//! Test fixtures: an in-process scripted publisher driving the real
//! correlator, plus helpers that wire up a full facade/storage/job stack in
//! a temp directory.
#![allow(dead_code)] // each test crate uses a subset of these fixtures

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use meshadmin::admin::retry::RetryPolicy;
use meshadmin::admin::AdminService;
use meshadmin::connections::{ConnectionManager, ConnectionRole};
use meshadmin::storage::Storage;
use meshadmin::transport::correlator::ResponseCorrelator;
use meshadmin::transport::session::SessionTokenCache;
use meshadmin::transport::{Publisher, Reply, TransportKind};
use meshadmin::wire::{
    admin_reply, admin_request, AdminReply, AdminRequest, ChannelSettings, ConfigPayload,
    DeviceMetadata, ModulePayload, RouteAck,
};

/// What the mock does with one outbound request.
#[derive(Clone)]
pub enum MockAction {
    /// Deliver the canonical reply for the request after a short delay.
    Reply,
    /// Deliver a reply carrying this session token.
    ReplyWithToken(Vec<u8>),
    /// Deliver a routing-level positive acknowledgement.
    AckOnly,
    /// Deliver a routing-level negative acknowledgement.
    Nak(i32),
    /// Dispatch succeeds but no reply ever arrives.
    Silence,
    /// `send` returns no command id.
    DispatchFail,
}

/// Record of one dispatched request, for assertions.
#[derive(Clone)]
pub struct SentRequest {
    pub target: u32,
    pub op_name: String,
    pub session_token: Vec<u8>,
}

type Script = dyn Fn(&AdminRequest, u32) -> MockAction + Send + Sync;

/// Scripted in-process publisher. Uses the real [`ResponseCorrelator`] and
/// [`SessionTokenCache`], so facade-level tests exercise the same plumbing
/// as the wire transports.
pub struct MockPublisher {
    kind: TransportKind,
    connected: AtomicBool,
    correlator: Arc<ResponseCorrelator>,
    sessions: SessionTokenCache,
    script: Box<Script>,
    pub sent: Mutex<Vec<SentRequest>>,
    local_node: u32,
    next_id: std::sync::atomic::AtomicU32,
}

impl MockPublisher {
    pub fn new(
        kind: TransportKind,
        script: impl Fn(&AdminRequest, u32) -> MockAction + Send + Sync + 'static,
    ) -> Self {
        MockPublisher {
            kind,
            connected: AtomicBool::new(true),
            correlator: Arc::new(ResponseCorrelator::new()),
            sessions: SessionTokenCache::new(),
            script: Box::new(script),
            sent: Mutex::new(Vec::new()),
            local_node: 0x0BADCAFE,
            next_id: std::sync::atomic::AtomicU32::new(1),
        }
    }

    /// Always answer with the canonical reply.
    pub fn answering(kind: TransportKind) -> Self {
        Self::new(kind, |_req, _target| MockAction::Reply)
    }

    pub fn sent_ops(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|s| s.op_name.clone()).collect()
    }
}

/// Canonical reply body for a request, used by `MockAction::Reply`.
pub fn canonical_reply(request: &AdminRequest) -> AdminReply {
    use admin_request::Op;
    let body = match &request.op {
        Some(Op::GetDeviceMetadata(_)) => admin_reply::Body::DeviceMetadata(DeviceMetadata {
            firmware_version: "2.5.1.abcdef".to_string(),
            device_state_version: 23,
            can_shutdown: true,
            has_wifi: true,
            has_bluetooth: true,
            role: 0,
            hw_model: 9,
        }),
        Some(Op::GetConfig(kind)) => admin_reply::Body::Config(config_for(*kind)),
        Some(Op::GetModuleConfig(kind)) => admin_reply::Body::ModuleConfig(module_for(*kind)),
        Some(Op::GetChannel(wire_index)) => admin_reply::Body::Channel(ChannelSettings {
            index: wire_index.saturating_sub(1),
            role: if *wire_index == 1 { 1 } else { 2 },
            name: format!("ch{}", wire_index.saturating_sub(1)),
            psk: vec![1; 16],
            position_precision: 13,
        }),
        // Writes, transactions, destructive ops: explicit accept.
        _ => admin_reply::Body::Ack(true),
    };
    AdminReply {
        session_token: Vec::new(),
        body: Some(body),
    }
}

/// Typed payload for a core config category discriminant.
pub fn config_for(kind: i32) -> ConfigPayload {
    use meshadmin::wire::config_payload::Variant;
    use meshadmin::wire::*;
    let variant = match kind {
        0 => Variant::Device(DeviceConfig {
            role: 1,
            serial_enabled: true,
            ..Default::default()
        }),
        1 => Variant::Position(PositionConfig {
            position_broadcast_secs: 900,
            ..Default::default()
        }),
        2 => Variant::Power(PowerConfig {
            ls_secs: 300,
            ..Default::default()
        }),
        3 => Variant::Network(NetworkConfig {
            wifi_enabled: false,
            ..Default::default()
        }),
        4 => Variant::Display(DisplayConfig {
            screen_on_secs: 60,
            ..Default::default()
        }),
        5 => Variant::Lora(LoraConfig {
            use_preset: true,
            modem_preset: 0,
            region: 3,
            hop_limit: 3,
            tx_enabled: true,
            ..Default::default()
        }),
        6 => Variant::Bluetooth(BluetoothConfig {
            enabled: true,
            ..Default::default()
        }),
        _ => Variant::Security(SecurityConfig {
            is_managed: false,
            ..Default::default()
        }),
    };
    ConfigPayload {
        variant: Some(variant),
    }
}

/// Typed payload for a module config category discriminant.
pub fn module_for(kind: i32) -> ModulePayload {
    use meshadmin::wire::module_payload::Variant;
    use meshadmin::wire::*;
    let variant = match kind {
        0 => Variant::Mqtt(MqttModuleConfig {
            enabled: true,
            address: "mqtt.example.net".to_string(),
            ..Default::default()
        }),
        1 => Variant::Serial(SerialModuleConfig::default()),
        2 => Variant::ExtNotify(ExtNotifyModuleConfig::default()),
        3 => Variant::StoreForward(StoreForwardModuleConfig::default()),
        4 => Variant::RangeTest(RangeTestModuleConfig::default()),
        5 => Variant::Telemetry(TelemetryModuleConfig {
            device_update_interval: 900,
            ..Default::default()
        }),
        6 => Variant::CannedMessage(CannedMessageModuleConfig::default()),
        7 => Variant::Audio(AudioModuleConfig::default()),
        8 => Variant::RemoteHardware(RemoteHardwareModuleConfig::default()),
        9 => Variant::NeighborInfo(NeighborInfoModuleConfig::default()),
        10 => Variant::AmbientLighting(AmbientLightingModuleConfig::default()),
        11 => Variant::DetectionSensor(DetectionSensorModuleConfig::default()),
        _ => Variant::Paxcounter(PaxcounterModuleConfig::default()),
    };
    ModulePayload {
        variant: Some(variant),
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn descriptor(&self) -> String {
        format!("mock-{}", self.kind)
    }

    async fn connect(&self) -> bool {
        self.connected.store(true, Ordering::SeqCst);
        true
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn local_node_id(&self) -> Option<u32> {
        Some(self.local_node)
    }

    async fn send(&self, target: u32, mut request: AdminRequest, want_response: bool) -> Option<u32> {
        request.session_token = self.sessions.token_for(target);
        let action = (self.script)(&request, target);

        self.sent.lock().unwrap().push(SentRequest {
            target,
            op_name: request.op_name().to_string(),
            session_token: request.session_token.clone(),
        });

        if matches!(action, MockAction::DispatchFail) {
            return None;
        }

        let command_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if want_response {
            self.correlator.register(command_id);
        }

        let correlator = self.correlator.clone();
        let sessions_reply = match &action {
            MockAction::ReplyWithToken(token) => Some(token.clone()),
            _ => None,
        };
        let reply = match action {
            MockAction::Reply | MockAction::ReplyWithToken(_) => {
                let mut message = canonical_reply(&request);
                if let Some(token) = sessions_reply {
                    message.session_token = token.clone();
                    // Mirror the real receive path: harvest the token.
                    self.sessions.store(target, token);
                }
                Some(Reply::Admin {
                    from: target,
                    message,
                })
            }
            MockAction::AckOnly => Some(Reply::Route {
                from: target,
                ack: RouteAck {
                    request_id: command_id,
                    error: 0,
                },
            }),
            MockAction::Nak(error) => Some(Reply::Route {
                from: target,
                ack: RouteAck {
                    request_id: command_id,
                    error,
                },
            }),
            MockAction::Silence => None,
            MockAction::DispatchFail => unreachable!(),
        };

        if let Some(reply) = reply {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                correlator.complete(command_id, reply);
            });
        }
        Some(command_id)
    }

    async fn await_response(&self, command_id: u32, timeout: Duration) -> Option<Reply> {
        self.correlator.await_response(command_id, timeout).await
    }
}

/// Retry policy fast enough for tests.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        attempt_timeout: Duration::from_millis(60),
        retry_delay: Duration::from_millis(5),
    }
}

pub struct TestStack {
    pub _dir: tempfile::TempDir,
    pub storage: Arc<Storage>,
    pub manager: Arc<ConnectionManager>,
    pub admin: Arc<AdminService>,
    pub publisher: Arc<MockPublisher>,
}

/// Full facade stack over one mock publisher in the admin role.
pub async fn stack_with(publisher: MockPublisher) -> TestStack {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Arc::new(Storage::new(dir.path()).await.expect("storage"));
    let manager = Arc::new(ConnectionManager::new());
    let publisher = Arc::new(publisher);
    manager.add(
        "mock",
        ConnectionRole::Admin,
        true,
        publisher.clone() as Arc<dyn Publisher>,
    );
    let admin = Arc::new(
        AdminService::new(manager.clone(), storage.clone())
            .with_read_policy(fast_policy())
            .with_write_wait(Duration::from_millis(80)),
    );
    TestStack {
        _dir: dir,
        storage,
        manager,
        admin,
        publisher,
    }
}
