//! Broadcast transport: shared publish/subscribe radio gateway (MQTT).
//!
//! Frames are wrapped in a [`GatewayEnvelope`] and published on
//! `{prefix}/2/e/{channel}/{gateway_id}`; the subscription covers the whole
//! prefix so replies arrive regardless of which gateway bridged them.
//! Because every subscriber on the broker can read the traffic, the payload
//! is encrypted with the channel-scoped key (see [`crate::wire::cipher`]).
//! Without a configured pre-shared key, frames go out in the clear with a
//! loud warning: degraded but available, by contract.
//!
//! The broadcast link also watches *all* inbound admin traffic: any node
//! seen answering an admin request is recorded as administrable through the
//! [`NodeSink`] seam, independent of who asked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use prost::Message;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::wire::cipher::{decrypt_payload, derive_channel_key, encrypt_payload};
use crate::wire::{
    format_node_id, AdminRequest, GatewayEnvelope, MeshEnvelope, PortKind, RadioPayload,
    WIRE_VERSION,
};

use super::correlator::ResponseCorrelator;
use super::session::SessionTokenCache;
use super::{dispatch_inbound, new_command_id, NodeSink, Publisher, Reply, TransportKind};

const CONNECT_WAIT: Duration = Duration::from_secs(5);

/// Settings the broadcast publisher needs beyond broker coordinates.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    /// Channel names by slot index; used to resolve the admin channel.
    pub channel_names: Vec<String>,
    /// Name of the channel designated for admin traffic.
    pub admin_channel: Option<String>,
    /// Pre-shared key material (decoded); `None` = transmit unencrypted.
    pub psk: Option<Vec<u8>>,
    /// Node id this gateway sends as.
    pub gateway_node: u32,
}

impl BroadcastSettings {
    /// Resolve the admin channel by name, falling back to slot 0 with
    /// implicit (unnamed) encryption.
    fn resolve_admin_channel(&self) -> (u32, String) {
        if let Some(wanted) = &self.admin_channel {
            for (idx, name) in self.channel_names.iter().enumerate() {
                if name.eq_ignore_ascii_case(wanted) {
                    return (idx as u32, name.clone());
                }
            }
            warn!(
                "admin channel '{}' not found among configured channels; using primary",
                wanted
            );
        }
        (0, String::new())
    }
}

struct MqttShared {
    correlator: ResponseCorrelator,
    sessions: SessionTokenCache,
    connected: AtomicBool,
}

pub struct MqttPublisher {
    settings: BroadcastSettings,
    shared: Arc<MqttShared>,
    connect_guard: Mutex<()>,
    client: Mutex<Option<AsyncClient>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    node_sink: Option<Arc<dyn NodeSink>>,
}

impl MqttPublisher {
    pub fn new(settings: BroadcastSettings, node_sink: Option<Arc<dyn NodeSink>>) -> Self {
        MqttPublisher {
            settings,
            shared: Arc::new(MqttShared {
                correlator: ResponseCorrelator::new(),
                sessions: SessionTokenCache::new(),
                connected: AtomicBool::new(false),
            }),
            connect_guard: Mutex::new(()),
            client: Mutex::new(None),
            event_task: Mutex::new(None),
            node_sink,
        }
    }

    fn publish_topic(&self, channel_name: &str) -> String {
        let channel = if channel_name.is_empty() {
            "primary"
        } else {
            channel_name
        };
        format!(
            "{}/2/e/{}/{}",
            self.settings.topic_prefix,
            channel,
            format_node_id(self.settings.gateway_node)
        )
    }

    /// Decrypt (if needed) and dispatch one inbound gateway frame.
    async fn handle_publish(
        shared: &MqttShared,
        settings: &BroadcastSettings,
        node_sink: &Option<Arc<dyn NodeSink>>,
        payload: &[u8],
    ) {
        let envelope = match GatewayEnvelope::decode(payload) {
            Ok(e) => e,
            Err(e) => {
                debug!("undecodable gateway envelope: {}", e);
                return;
            }
        };
        let Some(packet) = envelope.packet else {
            return;
        };
        if packet.from == settings.gateway_node {
            // Our own publishes echo back through the broker.
            return;
        }

        let radio_payload = match &packet.body {
            Some(crate::wire::mesh_envelope::Body::Plain(p)) => p.clone(),
            Some(crate::wire::mesh_envelope::Body::Encrypted(ct)) => {
                let Some(psk) = &settings.psk else {
                    debug!(
                        "encrypted frame from {} but no key configured; dropped",
                        format_node_id(packet.from)
                    );
                    return;
                };
                let channel_name = if envelope.channel_id == "primary" {
                    ""
                } else {
                    envelope.channel_id.as_str()
                };
                let key = derive_channel_key(psk, channel_name);
                let pt = decrypt_payload(ct, &key, packet.id, packet.from);
                match RadioPayload::decode(&pt[..]) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(
                            "frame from {} did not decrypt to a payload: {}",
                            format_node_id(packet.from),
                            e
                        );
                        return;
                    }
                }
            }
            None => return,
        };

        let summary = dispatch_inbound(&shared.correlator, &shared.sessions, packet.from, &radio_payload);
        if let Some(frame) = summary {
            if frame.admin_reply {
                if let Some(sink) = node_sink {
                    // Store write must not stall the receive loop.
                    let sink = sink.clone();
                    tokio::spawn(async move {
                        sink.node_responded(frame.from, frame.firmware_version).await;
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    fn kind(&self) -> TransportKind {
        TransportKind::Broadcast
    }

    fn descriptor(&self) -> String {
        format!(
            "mqtt://{}:{}/{}",
            self.settings.broker_host, self.settings.broker_port, self.settings.topic_prefix
        )
    }

    async fn connect(&self) -> bool {
        let _guard = self.connect_guard.lock().await;
        if self.is_connected() {
            return true;
        }

        let client_id = format!("meshadmin-{}", format_node_id(self.settings.gateway_node));
        let mut options = MqttOptions::new(
            client_id,
            self.settings.broker_host.clone(),
            self.settings.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(user), Some(pass)) = (&self.settings.username, &self.settings.password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, 64);
        let subscribe_filter = format!("{}/#", self.settings.topic_prefix);

        let shared = self.shared.clone();
        let settings = self.settings.clone();
        let node_sink = self.node_sink.clone();
        let sub_client = client.clone();
        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to gateway broker");
                        shared.connected.store(true, Ordering::SeqCst);
                        if let Err(e) = sub_client
                            .subscribe(subscribe_filter.clone(), QoS::AtMostOnce)
                            .await
                        {
                            error!("gateway subscribe failed: {}", e);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        Self::handle_publish(&shared, &settings, &node_sink, &publish.payload)
                            .await;
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("gateway broker disconnected");
                        shared.connected.store(false, Ordering::SeqCst);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // The rumqttc event loop reconnects internally; mark
                        // the link down until the next ConnAck.
                        shared.connected.store(false, Ordering::SeqCst);
                        debug!("gateway event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        if let Some(old) = self.event_task.lock().await.replace(task) {
            old.abort();
        }
        *self.client.lock().await = Some(client);

        // Wait briefly for the broker handshake so callers get a truthful
        // connected/failed answer.
        let deadline = tokio::time::Instant::now() + CONNECT_WAIT;
        while tokio::time::Instant::now() < deadline {
            if self.is_connected() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        warn!(
            "gateway broker {}:{} not reachable within {:?}",
            self.settings.broker_host, self.settings.broker_port, CONNECT_WAIT
        );
        self.is_connected()
    }

    async fn disconnect(&self) {
        let _guard = self.connect_guard.lock().await;
        if let Some(client) = self.client.lock().await.take() {
            let _ = client.disconnect().await;
        }
        if let Some(task) = self.event_task.lock().await.take() {
            task.abort();
        }
        self.shared.connected.store(false, Ordering::SeqCst);
        info!("disconnected from gateway broker");
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn local_node_id(&self) -> Option<u32> {
        Some(self.settings.gateway_node)
    }

    async fn send(&self, target: u32, mut request: AdminRequest, want_response: bool) -> Option<u32> {
        if !self.is_connected() && !self.connect().await {
            warn!("cannot send {}: gateway broker unreachable", request.op_name());
            return None;
        }
        request.session_token = self.shared.sessions.token_for(target);

        let (channel_index, channel_name) = self.settings.resolve_admin_channel();
        let command_id = new_command_id();

        let radio_payload = RadioPayload {
            port: PortKind::Admin as i32,
            payload: request.encode_to_vec(),
            want_response,
            request_id: 0,
        };

        let body = match &self.settings.psk {
            Some(psk) => {
                let key = derive_channel_key(psk, &channel_name);
                let ct = encrypt_payload(
                    &radio_payload.encode_to_vec(),
                    &key,
                    command_id,
                    self.settings.gateway_node,
                );
                crate::wire::mesh_envelope::Body::Encrypted(ct)
            }
            None => {
                warn!(
                    "SENDING ADMIN COMMAND UNENCRYPTED to {}: no pre-shared key configured",
                    format_node_id(target)
                );
                crate::wire::mesh_envelope::Body::Plain(radio_payload)
            }
        };

        let packet = MeshEnvelope {
            from: self.settings.gateway_node,
            to: target,
            id: command_id,
            channel: channel_index,
            want_ack: true,
            hop_limit: 3,
            body: Some(body),
        };
        let envelope = GatewayEnvelope {
            packet: Some(packet),
            channel_id: if channel_name.is_empty() {
                "primary".to_string()
            } else {
                channel_name.clone()
            },
            gateway_id: format_node_id(self.settings.gateway_node),
            version: WIRE_VERSION,
        };

        if want_response {
            self.shared.correlator.register(command_id);
        }

        let topic = self.publish_topic(&channel_name);
        let client = self.client.lock().await;
        let Some(client) = client.as_ref() else {
            self.shared.correlator.unregister(command_id);
            return None;
        };
        if let Err(e) = client
            .publish(topic, QoS::AtLeastOnce, false, envelope.encode_to_vec())
            .await
        {
            error!("gateway publish failed: {}", e);
            self.shared.correlator.unregister(command_id);
            return None;
        }
        debug!(
            "published {} for {} command_id={:08x}",
            request.op_name(),
            format_node_id(target),
            command_id
        );
        Some(command_id)
    }

    async fn await_response(&self, command_id: u32, timeout: Duration) -> Option<Reply> {
        self.shared.correlator.await_response(command_id, timeout).await
    }
}
