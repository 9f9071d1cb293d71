//! # Wire Message Module
//!
//! Binary message definitions for the node control protocol. Every frame that
//! crosses a transport is a varint length-delimited [`MeshEnvelope`] (see
//! [`framer`]); the broadcast gateway additionally wraps envelopes in a
//! [`GatewayEnvelope`] and encrypts the payload (see [`cipher`]).
//!
//! The schema is owned by this project and versioned through
//! [`WIRE_VERSION`]. Messages are hand-written `prost` structs rather than
//! generated code: the catalogue is small, stable, and benefits from carrying
//! `serde` derives for audit/backup persistence alongside the prost encoding.
//!
//! ## Addressing
//!
//! Nodes are addressed by a 32-bit id, rendered as `!xxxxxxxx` (lowercase
//! hex, leading bang) everywhere a human sees one. Channel slots are indexed
//! 0–7 by callers; `get channel` requests carry the index **1-based** on the
//! wire so that 0 can mean "unset".

pub mod cipher;
pub mod framer;

/// Wire protocol version carried in every gateway envelope.
pub const WIRE_VERSION: u32 = 2;

/// Number of channel slots a node exposes.
pub const CHANNEL_SLOTS: u32 = 8;

/// Render a node id in the canonical `!xxxxxxxx` form.
pub fn format_node_id(id: u32) -> String {
    format!("!{:08x}", id)
}

/// Parse a node id from `!hex`, bare hex, `0xhex`, or decimal.
pub fn parse_node_id(s: &str) -> Option<u32> {
    let t = s.trim();
    if let Some(hex) = t.strip_prefix('!') {
        return u32::from_str_radix(hex, 16).ok();
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    if let Ok(dec) = t.parse::<u32>() {
        return Some(dec);
    }
    // 8-hex-digit strings without a marker are common in pasted ids
    if t.len() == 8 && t.chars().all(|c| c.is_ascii_hexdigit()) {
        return u32::from_str_radix(t, 16).ok();
    }
    None
}

/// Logical port a payload is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PortKind {
    Unknown = 0,
    /// Link-liveness probe; no payload, no reply expected beyond transport ack.
    Heartbeat = 1,
    /// Routing-level delivery reports ([`RouteAck`]).
    Routing = 5,
    /// Administration requests and replies.
    Admin = 6,
}

/// Inner payload of an envelope once decrypted.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RadioPayload {
    #[prost(enumeration = "PortKind", tag = "1")]
    pub port: i32,
    /// Port-specific encoded message ([`AdminRequest`], [`AdminReply`], [`RouteAck`]).
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub want_response: bool,
    /// On replies: the command id of the request being answered. 0 = uncorrelated.
    #[prost(uint32, tag = "4")]
    pub request_id: u32,
}

/// Top-level frame exchanged with a node.
#[derive(Clone, PartialEq, prost::Message)]
pub struct MeshEnvelope {
    #[prost(uint32, tag = "1")]
    pub from: u32,
    #[prost(uint32, tag = "2")]
    pub to: u32,
    /// Command id: random, process-unique while outstanding.
    #[prost(uint32, tag = "3")]
    pub id: u32,
    /// Channel slot the frame was sent on.
    #[prost(uint32, tag = "4")]
    pub channel: u32,
    #[prost(bool, tag = "5")]
    pub want_ack: bool,
    #[prost(uint32, tag = "6")]
    pub hop_limit: u32,
    #[prost(oneof = "mesh_envelope::Body", tags = "7, 8")]
    pub body: Option<mesh_envelope::Body>,
}

pub mod mesh_envelope {
    /// Payload body: cleartext on trusted links, AES-CTR ciphertext on broadcast.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "7")]
        Plain(super::RadioPayload),
        #[prost(bytes, tag = "8")]
        Encrypted(Vec<u8>),
    }
}

/// Wrapper used on the publish/subscribe gateway link.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GatewayEnvelope {
    #[prost(message, optional, tag = "1")]
    pub packet: Option<MeshEnvelope>,
    /// Channel name the gateway bridged this frame from/to.
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// `!xxxxxxxx` id of the bridging gateway node.
    #[prost(string, tag = "3")]
    pub gateway_id: String,
    #[prost(uint32, tag = "4")]
    pub version: u32,
}

/// Routing-level delivery report. `error == 0` is an ACK; anything else is
/// an explicit negative acknowledgement with a reason code.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RouteAck {
    #[prost(uint32, tag = "1")]
    pub request_id: u32,
    #[prost(int32, tag = "2")]
    pub error: i32,
}

impl RouteAck {
    pub fn is_ack(&self) -> bool {
        self.error == 0
    }

    /// Human-readable reason for a NAK.
    pub fn reason(&self) -> &'static str {
        match self.error {
            0 => "none",
            1 => "no route",
            2 => "got nak",
            3 => "timeout",
            5 => "no channel",
            7 => "no response",
            32 => "not authorized",
            _ => "unknown",
        }
    }
}

// ---------------------------------------------------------------------------
// Admin operation taxonomy
// ---------------------------------------------------------------------------

/// Administration request sent to a target node.
///
/// `session_token` echoes the opaque token the node handed back on a prior
/// reply; nodes reject privileged operations without a current token, so the
/// sender attaches whatever it has cached for the target (possibly empty on
/// the first exchange).
#[derive(Clone, PartialEq, prost::Message)]
pub struct AdminRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub session_token: Vec<u8>,
    #[prost(oneof = "admin_request::Op", tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16")]
    pub op: Option<admin_request::Op>,
}

pub mod admin_request {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Op {
        #[prost(bool, tag = "2")]
        GetDeviceMetadata(bool),
        /// Value is a [`super::ConfigKind`](crate::admin::catalog::ConfigKind) discriminant.
        #[prost(int32, tag = "3")]
        GetConfig(i32),
        /// Value is a [`ModuleKind`](crate::admin::catalog::ModuleKind) discriminant.
        #[prost(int32, tag = "4")]
        GetModuleConfig(i32),
        /// Channel slot, 1-based on the wire.
        #[prost(uint32, tag = "5")]
        GetChannel(u32),
        #[prost(message, tag = "6")]
        SetConfig(super::ConfigPayload),
        #[prost(message, tag = "7")]
        SetModuleConfig(super::ModulePayload),
        #[prost(message, tag = "8")]
        SetChannel(super::ChannelSettings),
        #[prost(uint32, tag = "9")]
        RebootSeconds(u32),
        #[prost(uint32, tag = "10")]
        ShutdownSeconds(u32),
        #[prost(uint32, tag = "11")]
        RemoveNode(u32),
        #[prost(bool, tag = "12")]
        NodedbReset(bool),
        #[prost(bool, tag = "13")]
        FactoryResetConfig(bool),
        #[prost(bool, tag = "14")]
        FactoryResetDevice(bool),
        #[prost(bool, tag = "15")]
        BeginEditSettings(bool),
        #[prost(bool, tag = "16")]
        CommitEditSettings(bool),
    }
}

impl AdminRequest {
    pub fn new(op: admin_request::Op) -> Self {
        AdminRequest {
            session_token: Vec::new(),
            op: Some(op),
        }
    }

    /// Short label for audit logs.
    pub fn op_name(&self) -> &'static str {
        use admin_request::Op;
        match self.op {
            Some(Op::GetDeviceMetadata(_)) => "get_device_metadata",
            Some(Op::GetConfig(_)) => "get_config",
            Some(Op::GetModuleConfig(_)) => "get_module_config",
            Some(Op::GetChannel(_)) => "get_channel",
            Some(Op::SetConfig(_)) => "set_config",
            Some(Op::SetModuleConfig(_)) => "set_module_config",
            Some(Op::SetChannel(_)) => "set_channel",
            Some(Op::RebootSeconds(_)) => "reboot",
            Some(Op::ShutdownSeconds(_)) => "shutdown",
            Some(Op::RemoveNode(_)) => "remove_node",
            Some(Op::NodedbReset(_)) => "nodedb_reset",
            Some(Op::FactoryResetConfig(_)) => "factory_reset_config",
            Some(Op::FactoryResetDevice(_)) => "factory_reset_device",
            Some(Op::BeginEditSettings(_)) => "begin_edit_settings",
            Some(Op::CommitEditSettings(_)) => "commit_edit_settings",
            None => "empty",
        }
    }
}

/// Administration reply from a node. `session_token` carries the (possibly
/// refreshed) opaque token to attach to subsequent requests.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AdminReply {
    #[prost(bytes = "vec", tag = "1")]
    pub session_token: Vec<u8>,
    #[prost(oneof = "admin_reply::Body", tags = "2, 3, 4, 5, 6")]
    pub body: Option<admin_reply::Body>,
}

pub mod admin_reply {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "2")]
        DeviceMetadata(super::DeviceMetadata),
        #[prost(message, tag = "3")]
        Config(super::ConfigPayload),
        #[prost(message, tag = "4")]
        ModuleConfig(super::ModulePayload),
        #[prost(message, tag = "5")]
        Channel(super::ChannelSettings),
        /// Explicit accept/reject for edit-transaction brackets.
        #[prost(bool, tag = "6")]
        Ack(bool),
    }
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct DeviceMetadata {
    #[prost(string, tag = "1")]
    pub firmware_version: String,
    #[prost(uint32, tag = "2")]
    pub device_state_version: u32,
    #[prost(bool, tag = "3")]
    pub can_shutdown: bool,
    #[prost(bool, tag = "4")]
    pub has_wifi: bool,
    #[prost(bool, tag = "5")]
    pub has_bluetooth: bool,
    #[prost(int32, tag = "6")]
    pub role: i32,
    #[prost(int32, tag = "7")]
    pub hw_model: i32,
}

// ---------------------------------------------------------------------------
// Core configuration categories (explicit typed payloads, one per category)
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct ConfigPayload {
    #[prost(oneof = "config_payload::Variant", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub variant: Option<config_payload::Variant>,
}

pub mod config_payload {
    #[derive(Clone, PartialEq, prost::Oneof, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Variant {
        #[prost(message, tag = "1")]
        Device(super::DeviceConfig),
        #[prost(message, tag = "2")]
        Position(super::PositionConfig),
        #[prost(message, tag = "3")]
        Power(super::PowerConfig),
        #[prost(message, tag = "4")]
        Network(super::NetworkConfig),
        #[prost(message, tag = "5")]
        Display(super::DisplayConfig),
        #[prost(message, tag = "6")]
        Lora(super::LoraConfig),
        #[prost(message, tag = "7")]
        Bluetooth(super::BluetoothConfig),
        #[prost(message, tag = "8")]
        Security(super::SecurityConfig),
    }
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct DeviceConfig {
    #[prost(int32, tag = "1")]
    pub role: i32,
    #[prost(bool, tag = "2")]
    pub serial_enabled: bool,
    #[prost(uint32, tag = "3")]
    pub button_gpio: u32,
    #[prost(uint32, tag = "4")]
    pub buzzer_gpio: u32,
    #[prost(int32, tag = "5")]
    pub rebroadcast_mode: i32,
    #[prost(uint32, tag = "6")]
    pub node_info_broadcast_secs: u32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct PositionConfig {
    #[prost(uint32, tag = "1")]
    pub position_broadcast_secs: u32,
    #[prost(bool, tag = "2")]
    pub position_broadcast_smart_enabled: bool,
    #[prost(int32, tag = "3")]
    pub gps_mode: i32,
    #[prost(bool, tag = "4")]
    pub fixed_position: bool,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct PowerConfig {
    #[prost(bool, tag = "1")]
    pub is_power_saving: bool,
    #[prost(uint32, tag = "2")]
    pub on_battery_shutdown_after_secs: u32,
    #[prost(float, tag = "3")]
    pub adc_multiplier_override: f32,
    #[prost(uint32, tag = "4")]
    pub wait_bluetooth_secs: u32,
    #[prost(uint32, tag = "5")]
    pub sds_secs: u32,
    #[prost(uint32, tag = "6")]
    pub ls_secs: u32,
    #[prost(uint32, tag = "7")]
    pub min_wake_secs: u32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct NetworkConfig {
    #[prost(bool, tag = "1")]
    pub wifi_enabled: bool,
    #[prost(string, tag = "2")]
    pub wifi_ssid: String,
    #[prost(string, tag = "3")]
    pub wifi_psk: String,
    #[prost(bool, tag = "4")]
    pub eth_enabled: bool,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct DisplayConfig {
    #[prost(uint32, tag = "1")]
    pub screen_on_secs: u32,
    #[prost(int32, tag = "2")]
    pub gps_format: i32,
    #[prost(uint32, tag = "3")]
    pub auto_screen_carousel_secs: u32,
    #[prost(bool, tag = "4")]
    pub compass_north_top: bool,
    #[prost(bool, tag = "5")]
    pub flip_screen: bool,
    #[prost(int32, tag = "6")]
    pub units: i32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct LoraConfig {
    #[prost(bool, tag = "1")]
    pub use_preset: bool,
    #[prost(int32, tag = "2")]
    pub modem_preset: i32,
    #[prost(uint32, tag = "3")]
    pub bandwidth: u32,
    #[prost(uint32, tag = "4")]
    pub spread_factor: u32,
    #[prost(uint32, tag = "5")]
    pub coding_rate: u32,
    #[prost(float, tag = "6")]
    pub frequency_offset: f32,
    #[prost(int32, tag = "7")]
    pub region: i32,
    #[prost(uint32, tag = "8")]
    pub hop_limit: u32,
    #[prost(bool, tag = "9")]
    pub tx_enabled: bool,
    #[prost(int32, tag = "10")]
    pub tx_power: i32,
    #[prost(uint32, tag = "11")]
    pub channel_num: u32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct BluetoothConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(int32, tag = "2")]
    pub mode: i32,
    #[prost(uint32, tag = "3")]
    pub fixed_pin: u32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct SecurityConfig {
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub private_key: Vec<u8>,
    /// Public keys authorized to administer this node.
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub admin_keys: Vec<Vec<u8>>,
    #[prost(bool, tag = "4")]
    pub is_managed: bool,
    #[prost(bool, tag = "5")]
    pub serial_enabled: bool,
    #[prost(bool, tag = "6")]
    pub debug_log_api_enabled: bool,
}

// ---------------------------------------------------------------------------
// Module configuration categories
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct ModulePayload {
    #[prost(
        oneof = "module_payload::Variant",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13"
    )]
    pub variant: Option<module_payload::Variant>,
}

pub mod module_payload {
    #[derive(Clone, PartialEq, prost::Oneof, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Variant {
        #[prost(message, tag = "1")]
        Mqtt(super::MqttModuleConfig),
        #[prost(message, tag = "2")]
        Serial(super::SerialModuleConfig),
        #[prost(message, tag = "3")]
        ExtNotify(super::ExtNotifyModuleConfig),
        #[prost(message, tag = "4")]
        StoreForward(super::StoreForwardModuleConfig),
        #[prost(message, tag = "5")]
        RangeTest(super::RangeTestModuleConfig),
        #[prost(message, tag = "6")]
        Telemetry(super::TelemetryModuleConfig),
        #[prost(message, tag = "7")]
        CannedMessage(super::CannedMessageModuleConfig),
        #[prost(message, tag = "8")]
        Audio(super::AudioModuleConfig),
        #[prost(message, tag = "9")]
        RemoteHardware(super::RemoteHardwareModuleConfig),
        #[prost(message, tag = "10")]
        NeighborInfo(super::NeighborInfoModuleConfig),
        #[prost(message, tag = "11")]
        AmbientLighting(super::AmbientLightingModuleConfig),
        #[prost(message, tag = "12")]
        DetectionSensor(super::DetectionSensorModuleConfig),
        #[prost(message, tag = "13")]
        Paxcounter(super::PaxcounterModuleConfig),
    }
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct MqttModuleConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(string, tag = "2")]
    pub address: String,
    #[prost(string, tag = "3")]
    pub username: String,
    #[prost(string, tag = "4")]
    pub password: String,
    #[prost(bool, tag = "5")]
    pub encryption_enabled: bool,
    #[prost(bool, tag = "6")]
    pub json_enabled: bool,
    #[prost(string, tag = "7")]
    pub root_topic: String,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct SerialModuleConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(bool, tag = "2")]
    pub echo: bool,
    #[prost(uint32, tag = "3")]
    pub rxd: u32,
    #[prost(uint32, tag = "4")]
    pub txd: u32,
    #[prost(uint32, tag = "5")]
    pub baud: u32,
    #[prost(uint32, tag = "6")]
    pub timeout: u32,
    #[prost(int32, tag = "7")]
    pub mode: i32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct ExtNotifyModuleConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(uint32, tag = "2")]
    pub output_ms: u32,
    #[prost(uint32, tag = "3")]
    pub output: u32,
    #[prost(bool, tag = "4")]
    pub active: bool,
    #[prost(bool, tag = "5")]
    pub alert_message: bool,
    #[prost(bool, tag = "6")]
    pub alert_bell: bool,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct StoreForwardModuleConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(bool, tag = "2")]
    pub heartbeat: bool,
    #[prost(uint32, tag = "3")]
    pub records: u32,
    #[prost(uint32, tag = "4")]
    pub history_return_max: u32,
    #[prost(uint32, tag = "5")]
    pub history_return_window: u32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct RangeTestModuleConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(uint32, tag = "2")]
    pub sender: u32,
    #[prost(bool, tag = "3")]
    pub save: bool,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct TelemetryModuleConfig {
    #[prost(uint32, tag = "1")]
    pub device_update_interval: u32,
    #[prost(uint32, tag = "2")]
    pub environment_update_interval: u32,
    #[prost(bool, tag = "3")]
    pub environment_measurement_enabled: bool,
    #[prost(bool, tag = "4")]
    pub environment_screen_enabled: bool,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct CannedMessageModuleConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(string, tag = "2")]
    pub allow_input_source: String,
    #[prost(bool, tag = "3")]
    pub send_bell: bool,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct AudioModuleConfig {
    #[prost(bool, tag = "1")]
    pub codec2_enabled: bool,
    #[prost(uint32, tag = "2")]
    pub ptt_pin: u32,
    #[prost(int32, tag = "3")]
    pub bitrate: i32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct RemoteHardwareModuleConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(bool, tag = "2")]
    pub allow_undefined_pin_access: bool,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct NeighborInfoModuleConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(uint32, tag = "2")]
    pub update_interval: u32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct AmbientLightingModuleConfig {
    #[prost(bool, tag = "1")]
    pub led_state: bool,
    #[prost(uint32, tag = "2")]
    pub current: u32,
    #[prost(uint32, tag = "3")]
    pub red: u32,
    #[prost(uint32, tag = "4")]
    pub green: u32,
    #[prost(uint32, tag = "5")]
    pub blue: u32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct DetectionSensorModuleConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(uint32, tag = "2")]
    pub minimum_broadcast_secs: u32,
    #[prost(int32, tag = "3")]
    pub detection_trigger_type: i32,
    #[prost(uint32, tag = "4")]
    pub monitor_pin: u32,
    #[prost(string, tag = "5")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct PaxcounterModuleConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(uint32, tag = "2")]
    pub update_interval: u32,
}

// ---------------------------------------------------------------------------
// Channel settings
// ---------------------------------------------------------------------------

/// One channel slot. `index` is the caller-facing 0-based slot; only the
/// `get channel` *request* shifts to 1-based on the wire.
#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct ChannelSettings {
    #[prost(uint32, tag = "1")]
    pub index: u32,
    /// 0 = disabled, 1 = primary, 2 = secondary.
    #[prost(int32, tag = "2")]
    pub role: i32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(bytes = "vec", tag = "4")]
    pub psk: Vec<u8>,
    #[prost(uint32, tag = "5")]
    pub position_precision: u32,
}
