//! Operation catalogue: the enumerated configuration categories a node
//! exposes to remote administration.
//!
//! Eight core config categories, thirteen module categories, and eight
//! channel slots. Wire discriminants are part of the protocol and must not
//! be reordered. The string forms are used as keys in audit entries, job
//! parameters, and backup records.

use serde::{Deserialize, Serialize};

use crate::wire::{config_payload, module_payload, ConfigPayload, ModulePayload};

/// Core configuration categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ConfigKind {
    Device = 0,
    Position = 1,
    Power = 2,
    Network = 3,
    Display = 4,
    Lora = 5,
    Bluetooth = 6,
    Security = 7,
}

impl ConfigKind {
    pub const ALL: [ConfigKind; 8] = [
        ConfigKind::Device,
        ConfigKind::Position,
        ConfigKind::Power,
        ConfigKind::Network,
        ConfigKind::Display,
        ConfigKind::Lora,
        ConfigKind::Bluetooth,
        ConfigKind::Security,
    ];

    pub fn wire_value(&self) -> i32 {
        *self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKind::Device => "device",
            ConfigKind::Position => "position",
            ConfigKind::Power => "power",
            ConfigKind::Network => "network",
            ConfigKind::Display => "display",
            ConfigKind::Lora => "lora",
            ConfigKind::Bluetooth => "bluetooth",
            ConfigKind::Security => "security",
        }
    }

    pub fn from_name(name: &str) -> Option<ConfigKind> {
        ConfigKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == name.to_ascii_lowercase())
    }

    /// Does a reply payload carry this category?
    pub fn matches(&self, payload: &ConfigPayload) -> bool {
        use config_payload::Variant;
        matches!(
            (&payload.variant, self),
            (Some(Variant::Device(_)), ConfigKind::Device)
                | (Some(Variant::Position(_)), ConfigKind::Position)
                | (Some(Variant::Power(_)), ConfigKind::Power)
                | (Some(Variant::Network(_)), ConfigKind::Network)
                | (Some(Variant::Display(_)), ConfigKind::Display)
                | (Some(Variant::Lora(_)), ConfigKind::Lora)
                | (Some(Variant::Bluetooth(_)), ConfigKind::Bluetooth)
                | (Some(Variant::Security(_)), ConfigKind::Security)
        )
    }

    /// Category a payload belongs to.
    pub fn of(payload: &ConfigPayload) -> Option<ConfigKind> {
        use config_payload::Variant;
        match payload.variant.as_ref()? {
            Variant::Device(_) => Some(ConfigKind::Device),
            Variant::Position(_) => Some(ConfigKind::Position),
            Variant::Power(_) => Some(ConfigKind::Power),
            Variant::Network(_) => Some(ConfigKind::Network),
            Variant::Display(_) => Some(ConfigKind::Display),
            Variant::Lora(_) => Some(ConfigKind::Lora),
            Variant::Bluetooth(_) => Some(ConfigKind::Bluetooth),
            Variant::Security(_) => Some(ConfigKind::Security),
        }
    }
}

impl std::fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Module configuration categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ModuleKind {
    Mqtt = 0,
    Serial = 1,
    ExtNotify = 2,
    StoreForward = 3,
    RangeTest = 4,
    Telemetry = 5,
    CannedMessage = 6,
    Audio = 7,
    RemoteHardware = 8,
    NeighborInfo = 9,
    AmbientLighting = 10,
    DetectionSensor = 11,
    Paxcounter = 12,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 13] = [
        ModuleKind::Mqtt,
        ModuleKind::Serial,
        ModuleKind::ExtNotify,
        ModuleKind::StoreForward,
        ModuleKind::RangeTest,
        ModuleKind::Telemetry,
        ModuleKind::CannedMessage,
        ModuleKind::Audio,
        ModuleKind::RemoteHardware,
        ModuleKind::NeighborInfo,
        ModuleKind::AmbientLighting,
        ModuleKind::DetectionSensor,
        ModuleKind::Paxcounter,
    ];

    pub fn wire_value(&self) -> i32 {
        *self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Mqtt => "mqtt",
            ModuleKind::Serial => "serial",
            ModuleKind::ExtNotify => "ext_notify",
            ModuleKind::StoreForward => "store_forward",
            ModuleKind::RangeTest => "range_test",
            ModuleKind::Telemetry => "telemetry",
            ModuleKind::CannedMessage => "canned_message",
            ModuleKind::Audio => "audio",
            ModuleKind::RemoteHardware => "remote_hardware",
            ModuleKind::NeighborInfo => "neighbor_info",
            ModuleKind::AmbientLighting => "ambient_lighting",
            ModuleKind::DetectionSensor => "detection_sensor",
            ModuleKind::Paxcounter => "paxcounter",
        }
    }

    pub fn from_name(name: &str) -> Option<ModuleKind> {
        let lowered = name.to_ascii_lowercase();
        ModuleKind::ALL.iter().copied().find(|k| k.as_str() == lowered)
    }

    pub fn matches(&self, payload: &ModulePayload) -> bool {
        ModuleKind::of(payload) == Some(*self)
    }

    pub fn of(payload: &ModulePayload) -> Option<ModuleKind> {
        use module_payload::Variant;
        match payload.variant.as_ref()? {
            Variant::Mqtt(_) => Some(ModuleKind::Mqtt),
            Variant::Serial(_) => Some(ModuleKind::Serial),
            Variant::ExtNotify(_) => Some(ModuleKind::ExtNotify),
            Variant::StoreForward(_) => Some(ModuleKind::StoreForward),
            Variant::RangeTest(_) => Some(ModuleKind::RangeTest),
            Variant::Telemetry(_) => Some(ModuleKind::Telemetry),
            Variant::CannedMessage(_) => Some(ModuleKind::CannedMessage),
            Variant::Audio(_) => Some(ModuleKind::Audio),
            Variant::RemoteHardware(_) => Some(ModuleKind::RemoteHardware),
            Variant::NeighborInfo(_) => Some(ModuleKind::NeighborInfo),
            Variant::AmbientLighting(_) => Some(ModuleKind::AmbientLighting),
            Variant::DetectionSensor(_) => Some(ModuleKind::DetectionSensor),
            Variant::Paxcounter(_) => Some(ModuleKind::Paxcounter),
        }
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a typed core-config payload from plain JSON for the given
/// category. This is the one sanctioned entry point from untyped job
/// parameters into wire payloads; each category deserializes into its
/// explicit struct (unknown fields are rejected by shape, not reflection).
pub fn config_payload_from_json(
    kind: ConfigKind,
    value: serde_json::Value,
) -> Result<ConfigPayload, serde_json::Error> {
    use config_payload::Variant;
    let variant = match kind {
        ConfigKind::Device => Variant::Device(serde_json::from_value(value)?),
        ConfigKind::Position => Variant::Position(serde_json::from_value(value)?),
        ConfigKind::Power => Variant::Power(serde_json::from_value(value)?),
        ConfigKind::Network => Variant::Network(serde_json::from_value(value)?),
        ConfigKind::Display => Variant::Display(serde_json::from_value(value)?),
        ConfigKind::Lora => Variant::Lora(serde_json::from_value(value)?),
        ConfigKind::Bluetooth => Variant::Bluetooth(serde_json::from_value(value)?),
        ConfigKind::Security => Variant::Security(serde_json::from_value(value)?),
    };
    Ok(ConfigPayload {
        variant: Some(variant),
    })
}

/// Module-config counterpart of [`config_payload_from_json`].
pub fn module_payload_from_json(
    kind: ModuleKind,
    value: serde_json::Value,
) -> Result<ModulePayload, serde_json::Error> {
    use module_payload::Variant;
    let variant = match kind {
        ModuleKind::Mqtt => Variant::Mqtt(serde_json::from_value(value)?),
        ModuleKind::Serial => Variant::Serial(serde_json::from_value(value)?),
        ModuleKind::ExtNotify => Variant::ExtNotify(serde_json::from_value(value)?),
        ModuleKind::StoreForward => Variant::StoreForward(serde_json::from_value(value)?),
        ModuleKind::RangeTest => Variant::RangeTest(serde_json::from_value(value)?),
        ModuleKind::Telemetry => Variant::Telemetry(serde_json::from_value(value)?),
        ModuleKind::CannedMessage => Variant::CannedMessage(serde_json::from_value(value)?),
        ModuleKind::Audio => Variant::Audio(serde_json::from_value(value)?),
        ModuleKind::RemoteHardware => Variant::RemoteHardware(serde_json::from_value(value)?),
        ModuleKind::NeighborInfo => Variant::NeighborInfo(serde_json::from_value(value)?),
        ModuleKind::AmbientLighting => Variant::AmbientLighting(serde_json::from_value(value)?),
        ModuleKind::DetectionSensor => Variant::DetectionSensor(serde_json::from_value(value)?),
        ModuleKind::Paxcounter => Variant::Paxcounter(serde_json::from_value(value)?),
    };
    Ok(ModulePayload {
        variant: Some(variant),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{DeviceConfig, TelemetryModuleConfig};

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(ConfigKind::Device.wire_value(), 0);
        assert_eq!(ConfigKind::Lora.wire_value(), 5);
        assert_eq!(ConfigKind::Security.wire_value(), 7);
        assert_eq!(ModuleKind::Mqtt.wire_value(), 0);
        assert_eq!(ModuleKind::Paxcounter.wire_value(), 12);
    }

    #[test]
    fn name_roundtrip_covers_all_kinds() {
        for kind in ConfigKind::ALL {
            assert_eq!(ConfigKind::from_name(kind.as_str()), Some(kind));
        }
        for kind in ModuleKind::ALL {
            assert_eq!(ModuleKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ConfigKind::from_name("LORA"), Some(ConfigKind::Lora));
        assert_eq!(ConfigKind::from_name("bogus"), None);
    }

    #[test]
    fn payload_matching() {
        let payload = ConfigPayload {
            variant: Some(config_payload::Variant::Device(DeviceConfig::default())),
        };
        assert!(ConfigKind::Device.matches(&payload));
        assert!(!ConfigKind::Lora.matches(&payload));
        assert_eq!(ConfigKind::of(&payload), Some(ConfigKind::Device));

        let module = ModulePayload {
            variant: Some(module_payload::Variant::Telemetry(
                TelemetryModuleConfig::default(),
            )),
        };
        assert!(ModuleKind::Telemetry.matches(&module));
        assert_eq!(ModuleKind::of(&module), Some(ModuleKind::Telemetry));
    }
}
