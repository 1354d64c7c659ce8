//! Static descriptions of the sensors a WS-1 channel exposes, and the
//! read-only view a subscriber uses to turn published state into a value.

use serde::Serialize;

use crate::snapshot::{CoordinatorState, SnapshotValue};

pub const MANUFACTURER: &str = "UbiBot";
pub const MODEL: &str = "WS-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Temperature,
    Humidity,
    Illuminance,
    Voltage,
    SignalStrength,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    TotalIncreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Primary,
    Diagnostic,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub icon: Option<&'static str>,
    pub category: EntityCategory,
}

const fn measurement(
    key: &'static str,
    name: &'static str,
    unit: Option<&'static str>,
    device_class: Option<DeviceClass>,
) -> SensorDescription {
    SensorDescription {
        key,
        name,
        unit,
        device_class,
        state_class: Some(StateClass::Measurement),
        icon: None,
        category: EntityCategory::Primary,
    }
}

const fn diagnostic(key: &'static str, name: &'static str, icon: &'static str) -> SensorDescription {
    SensorDescription {
        key,
        name,
        unit: None,
        device_class: None,
        state_class: None,
        icon: Some(icon),
        category: EntityCategory::Diagnostic,
    }
}

const fn diagnostic_timestamp(key: &'static str, name: &'static str) -> SensorDescription {
    SensorDescription {
        key,
        name,
        unit: None,
        device_class: Some(DeviceClass::Timestamp),
        state_class: None,
        icon: None,
        category: EntityCategory::Diagnostic,
    }
}

pub const SENSORS: &[SensorDescription] = &[
    measurement("field1", "Temperature", Some("°C"), Some(DeviceClass::Temperature)),
    measurement("field2", "Humidity", Some("%"), Some(DeviceClass::Humidity)),
    measurement("field3", "Light", Some("lx"), Some(DeviceClass::Illuminance)),
    measurement("field4", "Voltage", Some("V"), Some(DeviceClass::Voltage)),
    measurement("field5", "WiFi Signal Strength", Some("dBm"), Some(DeviceClass::SignalStrength)),
    measurement("field6", "Vibration Index", None, None),
    measurement("field7", "Knock Count", None, None),
    measurement("traffic_out", "Data Traffic Out", Some("kB"), None),
    measurement("traffic_in", "Data Traffic In", Some("kB"), None),
    diagnostic("mac_address", "MAC Address", "mdi:network"),
    diagnostic_timestamp("last_entry_date", "Last Data Update"),
    diagnostic_timestamp("activated_at", "Activation Date"),
    diagnostic("firmware", "Firmware Version", "mdi:chip"),
    diagnostic("device_id", "Device ID", "mdi:identifier"),
    diagnostic("serial", "Serial Number", "mdi:barcode"),
    diagnostic("last_ip", "IP Address", "mdi:ip-network"),
    diagnostic("plan_code", "Service Plan", "mdi:account-box"),
    SensorDescription {
        key: "usage",
        name: "Total Data Usage",
        unit: Some("kB"),
        device_class: None,
        state_class: Some(StateClass::TotalIncreasing),
        icon: Some("mdi:database"),
        category: EntityCategory::Diagnostic,
    },
    diagnostic("last_entry_id", "Entry ID", "mdi:counter"),
    diagnostic("wifi_ssid", "WiFi Network", "mdi:wifi"),
    diagnostic("usb_powered", "USB Power", "mdi:usb"),
];

pub fn describe(key: &str) -> Option<&'static SensorDescription> {
    SENSORS.iter().find(|s| s.key == key)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
}

impl DeviceInfo {
    pub fn for_channel(channel_id: &str) -> Self {
        Self {
            identifier: channel_id.to_string(),
            name: format!("UbiBot WS-1 ({channel_id})"),
            manufacturer: MANUFACTURER,
            model: MODEL,
        }
    }
}

/// One sensor of one channel, reading passively from published state.
#[derive(Debug, Clone)]
pub struct SensorView {
    description: &'static SensorDescription,
    unique_id: String,
    device: DeviceInfo,
}

impl SensorView {
    pub fn new(description: &'static SensorDescription, channel_id: &str) -> Self {
        Self {
            description,
            unique_id: format!("{channel_id}_{}", description.key),
            device: DeviceInfo::for_channel(channel_id),
        }
    }

    pub fn all_for_channel(channel_id: &str) -> Vec<Self> {
        SENSORS.iter().map(|d| Self::new(d, channel_id)).collect()
    }

    pub fn description(&self) -> &'static SensorDescription {
        self.description
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Available only while the last cycle succeeded and the key was produced.
    pub fn available(&self, state: &CoordinatorState) -> bool {
        state.last_success
            && state
                .snapshot
                .as_ref()
                .is_some_and(|s| s.contains(self.description.key))
    }

    /// The stored value, or `None` when the key is absent. Timestamp sensors
    /// only report parsed timestamps.
    pub fn native_value(&self, state: &CoordinatorState) -> Option<SnapshotValue> {
        let value = state.snapshot.as_ref()?.get(self.description.key)?;
        match (self.description.device_class, value) {
            (Some(DeviceClass::Timestamp), SnapshotValue::Timestamp(_)) => Some(value.clone()),
            (Some(DeviceClass::Timestamp), _) => None,
            _ => Some(value.clone()),
        }
    }
}
