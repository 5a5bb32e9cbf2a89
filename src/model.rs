use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

type Watts = f64;
type WattHours = f64;
type Celsius = f64;
type Volts = f64;
type Amperes = f64;
type Hertz = f64;
type Percent = f64;

/// Connection to a single Zap gateway.
#[derive(Debug, Clone)]
pub struct Api {
    pub base_url: String,
    pub timeout: Duration,
    pub client: reqwest::Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DerType {
    Pv,
    Battery,
    Meter,
    EvCharger,
    #[serde(other)]
    Unknown,
}

impl Default for DerType {
    fn default() -> Self {
        DerType::Unknown
    }
}

/* any value which is not a known type string, or no `type` at all, is an unknown DER */
fn lenient_der_type<'de, D: Deserializer<'de>>(d: D) -> Result<DerType, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/* a present flag is judged by truthiness, an absent one stays `None` */
fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Value::deserialize(d).map(|value| Some(truthy(&value)))
}

/// DER descriptor as reported by `/devices` and `/devices/{sn}/ders`. Fields of an unexpected
/// JSON type never fail the descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Der {
    #[serde(rename = "type", default, deserialize_with = "lenient_der_type")]
    pub der_type: DerType,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub enabled: Option<bool>,
    pub rated_power: Option<Value>,
    pub capacity: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub serial_number: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub device_type: Option<String>,
    pub profile: Option<String>,
    pub connected: Option<bool>,
    /// Opaque, as reported by the gateway
    pub last_harvest: Option<Value>,
    pub ders: Vec<Der>,
}

impl Device {
    /// DER types of this device. A DER without an `enabled` flag counts as enabled, a DER
    /// without a usable `type` counts as `Unknown`.
    pub fn der_types(&self) -> HashSet<DerType> {
        self.ders
            .iter()
            .filter(|der| der.enabled.unwrap_or(true))
            .map(|der| der.der_type)
            .collect()
    }
}

/// Normalized telemetry of one device. `None` means "unavailable", never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub serial_number: String,
    pub power: Option<Watts>,
    pub energy_import: Option<WattHours>,
    pub energy_export: Option<WattHours>,
    pub energy_production: Option<WattHours>,
    pub temperature: Option<Celsius>,
    pub rated_power: Option<Watts>,
    pub capacity: Option<WattHours>,

    pub pv_upper_limit: Option<Watts>,
    pub pv_lower_limit: Option<Watts>,
    pub pv_make: Option<String>,

    pub battery_power: Option<Watts>,
    pub battery_soc: Option<Percent>,
    pub battery_voltage: Option<Volts>,
    pub battery_current: Option<Amperes>,
    pub battery_charge_total: Option<WattHours>,
    pub battery_discharge_total: Option<WattHours>,
    pub battery_temperature: Option<Celsius>,
    pub battery_upper_limit: Option<Watts>,
    pub battery_lower_limit: Option<Watts>,
    pub battery_make: Option<String>,

    pub grid_frequency: Option<Hertz>,
    pub l1_voltage: Option<Volts>,
    pub l1_current: Option<Amperes>,
    pub l1_power: Option<Watts>,
    pub l2_voltage: Option<Volts>,
    pub l2_current: Option<Amperes>,
    pub l2_power: Option<Watts>,
    pub l3_voltage: Option<Volts>,
    pub l3_current: Option<Amperes>,
    pub l3_power: Option<Watts>,
    pub meter_make: Option<String>,
}

impl DeviceRecord {
    pub fn new(serial_number: &str) -> Self {
        DeviceRecord {
            serial_number: serial_number.to_owned(),
            ..Default::default()
        }
    }

    /// Current reading of sensor `key`, if the record carries one.
    pub fn sensor(&self, key: SensorKey) -> Option<f64> {
        match key {
            SensorKey::Power => self.power,
            SensorKey::EnergyImport => self.energy_import,
            SensorKey::EnergyExport => self.energy_export,
            SensorKey::EnergyProduction => self.energy_production,
            SensorKey::Temperature => self.temperature,
            SensorKey::SignalStrength => None,
            SensorKey::BatterySoc => self.battery_soc,
            SensorKey::BatteryPower => self.battery_power,
            SensorKey::BatteryVoltage => self.battery_voltage,
            SensorKey::BatteryCurrent => self.battery_current,
            SensorKey::BatteryChargeTotal => self.battery_charge_total,
            SensorKey::BatteryDischargeTotal => self.battery_discharge_total,
            SensorKey::BatteryTemperature => self.battery_temperature,
            SensorKey::BatteryUpperLimit => self.battery_upper_limit,
            SensorKey::BatteryLowerLimit => self.battery_lower_limit,
            SensorKey::GridFrequency => self.grid_frequency,
            SensorKey::L1Voltage => self.l1_voltage,
            SensorKey::L1Current => self.l1_current,
            SensorKey::L1Power => self.l1_power,
            SensorKey::L2Voltage => self.l2_voltage,
            SensorKey::L2Current => self.l2_current,
            SensorKey::L2Power => self.l2_power,
            SensorKey::L3Voltage => self.l3_voltage,
            SensorKey::L3Current => self.l3_current,
            SensorKey::L3Power => self.l3_power,
        }
    }
}

/// Normalized gateway system information.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GatewayRecord {
    pub uptime_seconds: Option<f64>,
    pub gateway_temperature: Option<Celsius>,
    pub memory_percent: Option<Percent>,
    pub memory_free: Option<f64>,
    pub firmware_version: Option<String>,
    pub sdk_version: Option<String>,
    pub device_id: Option<String>,
    pub local_ip: Option<String>,
    pub wifi_ssid: Option<String>,
    pub wifi_status: Option<String>,
    pub signal_strength: Option<f64>,
}

impl GatewayRecord {
    pub fn is_empty(&self) -> bool {
        *self == GatewayRecord::default()
    }
}

/// Per-device sensors which may be exposed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKey {
    Power,
    EnergyImport,
    EnergyExport,
    EnergyProduction,
    Temperature,
    SignalStrength,
    BatterySoc,
    BatteryPower,
    BatteryVoltage,
    BatteryCurrent,
    BatteryChargeTotal,
    BatteryDischargeTotal,
    BatteryTemperature,
    BatteryUpperLimit,
    BatteryLowerLimit,
    GridFrequency,
    L1Voltage,
    L1Current,
    L1Power,
    L2Voltage,
    L2Current,
    L2Power,
    L3Voltage,
    L3Current,
    L3Power,
}

impl SensorKey {
    pub const ALL: [SensorKey; 25] = [
        SensorKey::Power,
        SensorKey::EnergyImport,
        SensorKey::EnergyExport,
        SensorKey::EnergyProduction,
        SensorKey::Temperature,
        SensorKey::SignalStrength,
        SensorKey::BatterySoc,
        SensorKey::BatteryPower,
        SensorKey::BatteryVoltage,
        SensorKey::BatteryCurrent,
        SensorKey::BatteryChargeTotal,
        SensorKey::BatteryDischargeTotal,
        SensorKey::BatteryTemperature,
        SensorKey::BatteryUpperLimit,
        SensorKey::BatteryLowerLimit,
        SensorKey::GridFrequency,
        SensorKey::L1Voltage,
        SensorKey::L1Current,
        SensorKey::L1Power,
        SensorKey::L2Voltage,
        SensorKey::L2Current,
        SensorKey::L2Power,
        SensorKey::L3Voltage,
        SensorKey::L3Current,
        SensorKey::L3Power,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKey::Power => "power",
            SensorKey::EnergyImport => "energy_import",
            SensorKey::EnergyExport => "energy_export",
            SensorKey::EnergyProduction => "energy_production",
            SensorKey::Temperature => "temperature",
            SensorKey::SignalStrength => "signal_strength",
            SensorKey::BatterySoc => "battery_soc",
            SensorKey::BatteryPower => "battery_power",
            SensorKey::BatteryVoltage => "battery_voltage",
            SensorKey::BatteryCurrent => "battery_current",
            SensorKey::BatteryChargeTotal => "battery_charge_total",
            SensorKey::BatteryDischargeTotal => "battery_discharge_total",
            SensorKey::BatteryTemperature => "battery_temperature",
            SensorKey::BatteryUpperLimit => "battery_upper_limit",
            SensorKey::BatteryLowerLimit => "battery_lower_limit",
            SensorKey::GridFrequency => "grid_frequency",
            SensorKey::L1Voltage => "l1_voltage",
            SensorKey::L1Current => "l1_current",
            SensorKey::L1Power => "l1_power",
            SensorKey::L2Voltage => "l2_voltage",
            SensorKey::L2Current => "l2_current",
            SensorKey::L2Power => "l2_power",
            SensorKey::L3Voltage => "l3_voltage",
            SensorKey::L3Current => "l3_current",
            SensorKey::L3Power => "l3_power",
        }
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKey::ALL
            .iter()
            .find(|key| key.as_str() == s)
            .copied()
            .ok_or(())
    }
}
