//! Which sensors are meaningful for a device, given the DER types it is composed of.
//!
//! Eligibility is a property of the device, not of a single reading: a battery device exposes
//! `battery_soc` even when the last poll returned a sentinel for it.

use crate::model::{DerType, SensorKey};
use std::collections::HashSet;

pub fn sensor_eligible(key: SensorKey, der_types: &HashSet<DerType>) -> bool {
    let has = |der_type: DerType| der_types.contains(&der_type);
    /* a PV inverter's embedded meter is never exposed */
    let standalone_meter = has(DerType::Meter) && !has(DerType::Pv);

    match key {
        SensorKey::BatterySoc
        | SensorKey::BatteryPower
        | SensorKey::BatteryVoltage
        | SensorKey::BatteryCurrent
        | SensorKey::BatteryChargeTotal
        | SensorKey::BatteryDischargeTotal
        | SensorKey::BatteryTemperature
        | SensorKey::BatteryUpperLimit
        | SensorKey::BatteryLowerLimit => has(DerType::Battery),

        SensorKey::EnergyProduction | SensorKey::Temperature => has(DerType::Pv),

        SensorKey::EnergyImport
        | SensorKey::EnergyExport
        | SensorKey::GridFrequency
        | SensorKey::L1Voltage
        | SensorKey::L1Current
        | SensorKey::L1Power
        | SensorKey::L2Voltage
        | SensorKey::L2Current
        | SensorKey::L2Power
        | SensorKey::L3Voltage
        | SensorKey::L3Current
        | SensorKey::L3Power => standalone_meter,

        SensorKey::Power => !der_types.is_empty(),

        /* not reported by any device endpoint */
        SensorKey::SignalStrength => false,
    }
}

/// Whether sensor `sensor_key` should be exposed for a device with `der_types`. Unknown keys
/// are never eligible.
pub fn eligible(sensor_key: &str, der_types: &HashSet<DerType>) -> bool {
    sensor_key
        .parse::<SensorKey>()
        .map(|key| sensor_eligible(key, der_types))
        .unwrap_or(false)
}

pub fn eligible_sensors(der_types: &HashSet<DerType>) -> Vec<SensorKey> {
    SensorKey::ALL
        .iter()
        .copied()
        .filter(|key| sensor_eligible(*key, der_types))
        .collect()
}
