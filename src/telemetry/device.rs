//! Device telemetry normalization.
//!
//! The gateway reports device data nested by DER section: `{"pv": {..}, "battery": {..},
//! "meter": {..}}`. Each section is handled by its own function which fills the fields it owns
//! and returns its contribution to the aggregate `power`.

use super::limits;
use super::validate::{validate, Bounds};
use crate::model::{Der, DerType, DeviceRecord};
use serde_json::{Map, Value};

pub type Section = Map<String, Value>;

/// Section `name` of `payload`; only JSON objects count as present.
pub fn section<'a>(payload: &'a Value, name: &str) -> Option<&'a Section> {
    payload.get(name).and_then(Value::as_object)
}

fn number(section: &Section, key: &str, bounds: Bounds) -> Option<f64> {
    validate(section.get(key), key, bounds)
}

/* `make` is copied as-is */
fn make(section: &Section) -> Option<String> {
    match section.get("make")? {
        Value::Null => None,
        Value::String(s) => Some(s.to_owned()),
        other => Some(other.to_string()),
    }
}

fn add_power(total: Option<f64>, contribution: Option<f64>) -> Option<f64> {
    match (total, contribution) {
        (Some(total), Some(contribution)) => Some(total + contribution),
        (total, contribution) => total.or(contribution),
    }
}

/// PV inverter section. Returns the PV power, positive when producing.
pub fn apply_pv(pv: &Section, record: &mut DeviceRecord) -> Option<f64> {
    /* gateway reports production as negative; `0.0 - w` keeps 0 W from becoming -0 W */
    let power = number(pv, "W", limits::POWER).map(|w| 0.0 - w);

    record.energy_production = number(pv, "total_generation_Wh", limits::ENERGY_COUNTER);

    /* PV heatsink is the device temperature, battery heatsink only fills in */
    if let Some(temperature) = number(pv, "heatsink_C", limits::HEATSINK_TEMPERATURE) {
        record.temperature = Some(temperature);
    }

    if let Some(rated_power) = number(pv, "rated_power_W", limits::RATED_POWER) {
        record.rated_power = Some(rated_power);
    }

    record.pv_upper_limit = number(pv, "upper_limit_W", limits::POWER_LIMIT);
    record.pv_lower_limit = number(pv, "lower_limit_W", limits::POWER_LIMIT);
    record.pv_make = make(pv);

    power
}

/// Battery section. Returns the battery power, positive when discharging.
pub fn apply_battery(battery: &Section, record: &mut DeviceRecord) -> Option<f64> {
    let power = number(battery, "W", limits::POWER);
    record.battery_power = power;

    record.battery_soc =
        number(battery, "SoC_nom_fract", limits::BATTERY_SOC_FRACTION).map(|f| f * 100.0);
    record.battery_voltage = number(battery, "V", limits::BATTERY_VOLTAGE);
    record.battery_current = number(battery, "A", limits::BATTERY_CURRENT);
    record.battery_charge_total = number(battery, "total_charge_Wh", limits::ENERGY_COUNTER);
    record.battery_discharge_total =
        number(battery, "total_discharge_Wh", limits::ENERGY_COUNTER);

    record.battery_temperature = number(battery, "heatsink_C", limits::HEATSINK_TEMPERATURE);
    if record.temperature.is_none() {
        record.temperature = record.battery_temperature;
    }

    record.battery_upper_limit = number(battery, "upper_limit_W", limits::POWER_LIMIT);
    record.battery_lower_limit = number(battery, "lower_limit_W", limits::POWER_LIMIT);
    record.battery_make = make(battery);

    power
}

fn phase(meter: &Section, phase: &str) -> (Option<f64>, Option<f64>, Option<f64>) {
    (
        number(meter, &format!("{}_V", phase), limits::PHASE_VOLTAGE),
        number(meter, &format!("{}_A", phase), limits::PHASE_CURRENT),
        number(meter, &format!("{}_W", phase), limits::PHASE_POWER),
    )
}

/// Standalone grid meter section. Returns the grid power, positive when importing.
pub fn apply_meter(meter: &Section, record: &mut DeviceRecord) -> Option<f64> {
    let power = number(meter, "W", limits::POWER);

    record.energy_import = number(meter, "total_import_Wh", limits::ENERGY_COUNTER);
    record.energy_export = number(meter, "total_export_Wh", limits::ENERGY_COUNTER);
    record.grid_frequency = number(meter, "Hz", limits::GRID_FREQUENCY);

    (record.l1_voltage, record.l1_current, record.l1_power) = phase(meter, "L1");
    (record.l2_voltage, record.l2_current, record.l2_power) = phase(meter, "L2");
    (record.l3_voltage, record.l3_current, record.l3_power) = phase(meter, "L3");

    record.meter_make = make(meter);

    power
}

/// Backfill `rated_power` from the first enabled DER and `capacity` from battery DERs.
pub fn apply_ders(ders: &[Der], record: &mut DeviceRecord) {
    for der in ders {
        if der.enabled == Some(true) && record.rated_power.is_none() {
            if let Some(rated_power) = der.rated_power.as_ref() {
                record.rated_power = validate(Some(rated_power), "rated_power", limits::DER_RATING);
            }
        }

        if der.der_type == DerType::Battery {
            if let Some(capacity) = validate(der.capacity.as_ref(), "capacity", limits::DER_RATING)
            {
                record.capacity = Some(capacity);
            }
        }
    }
}

/// Build the record of device `serial_number` from its raw `/data/json` payload and DER list.
///
/// Invalid fields are left out of the record, they never fail the whole device. The meter
/// section is ignored when a PV section is present: a PV inverter's embedded meter duplicates
/// what the inverter reports itself.
pub fn normalize(serial_number: &str, payload: &Value, ders: &[Der]) -> DeviceRecord {
    let mut record = DeviceRecord::new(serial_number);
    let mut power = None;

    let pv = section(payload, "pv");
    if let Some(pv) = pv {
        power = add_power(power, apply_pv(pv, &mut record));
    }

    if let Some(battery) = section(payload, "battery") {
        power = add_power(power, apply_battery(battery, &mut record));
    }

    if let (None, Some(meter)) = (pv, section(payload, "meter")) {
        power = add_power(power, apply_meter(meter, &mut record));
    }

    record.power = power;
    apply_ders(ders, &mut record);

    log::debug!("Parsed data for Zap device {}: {:?}", serial_number, record);

    record
}
