use super::get_device_ders::descriptors;
use crate::model::Device;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_MANUFACTURER: &str = "Sourceful Energy";
const DEFAULT_MODEL: &str = "Zap Smart Meter";

/* Current firmware wraps the list, older firmware returns it bare */
#[derive(Deserialize)]
#[serde(untagged)]
pub enum GetDevices {
    Wrapped { devices: Vec<Value> },
    Legacy(Vec<Value>),
}

fn text<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn title_case(s: &str) -> String {
    s.replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// One entry of the device list. Fields of an unexpected type are left out, only a missing
/// serial number drops the entry.
fn device(entry: &Value) -> Option<Device> {
    let serial_number = text(entry, "sn")
        .or_else(|| text(entry, "serial_number"))?
        .to_owned();
    let profile = text(entry, "profile");
    let device_type = text(entry, "type");
    let kind = profile.or(device_type);

    Some(Device {
        name: format!("{} {}", title_case(kind.unwrap_or("Device")), serial_number),
        model: kind.unwrap_or(DEFAULT_MODEL).to_owned(),
        manufacturer: text(entry, "manufacturer")
            .unwrap_or(DEFAULT_MANUFACTURER)
            .to_owned(),
        serial_number,
        device_type: device_type.map(String::from),
        profile: profile.map(String::from),
        connected: entry.get("connected").and_then(Value::as_bool),
        last_harvest: entry.get("last_harvest").filter(|v| !v.is_null()).cloned(),
        ders: entry.get("ders").map(descriptors).unwrap_or_default(),
    })
}

/// Devices listed in a `/devices` response. Entries without a serial number are skipped, a
/// response of any other shape yields no devices.
pub fn parse(value: Value) -> Vec<Device> {
    let entries = match serde_json::from_value::<GetDevices>(value) {
        Ok(GetDevices::Wrapped { devices }) | Ok(GetDevices::Legacy(devices)) => devices,
        Err(e) => {
            log::warn!("Unexpected response format from /devices: {}", e);
            return Vec::new();
        }
    };

    entries.iter().filter_map(device).collect()
}
