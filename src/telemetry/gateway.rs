use super::limits;
use super::validate::validate;
use crate::model::GatewayRecord;
use serde_json::{Map, Value};

fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(String::from)
}

/// Build the gateway record from the raw `/system` payload.
///
/// Missing keys and subsections of an unexpected shape are skipped; an empty or `null` payload
/// yields an empty record.
pub fn normalize(payload: &Value) -> GatewayRecord {
    let mut record = GatewayRecord {
        uptime_seconds: payload.get("uptime_seconds").and_then(Value::as_f64),
        gateway_temperature: validate(
            payload.get("temperature_celsius"),
            "temperature_celsius",
            limits::GATEWAY_TEMPERATURE,
        ),
        ..Default::default()
    };

    if let Some(memory) = payload.get("memory_kb").and_then(Value::as_object) {
        record.memory_percent = validate(
            memory.get("percent_used"),
            "percent_used",
            limits::MEMORY_PERCENT,
        );
        record.memory_free = memory.get("free").and_then(Value::as_f64);
    }

    if let Some(zap) = payload.get("zap").and_then(Value::as_object) {
        record.firmware_version = text(zap, "firmwareVersion");
        record.sdk_version = text(zap, "sdkVersion");
        record.device_id = text(zap, "deviceId");

        if let Some(network) = zap.get("network").and_then(Value::as_object) {
            record.wifi_ssid = text(network, "ssid");
            record.wifi_status = text(network, "wifiStatus");
            record.local_ip = text(network, "localIP");
            record.signal_strength = validate(network.get("rssi"), "rssi", limits::RSSI);
        }
    }

    log::debug!("Parsed gateway system info: {:?}", record);

    record
}
