use prometheus::{Encoder, GaugeVec, TextEncoder};
use zap_rs::poller::{DeviceSnapshot, GatewaySnapshot, Snapshots};
use zap_rs::telemetry::eligibility::eligible_sensors;

lazy_static! {
    static ref DEVICE_SENSOR_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_device_sensor", "validated sensor reading of a Zap device"),
        &["serial_number", "sensor"],
    )
    .unwrap();
    static ref DEVICE_UP_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_device_up", "whether the last polling cycle of the device succeeded"),
        &["serial_number"],
    )
    .unwrap();
    static ref DEVICE_RATED_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_device_rated_power_watts", "rated power of the device (in W)"),
        &["serial_number"],
    )
    .unwrap();
    static ref DEVICE_CAPACITY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_device_capacity_watt_hours", "battery capacity of the device (in Wh)"),
        &["serial_number"],
    )
    .unwrap();
    static ref DEVICE_INFO_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_device_info", "device descriptor, always 1"),
        &["serial_number", "profile", "pv_make", "battery_make", "meter_make"],
    )
    .unwrap();
    static ref GATEWAY_UP_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_gateway_up", "whether the last polling cycle of the gateway succeeded"),
        &[],
    )
    .unwrap();
    static ref GATEWAY_UPTIME_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_gateway_uptime_seconds", "gateway uptime"),
        &[],
    )
    .unwrap();
    static ref GATEWAY_TEMPERATURE_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_gateway_temperature_celsius", "gateway reported temperature"),
        &[],
    )
    .unwrap();
    static ref GATEWAY_MEMORY_USED_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_gateway_memory_used_percent", "gateway memory usage"),
        &[],
    )
    .unwrap();
    static ref GATEWAY_MEMORY_FREE_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_gateway_memory_free_kilobytes", "gateway free memory"),
        &[],
    )
    .unwrap();
    static ref GATEWAY_SIGNAL_STRENGTH_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_gateway_signal_strength_dbm", "WiFi signal strength (RSSI)"),
        &[],
    )
    .unwrap();
    static ref GATEWAY_INFO_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("zap_gateway_info", "gateway firmware and network, always 1"),
        &["firmware_version", "wifi_ssid", "wifi_status"],
    )
    .unwrap();
}

fn up(success: bool) -> f64 {
    if success {
        1.0
    } else {
        0.0
    }
}

fn set(gauge: &GaugeVec, labels: &[&str], value: Option<f64>) {
    if let Some(value) = value {
        gauge.with_label_values(labels).set(value);
    }
}

/// Feed the last record of `snapshot` to Prometheus metrics. Only sensors eligible for the
/// device's DER types are exposed, and only while its last cycle succeeded.
fn process_device(snapshot: &DeviceSnapshot) {
    let serial_number = snapshot.device.serial_number.as_str();
    DEVICE_UP_GAUGE
        .with_label_values(&[serial_number])
        .set(up(snapshot.last_update_success));

    let record = match (&snapshot.record, snapshot.last_update_success) {
        (Some(record), true) => record,
        _ => return,
    };

    for key in eligible_sensors(&snapshot.der_types) {
        set(
            &DEVICE_SENSOR_GAUGE,
            &[serial_number, key.as_str()],
            record.sensor(key),
        );
    }

    set(&DEVICE_RATED_POWER_GAUGE, &[serial_number], record.rated_power);
    set(&DEVICE_CAPACITY_GAUGE, &[serial_number], record.capacity);

    DEVICE_INFO_GAUGE
        .with_label_values(&[
            serial_number,
            snapshot.device.profile.as_deref().unwrap_or_default(),
            record.pv_make.as_deref().unwrap_or_default(),
            record.battery_make.as_deref().unwrap_or_default(),
            record.meter_make.as_deref().unwrap_or_default(),
        ])
        .set(1.0);
}

fn process_gateway(snapshot: &GatewaySnapshot) {
    GATEWAY_UP_GAUGE
        .with_label_values(&[])
        .set(up(snapshot.last_update_success));

    let record = match (&snapshot.record, snapshot.last_update_success) {
        (Some(record), true) => record,
        _ => return,
    };

    set(&GATEWAY_UPTIME_GAUGE, &[], record.uptime_seconds);
    set(&GATEWAY_TEMPERATURE_GAUGE, &[], record.gateway_temperature);
    set(&GATEWAY_MEMORY_USED_GAUGE, &[], record.memory_percent);
    set(&GATEWAY_MEMORY_FREE_GAUGE, &[], record.memory_free);
    set(&GATEWAY_SIGNAL_STRENGTH_GAUGE, &[], record.signal_strength);

    GATEWAY_INFO_GAUGE
        .with_label_values(&[
            record.firmware_version.as_deref().unwrap_or_default(),
            record.wifi_ssid.as_deref().unwrap_or_default(),
            record.wifi_status.as_deref().unwrap_or_default(),
        ])
        .set(1.0);
}

/// Refill Prometheus exporter registry from `snapshots`. Samples of fields which are no longer
/// available disappear.
pub fn collect(snapshots: &Snapshots) -> Result<(), zap_rs::Error> {
    let devices = snapshots.devices()?;
    let gateway = snapshots.gateway()?;

    for gauge in [
        &*DEVICE_SENSOR_GAUGE,
        &*DEVICE_UP_GAUGE,
        &*DEVICE_RATED_POWER_GAUGE,
        &*DEVICE_CAPACITY_GAUGE,
        &*DEVICE_INFO_GAUGE,
        &*GATEWAY_UP_GAUGE,
        &*GATEWAY_UPTIME_GAUGE,
        &*GATEWAY_TEMPERATURE_GAUGE,
        &*GATEWAY_MEMORY_USED_GAUGE,
        &*GATEWAY_MEMORY_FREE_GAUGE,
        &*GATEWAY_SIGNAL_STRENGTH_GAUGE,
        &*GATEWAY_INFO_GAUGE,
    ]
    .iter()
    {
        gauge.reset();
    }

    devices.iter().for_each(process_device);
    process_gateway(&gateway);

    Ok(())
}

/// Read metrics from Prometheus exporter registry.
pub fn read() -> Result<String, zap_rs::Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .or(Err(zap_rs::Error::FormatError))?;
    String::from_utf8(buffer).or(Err(zap_rs::Error::FormatError))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use zap_rs::model::{Device, DeviceRecord, GatewayRecord};

    fn snapshots() -> Snapshots {
        let snapshots = Snapshots::new();
        snapshots.register(Device {
            serial_number: String::from("P1001"),
            name: String::from("P1 Uart P1001"),
            manufacturer: String::from("Sourceful Energy"),
            model: String::from("p1_uart"),
            device_type: Some(String::from("p1_uart")),
            profile: None,
            connected: Some(true),
            last_harvest: None,
            ders: serde_json::from_value(json!([{"type": "meter"}])).unwrap(),
        });
        snapshots.store_device(
            "P1001",
            Ok(DeviceRecord {
                power: Some(1500.0),
                grid_frequency: Some(50.02),
                battery_soc: Some(80.0),
                meter_make: Some(String::from("Kamstrup")),
                ..DeviceRecord::new("P1001")
            }),
        );
        snapshots.store_gateway(Ok(GatewayRecord {
            uptime_seconds: Some(86400.0),
            firmware_version: Some(String::from("1.2.3")),
            ..Default::default()
        }));
        snapshots
    }

    /* single test, the registry is process global */
    #[test]
    fn exported_metrics() {
        collect(&snapshots()).unwrap();
        let output = read().unwrap();

        assert!(output.contains(r#"zap_device_up{serial_number="P1001"} 1"#));
        assert!(output.contains(r#"zap_device_sensor{sensor="power",serial_number="P1001"} 1500"#));
        assert!(output
            .contains(r#"zap_device_sensor{sensor="grid_frequency",serial_number="P1001"} 50.02"#));
        /* present but not eligible for a meter */
        assert!(!output.contains(r#"sensor="battery_soc""#));
        assert!(output.contains(r#"meter_make="Kamstrup""#));
        assert!(output.contains("zap_gateway_uptime_seconds 86400"));
        assert!(output.contains(r#"firmware_version="1.2.3""#));
        assert!(!output.contains("\nzap_gateway_temperature_celsius "));

        let failing = Snapshots::new();
        failing.store_gateway(Err(zap_rs::Error::UpdateFailed(
            String::from("gateway"),
            String::from("timeout"),
        )));
        collect(&failing).unwrap();
        let output = read().unwrap();

        assert!(output.contains("zap_gateway_up 0"));
        assert!(!output.contains("zap_device_up{"));
        assert!(!output.contains("zap_gateway_uptime_seconds 86400"));
    }
}
