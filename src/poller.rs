//! Periodic polling of the gateway and its devices, and the store of their latest records.
//!
//! Every device gets its own task so a slow or unreachable device never delays the others.

use crate::api::{self, Error};
use crate::model::{Api, DerType, Device, DeviceRecord, GatewayRecord};
use crate::telemetry;
use serde::Serialize;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub const GATEWAY: &str = "gateway";

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub device: Device,
    pub der_types: HashSet<DerType>,
    /// Record of the last successful cycle
    pub record: Option<DeviceRecord>,
    pub last_update_success: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewaySnapshot {
    pub record: Option<GatewayRecord>,
    pub last_update_success: bool,
}

/// Latest known state of every polled device and of the gateway.
#[derive(Default)]
pub struct Snapshots {
    devices: Mutex<HashMap<String, DeviceSnapshot>>,
    gateway: Mutex<GatewaySnapshot>,
}

impl Snapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, device: Device) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(
                device.serial_number.to_owned(),
                DeviceSnapshot {
                    der_types: device.der_types(),
                    device,
                    record: None,
                    last_update_success: false,
                },
            );
        } else {
            log::error!("Unable to lock device store, {} not registered", device.serial_number);
        }
    }

    /// Replace the record of device `serial_number` with the outcome of a cycle. A failed cycle
    /// keeps the previous record and only marks the device as failing.
    pub fn store_device(&self, serial_number: &str, result: Result<DeviceRecord, Error>) {
        let mut devices = match self.devices.lock() {
            Ok(devices) => devices,
            Err(_) => {
                log::trace!("Unable to lock device store, will update again");
                return;
            }
        };

        match devices.get_mut(serial_number) {
            Some(snapshot) => match result {
                Ok(record) => {
                    snapshot.record = Some(record);
                    snapshot.last_update_success = true;
                }
                Err(_) => snapshot.last_update_success = false,
            },
            None => log::warn!("Discarding record of unknown device {}", serial_number),
        }
    }

    pub fn store_gateway(&self, result: Result<GatewayRecord, Error>) {
        if let Ok(mut gateway) = self.gateway.lock() {
            match result {
                Ok(record) => {
                    gateway.record = Some(record);
                    gateway.last_update_success = true;
                }
                Err(_) => gateway.last_update_success = false,
            }
        } else {
            log::trace!("Unable to lock gateway store, will update again");
        }
    }

    /// Snapshots of all registered devices, ordered by serial number.
    pub fn devices(&self) -> Result<Vec<DeviceSnapshot>, Error> {
        let devices = self.devices.lock().or(Err(Error::InternalError))?;
        let mut snapshots: Vec<DeviceSnapshot> = devices.values().cloned().collect();
        snapshots.sort_by(|a, b| a.device.serial_number.cmp(&b.device.serial_number));

        Ok(snapshots)
    }

    pub fn gateway(&self) -> Result<GatewaySnapshot, Error> {
        self.gateway
            .lock()
            .map(|gateway| gateway.clone())
            .or(Err(Error::InternalError))
    }
}

/* a cycle is two requests at most, each bounded by the client timeout */
fn cycle_timeout(api: &Api) -> Duration {
    api.timeout * 2
}

async fn cycle<T, F>(api: &Api, target: &str, fetch: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    let limit = cycle_timeout(api);

    match tokio::time::timeout(limit, fetch).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!("polling cycle exceeded {:?}", limit))),
    }
    .map_err(|e| Error::UpdateFailed(target.to_owned(), e.to_string()))
}

/// Fetch and normalize the telemetry of device `serial_number`.
pub async fn update_device(api: &Api, serial_number: &str) -> Result<DeviceRecord, Error> {
    cycle(api, serial_number, async {
        let payload = api::device_data(api, serial_number).await?;
        let ders = api::device_ders(api, serial_number).await?;

        Ok::<_, Error>(telemetry::device::normalize(serial_number, &payload, &ders))
    })
    .await
}

/// Fetch and normalize the gateway system information.
pub async fn update_gateway(api: &Api) -> Result<GatewayRecord, Error> {
    let record = cycle(api, GATEWAY, async {
        api::system_info(api)
            .await
            .map(|payload| telemetry::gateway::normalize(&payload))
    })
    .await?;

    if record.is_empty() {
        log::warn!("Zap gateway at {} returned no system information", api.base_url);
    }

    Ok(record)
}

/// List devices, retrying every `period` until the gateway answers.
pub async fn discover(api: &Api, period: Duration) -> Vec<Device> {
    loop {
        match api::devices(api).await {
            Ok(devices) => return devices,
            Err(e) => {
                log::error!("Unable to list Zap devices, retrying in {:?}: {}", period, e);
                tokio::time::sleep(period).await;
            }
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

pub async fn poll_device(
    api: Api,
    snapshots: Arc<Snapshots>,
    serial_number: String,
    period: Duration,
) {
    let mut interval = ticker(period);

    loop {
        interval.tick().await;

        let result = update_device(&api, &serial_number).await;
        if let Err(e) = &result {
            log::warn!("{}", e);
        }
        snapshots.store_device(&serial_number, result);
    }
}

pub async fn poll_gateway(api: Api, snapshots: Arc<Snapshots>, period: Duration) {
    let mut interval = ticker(period);

    loop {
        interval.tick().await;

        let result = update_gateway(&api).await;
        if let Err(e) = &result {
            log::warn!("{}", e);
        }
        snapshots.store_gateway(result);
    }
}

/// Poll the gateway and every device it reports until the runtime shuts down.
pub async fn run(
    api: Api,
    snapshots: Arc<Snapshots>,
    device_interval: Duration,
    gateway_interval: Duration,
) {
    tokio::spawn(poll_gateway(api.clone(), snapshots.clone(), gateway_interval));

    let devices = discover(&api, device_interval).await;
    log::info!("Found {} Zap devices at {}", devices.len(), api.base_url);

    for device in devices {
        let serial_number = device.serial_number.to_owned();
        snapshots.register(device);
        tokio::spawn(poll_device(
            api.clone(),
            snapshots.clone(),
            serial_number,
            device_interval,
        ));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const DEVICE_DATA: &str = r#"{"pv": {"W": -3000, "total_generation_Wh": 1500000}}"#;

    /* answers GET requests for `routes` (path, status, body), 404 for any other path */
    async fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buffer = vec![0u8; 4096];
                let n = socket.read(&mut buffer).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buffer[..n]).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or_default();

                let (status, body) = routes
                    .iter()
                    .find(|(route, _, _)| *route == path)
                    .map(|(_, status, body)| (*status, *body))
                    .unwrap_or((404, "{}"));
                let response = format!(
                    "HTTP/1.1 {} Zap\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        address
    }

    fn local_api(address: &str) -> Api {
        api::api(address, "/api", Duration::from_secs(2)).unwrap()
    }

    fn assert_update_failed(result: Result<DeviceRecord, Error>, reason_prefix: &str) {
        match result {
            Err(Error::UpdateFailed(target, reason)) => {
                assert_eq!("ZAP12345", target);
                assert!(reason.starts_with(reason_prefix), "{}", reason);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    fn device(serial_number: &str) -> Device {
        Device {
            serial_number: serial_number.to_owned(),
            name: format!("Solaredge {}", serial_number),
            manufacturer: String::from("Sourceful Energy"),
            model: String::from("solaredge"),
            device_type: Some(String::from("modbus_tcp")),
            profile: Some(String::from("solaredge")),
            connected: Some(true),
            last_harvest: None,
            ders: serde_json::from_value(json!([{"type": "pv", "enabled": true}])).unwrap(),
        }
    }

    fn record(serial_number: &str, power: f64) -> DeviceRecord {
        DeviceRecord {
            power: Some(power),
            ..DeviceRecord::new(serial_number)
        }
    }

    #[test]
    fn registered_device_has_no_record() {
        let snapshots = Snapshots::new();
        snapshots.register(device("ZAP12345"));

        let devices = snapshots.devices().unwrap();
        assert_eq!(1, devices.len());
        assert_eq!(None, devices[0].record);
        assert!(!devices[0].last_update_success);
        assert!(devices[0].der_types.contains(&DerType::Pv));
    }

    #[test]
    fn failed_cycle_keeps_last_record() {
        let snapshots = Snapshots::new();
        snapshots.register(device("ZAP12345"));

        snapshots.store_device("ZAP12345", Ok(record("ZAP12345", 3000.0)));
        let devices = snapshots.devices().unwrap();
        assert!(devices[0].last_update_success);
        assert_eq!(Some(3000.0), devices[0].record.as_ref().and_then(|r| r.power));

        snapshots.store_device(
            "ZAP12345",
            Err(Error::UpdateFailed(
                String::from("ZAP12345"),
                String::from("timeout"),
            )),
        );
        let devices = snapshots.devices().unwrap();
        assert!(!devices[0].last_update_success);
        assert_eq!(Some(3000.0), devices[0].record.as_ref().and_then(|r| r.power));

        snapshots.store_device("ZAP12345", Ok(record("ZAP12345", 2500.0)));
        let devices = snapshots.devices().unwrap();
        assert!(devices[0].last_update_success);
        assert_eq!(Some(2500.0), devices[0].record.as_ref().and_then(|r| r.power));
    }

    #[test]
    fn unknown_device_is_ignored() {
        let snapshots = Snapshots::new();
        snapshots.store_device("UNKNOWN", Ok(record("UNKNOWN", 1.0)));
        assert!(snapshots.devices().unwrap().is_empty());
    }

    #[test]
    fn devices_ordered_by_serial_number() {
        let snapshots = Snapshots::new();
        snapshots.register(device("ZAP2"));
        snapshots.register(device("ZAP1"));

        let serials: Vec<String> = snapshots
            .devices()
            .unwrap()
            .into_iter()
            .map(|s| s.device.serial_number)
            .collect();
        assert_eq!(vec!["ZAP1", "ZAP2"], serials);
    }

    #[test]
    fn gateway_snapshot() {
        let snapshots = Snapshots::new();
        assert!(snapshots.gateway().unwrap().record.is_none());

        snapshots.store_gateway(Ok(GatewayRecord {
            uptime_seconds: Some(3600.0),
            ..Default::default()
        }));
        snapshots.store_gateway(Err(Error::UpdateFailed(
            String::from(GATEWAY),
            String::from("connection refused"),
        )));

        let gateway = snapshots.gateway().unwrap();
        assert!(!gateway.last_update_success);
        assert_eq!(Some(3600.0), gateway.record.and_then(|r| r.uptime_seconds));
    }

    #[tokio::test]
    async fn failing_ders_fail_the_cycle() {
        let address = serve(vec![
            ("/api/devices/ZAP12345/data/json", 200, DEVICE_DATA),
            ("/api/devices/ZAP12345/ders", 500, r#"{"error": "internal"}"#),
        ])
        .await;

        assert_update_failed(update_device(&local_api(&address), "ZAP12345").await, "API error");
    }

    #[tokio::test]
    async fn undecodable_ders_fail_the_cycle() {
        let address = serve(vec![
            ("/api/devices/ZAP12345/data/json", 200, DEVICE_DATA),
            ("/api/devices/ZAP12345/ders", 200, "<html>busy</html>"),
        ])
        .await;

        assert_update_failed(
            update_device(&local_api(&address), "ZAP12345").await,
            "invalid response",
        );
    }

    #[tokio::test]
    async fn missing_device_data_fails_the_cycle() {
        let address = serve(vec![(
            "/api/devices/ZAP12345/ders",
            200,
            r#"{"ders": [{"type": "pv", "enabled": true}]}"#,
        )])
        .await;

        assert_update_failed(update_device(&local_api(&address), "ZAP12345").await, "not found");
    }

    #[tokio::test]
    async fn ders_without_object_yield_no_descriptors() {
        let address = serve(vec![
            ("/api/devices/ZAP12345/data/json", 200, DEVICE_DATA),
            ("/api/devices/ZAP12345/ders", 200, "[]"),
        ])
        .await;

        let record = update_device(&local_api(&address), "ZAP12345").await.unwrap();
        assert_eq!(Some(3000.0), record.power);
        assert_eq!(Some(1500000.0), record.energy_production);
        assert_eq!(None, record.rated_power);
    }

    #[tokio::test]
    async fn ders_backfill_the_record() {
        let address = serve(vec![
            ("/api/devices/ZAP12345/data/json", 200, DEVICE_DATA),
            (
                "/api/devices/ZAP12345/ders",
                200,
                r#"{"ders": [{"type": "pv", "enabled": 1, "rated_power": 8000}, "meter",
                    {"type": "battery", "enabled": true, "capacity": 10000}]}"#,
            ),
        ])
        .await;

        let record = update_device(&local_api(&address), "ZAP12345").await.unwrap();
        assert_eq!(Some(3000.0), record.power);
        assert_eq!(Some(8000.0), record.rated_power);
        assert_eq!(Some(10000.0), record.capacity);
    }

    #[tokio::test]
    async fn discover_keeps_entries_with_odd_fields() {
        let address = serve(vec![(
            "/api/devices",
            200,
            r#"{"count": 3, "devices": [
                {"sn": "A", "last_harvest": "2026-01-07T12:00:00Z", "connected": 1},
                {"profile": "sungrow"},
                {"sn": "B", "ders": [{"type": "meter", "enabled": 1}]}
            ]}"#,
        )])
        .await;

        let devices = discover(&local_api(&address), Duration::from_secs(1)).await;
        assert_eq!(2, devices.len());
        assert_eq!("A", devices[0].serial_number);
        assert!(devices[1].der_types().contains(&DerType::Meter));
    }

    #[tokio::test]
    async fn empty_system_info_is_an_empty_record() {
        let address = serve(vec![("/api/system", 200, "{}")]).await;

        let record = update_gateway(&local_api(&address)).await.unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn unreachable_device_fails_update() {
        let api = api::api("127.0.0.1:1", "/api", Duration::from_secs(1)).unwrap();

        match update_device(&api, "ZAP12345").await {
            Err(Error::UpdateFailed(target, _)) => assert_eq!("ZAP12345", target),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
