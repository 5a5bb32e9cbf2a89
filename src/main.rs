#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use config::Config;
use rocket::http::ContentType;
use rocket::State;
use serde::Serialize;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use zap_rs::api;
use zap_rs::model::Api;
use zap_rs::poller::{self, DeviceSnapshot, GatewaySnapshot, Snapshots};

mod metrics;

const API_PATH: &str = "/api";
const POLLING_INTERVAL: i64 = 10;
const GATEWAY_INTERVAL: i64 = 30;
const TIMEOUT: i64 = 10;

#[derive(Clone, serde::Deserialize)]
pub struct ZapConfig {
    host: String,
    api_path: String,
    polling_interval: u64,
    gateway_interval: u64,
    timeout: u64,
}

/// Structure containing state for API handlers.
pub struct StateData {
    api: Api,
    snapshots: Arc<Snapshots>,
}

#[derive(Serialize)]
struct Records {
    devices: Vec<DeviceSnapshot>,
    gateway: GatewaySnapshot,
}

pub fn read_settings() -> Result<ZapConfig, config::ConfigError> {
    let mut settings = Config::default();
    settings
        .set_default("api_path", API_PATH)?
        .set_default("polling_interval", POLLING_INTERVAL)?
        .set_default("gateway_interval", GATEWAY_INTERVAL)?
        .set_default("timeout", TIMEOUT)?
        .merge(config::Environment::with_prefix("ZAP"))?;

    let mut zap: ZapConfig = settings.try_into()?;
    /* a zero period would make the pollers spin */
    zap.polling_interval = zap.polling_interval.max(1);
    zap.gateway_interval = zap.gateway_interval.max(1);

    Ok(zap)
}

#[get("/metrics")]
fn metrics_route(state: &State<StateData>) -> Result<String, api::Error> {
    metrics::collect(&state.snapshots)?;
    metrics::read()
}

#[get("/records")]
fn records_route(state: &State<StateData>) -> Result<(ContentType, String), api::Error> {
    let records = Records {
        devices: state.snapshots.devices()?,
        gateway: state.snapshots.gateway()?,
    };

    serde_json::to_string_pretty(&records)
        .or(Err(api::Error::FormatError))
        .map(|json| (ContentType::JSON, json))
}

#[get("/dump-devices")]
async fn dump_devices_route(
    state: &State<StateData>,
) -> Result<(ContentType, String), api::Error> {
    let dump = api::dump_devices(&state.api).await?;

    serde_json::to_string_pretty(&dump)
        .or(Err(api::Error::FormatError))
        .map(|json| (ContentType::JSON, json))
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let settings = read_settings()?;
    let api = api::api(
        &settings.host,
        &settings.api_path,
        Duration::from_secs(settings.timeout),
    )?;

    if !api::test_connection(&api).await {
        log::warn!("Zap gateway at {} is not reachable yet", api.base_url);
    }

    let snapshots = Arc::new(Snapshots::new());
    tokio::spawn(poller::run(
        api.clone(),
        snapshots.clone(),
        Duration::from_secs(settings.polling_interval),
        Duration::from_secs(settings.gateway_interval),
    ));

    let state = StateData { api, snapshots };

    rocket::build()
        .manage(state)
        .mount("/", routes![metrics_route, records_route, dump_devices_route])
        .launch()
        .await?;

    Ok(())
}
