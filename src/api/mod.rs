pub mod endpoint;
pub mod error;
pub mod response;

use crate::model;
pub use error::Error;
use reqwest::Response;
use response::get_device_ders::GetDeviceDers;
use serde_json::Value;

use std::collections::HashMap;
use std::time::Duration;

/// Strip scheme, surrounding whitespace and trailing slash from a user supplied host.
pub fn clean_host(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix("http://")
        .or_else(|| host.strip_prefix("https://"))
        .unwrap_or(host);

    host.trim_end_matches('/').to_owned()
}

pub fn api(host: &str, api_path: &str, timeout: Duration) -> Result<model::Api, Error> {
    /* the gateway is always on the local network */
    let client = reqwest::ClientBuilder::new()
        .no_proxy()
        .timeout(timeout)
        .build()
        .or(Err(Error::InternalError))?;

    Ok(model::Api {
        base_url: format!(
            "http://{}{}",
            clean_host(host),
            api_path.trim().trim_end_matches('/')
        ),
        timeout,
        client,
    })
}

/// Map transport failures and non-2xx responses to Error
fn map_api_err(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        return Error::Timeout(error.to_string());
    }
    if error.is_connect() {
        return Error::ConnectionError(error.to_string());
    }

    match error.status() {
        Some(http::StatusCode::NOT_FOUND) => Error::NotFound(error.to_string()),
        Some(_) => Error::ApiError(error.to_string()),
        None => Error::ConnectionError(error.to_string()),
    }
}

async fn get(api: &model::Api, endpoint: &endpoint::Endpoint) -> Result<Value, Error> {
    let url = format!("{}{}", api.base_url, endpoint);

    let response = api
        .client
        .get(url.as_str())
        .send()
        .await
        .and_then(Response::error_for_status);

    let text = match response {
        Ok(r) => r.text().await,
        Err(e) => Err(e),
    }
    .map_err(|e| {
        log::error!("Request to Zap API at {} failed: {}", url, e);
        map_api_err(e)
    })?;

    log::trace!("endpoint: {}, response_text: {}", endpoint, text);

    serde_json::from_str::<Value>(&text).map_err(|e| Error::InvalidResponse(text, e.to_string()))
}

/// List devices connected to the gateway.
pub async fn devices(api: &model::Api) -> Result<Vec<model::Device>, Error> {
    get(api, endpoint::DEVICES).await.map(response::get_devices::parse)
}

/// Raw telemetry payload of device `serial_number`, nested by DER type.
pub async fn device_data(api: &model::Api, serial_number: &str) -> Result<Value, Error> {
    get(api, &endpoint::device_data(serial_number)).await
}

/// DER descriptors of device `serial_number`. A payload which is not an object carries no
/// descriptors, malformed descriptors are skipped.
pub async fn device_ders(api: &model::Api, serial_number: &str) -> Result<Vec<model::Der>, Error> {
    let value = get(api, &endpoint::device_ders(serial_number)).await?;

    match serde_json::from_value::<GetDeviceDers>(value) {
        Ok(response) => Ok(response.ders),
        Err(_) => {
            log::warn!("No DER descriptors returned for device {}", serial_number);
            Ok(Vec::new())
        }
    }
}

pub async fn system_info(api: &model::Api) -> Result<Value, Error> {
    get(api, endpoint::SYSTEM).await
}

/// Whether the device list can be fetched.
pub async fn test_connection(api: &model::Api) -> bool {
    match devices(api).await {
        Ok(_) => true,
        Err(e) => {
            log::warn!("Connection test against {} failed: {}", api.base_url, e);
            false
        }
    }
}

/// Dump raw telemetry of every device, keyed by serial number.
///
/// Meant for inspecting payloads of makes which do not normalize as expected.
pub async fn dump_devices(api: &model::Api) -> Result<HashMap<String, Value>, Error> {
    let mut dump: HashMap<String, Value> = HashMap::new();

    for device in devices(api).await? {
        let value = device_data(api, &device.serial_number).await?;
        if value.is_null() {
            log::warn!("No data returned for device {}", device.serial_number);
        }
        dump.insert(device.serial_number, value);
    }

    Ok(dump)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clean_hosts() {
        assert_eq!("192.168.1.100", clean_host("192.168.1.100"));
        assert_eq!("192.168.1.100", clean_host("http://192.168.1.100/"));
        assert_eq!("zap.local", clean_host("  https://zap.local  "));
        assert_eq!("zap.local:8080", clean_host("zap.local:8080/"));
    }

    #[test]
    fn base_url() {
        let local = api("http://192.168.1.100/", "/api", Duration::from_secs(10)).unwrap();
        assert_eq!("http://192.168.1.100/api", local.base_url);
        assert_eq!(Duration::from_secs(10), local.timeout);

        let mdns = api("zap.local", "/api/", Duration::from_secs(10)).unwrap();
        assert_eq!("http://zap.local/api", mdns.base_url);
    }

    #[test]
    fn endpoints() {
        assert_eq!("/devices/ZAP12345/data/json", endpoint::device_data("ZAP12345"));
        assert_eq!("/devices/ZAP12345/ders", endpoint::device_ders("ZAP12345"));
    }

    #[test]
    fn update_failed_message() {
        let e = Error::UpdateFailed(
            String::from("ZAP12345"),
            Error::Timeout(String::from("10s")).to_string(),
        );
        assert_eq!("Error fetching data for ZAP12345: timeout: 10s", e.to_string());
    }
}
