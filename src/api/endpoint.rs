pub type Endpoint = str;

pub const DEVICES: &Endpoint = "/devices";
pub const SYSTEM: &Endpoint = "/system";

pub fn device_data(serial_number: &str) -> String {
    format!("{}/{}/data/json", DEVICES, serial_number)
}

pub fn device_ders(serial_number: &str) -> String {
    format!("{}/{}/ders", DEVICES, serial_number)
}
