pub mod get_device_ders;
pub mod get_devices;
