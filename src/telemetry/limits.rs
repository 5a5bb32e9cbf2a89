//! Plausibility bounds of every numeric field read from the gateway.

use super::validate::Bounds;

pub const POWER: Bounds = Bounds::new();
pub const POWER_LIMIT: Bounds = Bounds::new();
pub const RATED_POWER: Bounds = Bounds::new().min(0.0);
pub const ENERGY_COUNTER: Bounds = Bounds::new().min(0.0).reject_overflow();
pub const HEATSINK_TEMPERATURE: Bounds = Bounds::new().min(-40.0).max(150.0);

pub const BATTERY_SOC_FRACTION: Bounds = Bounds::new().min(0.0).max(1.0);
pub const BATTERY_VOLTAGE: Bounds = Bounds::new().min(0.0).max(1000.0);
pub const BATTERY_CURRENT: Bounds = Bounds::new().min(-500.0).max(500.0);

pub const GRID_FREQUENCY: Bounds = Bounds::new().min(45.0).max(65.0);
pub const PHASE_VOLTAGE: Bounds = Bounds::new().min(0.0).max(500.0);
pub const PHASE_CURRENT: Bounds = Bounds::new().min(-200.0).max(200.0);
pub const PHASE_POWER: Bounds = Bounds::new();

pub const DER_RATING: Bounds = Bounds::new().min(0.0);

pub const GATEWAY_TEMPERATURE: Bounds = Bounds::new().min(-40.0).max(150.0);
/* RSSI is in dBm, anything positive is bogus */
pub const RSSI: Bounds = Bounds::new().max(0.0);
pub const MEMORY_PERCENT: Bounds = Bounds::new().min(0.0).max(100.0);
