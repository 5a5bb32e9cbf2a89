use num_derive::FromPrimitive;
use serde_json::Value;

/// Readings above this magnitude are garbage unless they are energy counters.
pub const MAGNITUDE_THRESHOLD: f64 = 1_000_000.0;

/// Counters this close to the uint32 maximum have wrapped or are corrupted.
pub const OVERFLOW_THRESHOLD: f64 = 4_000_000_000.0;

/// Cumulative energy counters, which legitimately reach millions of Wh.
pub const ENERGY_FIELDS: [&str; 5] = [
    "total_generation_Wh",
    "total_import_Wh",
    "total_export_Wh",
    "total_charge_Wh",
    "total_discharge_Wh",
];

/// Raw 16-bit Modbus codes that devices report instead of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ModbusSentinel {
    /* 0xFFFF */
    NoData = 65535,
    /* 0x8000 signed */
    SignedInvalid = -32768,
    /* 0x8000 unsigned */
    UnsignedInvalid = 32768,
    /* 0x7FFF */
    SignedMax = 32767,
    SignedMinPlusOne = -32767,
}

impl ModbusSentinel {
    pub fn matches(num: f64) -> bool {
        num.fract() == 0.0
            && (num::FromPrimitive::from_i64(num as i64) as Option<ModbusSentinel>).is_some()
    }
}

/// Plausible range of a single field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub reject_overflow: bool,
}

impl Bounds {
    pub const fn new() -> Self {
        Bounds {
            min: None,
            max: None,
            reject_overflow: false,
        }
    }

    pub const fn min(self, min: f64) -> Self {
        Bounds {
            min: Some(min),
            ..self
        }
    }

    pub const fn max(self, max: f64) -> Self {
        Bounds {
            max: Some(max),
            ..self
        }
    }

    pub const fn reject_overflow(self) -> Self {
        Bounds {
            reject_overflow: true,
            ..self
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds::new()
    }
}

/// Numeric interpretation of a raw JSON scalar: numbers, booleans and numeric strings.
fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Decide whether raw `value` of `field` is a physically plausible reading.
///
/// Returns the reading as `f64`, or `None` when it is missing, non-numeric, NaN/Inf, a Modbus
/// sentinel, unexpectedly large for a non-energy field, an overflowed counter (only with
/// `bounds.reject_overflow`) or outside `bounds`. `field` is the raw payload key, e.g. `heatsink_C`.
pub fn validate(value: Option<&Value>, field: &str, bounds: Bounds) -> Option<f64> {
    let value = value.filter(|v| !v.is_null())?;

    let num = match to_f64(value) {
        Some(num) => num,
        None => {
            log::debug!("Cannot convert {} value {} to float", field, value);
            return None;
        }
    };

    if !num.is_finite() {
        log::debug!("Invalid {} value: {} (NaN or Inf)", field, num);
        return None;
    }

    if ModbusSentinel::matches(num) {
        log::debug!("Invalid {} value: {} (Modbus sentinel)", field, num);
        return None;
    }

    if num.abs() > MAGNITUDE_THRESHOLD && !ENERGY_FIELDS.contains(&field) {
        log::debug!("Suspicious {} value: {} (unexpectedly large)", field, num);
        return None;
    }

    if bounds.reject_overflow && num.abs() > OVERFLOW_THRESHOLD {
        log::debug!("Invalid {} value: {} (overflow)", field, num);
        return None;
    }

    if let Some(min) = bounds.min.filter(|min| num < *min) {
        log::debug!("Invalid {} value: {} (below min {})", field, num, min);
        return None;
    }

    if let Some(max) = bounds.max.filter(|max| num > *max) {
        log::debug!("Invalid {} value: {} (above max {})", field, num, max);
        return None;
    }

    Some(num)
}
