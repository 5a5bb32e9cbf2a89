use crate::model::Der;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// DER descriptors in `value`, which is expected to be a list. Entries which are not
/// descriptor objects are skipped.
pub fn descriptors(value: &Value) -> Vec<Der> {
    value
        .as_array()
        .map(|ders| {
            ders.iter()
                .filter_map(|der| serde_json::from_value::<Der>(der.to_owned()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn lenient_ders<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Der>, D::Error> {
    Value::deserialize(d).map(|value| descriptors(&value))
}

#[derive(Deserialize)]
pub struct GetDeviceDers {
    #[serde(default, deserialize_with = "lenient_ders")]
    pub ders: Vec<Der>,
}
