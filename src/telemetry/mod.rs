//! Normalization of raw gateway telemetry into validated records.

pub mod device;
pub mod eligibility;
pub mod gateway;
pub mod limits;
pub mod validate;

pub use eligibility::eligible;
pub use validate::validate;
