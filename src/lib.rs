pub mod api;
pub mod model;
pub mod poller;
pub mod telemetry;

pub use api::Error;
