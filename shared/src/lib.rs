pub mod telemetry;
pub mod utils;

pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig};
pub use utils::generate_ulid;
