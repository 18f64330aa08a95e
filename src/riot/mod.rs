mod gateway;
mod metrics;
mod region;
mod types;

pub use gateway::{CooldownPolicy, GatewayConfig, RiotGateway};
pub use metrics::RequestMetrics;
pub use region::{Platform, Region};
pub use types::*;
