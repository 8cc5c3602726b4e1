pub mod api;
pub mod config;
pub mod gateway;
pub mod record;
pub mod sheets;
pub mod telemetry;

pub use gateway::{ActivityGateway, GatewayError, Login};
pub use record::{ActivityFields, ActivityRecord, Employee};
