pub mod config;
pub mod errors;
pub mod types;

pub use config::{AppConfig, EngineConfig};
pub use errors::AutomationError;
