pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::email::{EmailSettings, LogNotifier, SmtpNotifier};
pub use adapters::storage::LocalStorage;
pub use config::MonitorConfig;
pub use core::{engine::MonitorEngine, pipeline::PortalPipeline};
pub use utils::error::{MonitorError, Result};
