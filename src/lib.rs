pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod resilience;
pub mod storage;
pub mod types;

pub use config::FleetConfig;
pub use engine::FleetCoordinator;
pub use error::{FleetError, FleetResult};
pub use types::*;
