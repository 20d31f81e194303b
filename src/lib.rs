pub mod bridge;
pub mod chunked;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod fs;
pub mod logging;
pub mod models;
pub mod probe;
pub mod transport;
pub mod utils;
pub mod validation;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, CallError};
