pub mod config;
pub mod countries;
pub mod error;
pub mod query;
pub mod stats;
pub mod types;

pub use config::{Config, ConfigError};
pub use error::ScamwatchError;
pub use query::*;
pub use stats::*;
pub use types::*;
