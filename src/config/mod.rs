//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PumpConfig (validated, immutable)
//!     → ListenerWrapper::from_config / observability init
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the handler chain is built once per wrapper
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::AcceptConfig;
pub use schema::BufferPoolConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::PumpConfig;
