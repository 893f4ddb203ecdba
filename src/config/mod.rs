//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AjpConfig (validated, immutable)
//!     → shared via Arc to the server and every request cycle
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; no global state
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AjpConfig, ListenerConfig, ObservabilityConfig, RequestConfig, SessionConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
