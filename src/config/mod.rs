//! Configuration subsystem.
//!
//! Configuration is loaded once at startup (file + environment overrides),
//! validated, and never mutated afterwards. There is no hot reload: the
//! upload and rate-limit policies are immutable for the process lifetime.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load_config, ConfigError};
pub use schema::ServiceConfig;
pub use validation::{validate_config, ValidationError};
