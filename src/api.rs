//! Operator-facing configuration surface.
//!
//! The HTTP layer that exposes these to a settings UI lives outside this
//! crate; these functions are the whole contract it needs. Both delegate to
//! the config coordinator.

use crate::services::coordinator::{ConfigCoordinator, ConfigError};

/// `GET configURI`: the currently configured URI, or `None` when unset.
pub fn get_config_uri(coordinator: &ConfigCoordinator) -> Option<String> {
    coordinator.uri().map(str::to_string)
}

/// `SET configURI`: validate and apply a new URI. An empty string unsets the
/// configuration. Validation and connection failures come back as
/// [`ConfigError`] for the caller to render.
pub fn set_config_uri(coordinator: &mut ConfigCoordinator, uri: &str) -> Result<(), ConfigError> {
    coordinator.set_uri(Some(uri))
}
