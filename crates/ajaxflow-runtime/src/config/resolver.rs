//! Configuration resolver trait.
//!
//! # Architecture
//!
//! ```text
//! ConfigLoader.load()  →  AjaxConfig (files + env)
//!                              │
//!                              ▼
//!            ConfigResolver.resolve() adds its own overrides
//!                              │
//!                              ▼
//!                     AjaxConfig (final)
//! ```
//!
//! Frontends implement [`ConfigResolver`] to put their flags on top of
//! the loaded layers; the runtime builder accepts any resolver.

use super::{AjaxConfig, ConfigError};

/// Produces the final configuration.
pub trait ConfigResolver {
    /// Loads every layer and applies this resolver's overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a layer cannot be loaded.
    fn resolve(&self) -> Result<AjaxConfig, ConfigError>;
}

/// Resolver that returns compile-time defaults.
///
/// Useful for tests and embedders that configure everything in code.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpResolver;

impl ConfigResolver for NoOpResolver {
    fn resolve(&self) -> Result<AjaxConfig, ConfigError> {
        Ok(AjaxConfig::default())
    }
}
