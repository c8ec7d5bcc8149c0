//! Dispatcher configuration.

use crate::core::error::ConfigError;
use crate::execution::mode::CallbackMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options controlling how the dispatcher runs callbacks.
///
/// Can be built in code or read from TOML:
///
/// ```toml
/// callback_mode = "pure"
/// max_threads = 4
/// abort_as_error = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
    /// Whether callbacks may run in parallel.
    pub callback_mode: CallbackMode,
    /// Worker threads for pure callbacks (0 = use all available).
    pub max_threads: usize,
    /// Report a callback abort as a `CallbackAbort` error instead of `Ok(false)`.
    pub abort_as_error: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            callback_mode: CallbackMode::Stateful,
            max_threads: 0,
            abort_as_error: false,
        }
    }
}

impl DispatchOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback_mode(mut self, mode: CallbackMode) -> Self {
        self.callback_mode = mode;
        self
    }

    /// Set maximum threads.
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    pub fn with_abort_as_error(mut self, abort_as_error: bool) -> Self {
        self.abort_as_error = abort_as_error;
        self
    }

    /// Parse options from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
