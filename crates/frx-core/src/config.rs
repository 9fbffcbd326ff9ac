#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! Defaults suit interactive use. Hosts can override them programmatically
//! with the `with_*` builders or from the environment:
//!
//! | Variable                 | Field               |
//! |--------------------------|---------------------|
//! | `FRX_WARN_NON_REACTIVE`  | `warn_non_reactive` |
//! | `FRX_MAX_TRIGGER_DEPTH`  | `max_trigger_depth` |
//! | `FRX_SWEEP_INTERVAL`     | `sweep_interval`    |
//!
//! Unparseable values are ignored and the default is kept.

use std::env;

use crate::error::{ReactivityError, Result};

/// Nested trigger cascades deeper than this are cut off.
pub const DEFAULT_MAX_TRIGGER_DEPTH: usize = 100;

/// Registrations between automatic sweeps of dead weak entries.
pub const DEFAULT_SWEEP_INTERVAL: usize = 256;

/// Configuration for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Emit `value cannot be made reactive: ..` when observing a primitive.
    pub warn_non_reactive: bool,
    /// Maximum depth of synchronously nested trigger passes.
    pub max_trigger_depth: usize,
    /// Wrapper/exemption registrations between sweeps of dead entries.
    pub sweep_interval: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            warn_non_reactive: true,
            max_trigger_depth: DEFAULT_MAX_TRIGGER_DEPTH,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `FRX_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `FRX_*` name.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("FRX_WARN_NON_REACTIVE") {
            let val = val.trim();
            if val == "1" || val.eq_ignore_ascii_case("true") {
                config.warn_non_reactive = true;
            } else if val == "0" || val.eq_ignore_ascii_case("false") {
                config.warn_non_reactive = false;
            }
        }
        if let Some(val) = lookup("FRX_MAX_TRIGGER_DEPTH")
            && let Ok(n) = val.trim().parse()
        {
            config.max_trigger_depth = n;
        }
        if let Some(val) = lookup("FRX_SWEEP_INTERVAL")
            && let Ok(n) = val.trim().parse()
        {
            config.sweep_interval = n;
        }

        config
    }

    /// Toggle the non-reactive value warning.
    #[must_use]
    pub fn with_warn_non_reactive(mut self, enabled: bool) -> Self {
        self.warn_non_reactive = enabled;
        self
    }

    /// Set the trigger cascade depth limit.
    #[must_use]
    pub fn with_max_trigger_depth(mut self, depth: usize) -> Self {
        self.max_trigger_depth = depth;
        self
    }

    /// Set the sweep interval.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: usize) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_trigger_depth == 0 {
            return Err(ReactivityError::invalid_config(
                "max_trigger_depth must be at least 1",
            ));
        }
        if self.sweep_interval == 0 {
            return Err(ReactivityError::invalid_config(
                "sweep_interval must be at least 1",
            ));
        }
        Ok(())
    }
}
