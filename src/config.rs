//! Configuration System
//!
//! Lowering switches are carried in a [`LoweringOptions`] value handed to the
//! translator constructor; there is no process-wide mutable state. Options can
//! be loaded hierarchically from:
//! - stratalog.toml (default configuration)
//! - stratalog.local.toml (git-ignored local overrides)
//! - Environment variables (STRATALOG_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # stratalog.toml
//! profile = true
//! debug_report = false
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! STRATALOG_PROFILE=true
//! STRATALOG_DEBUG_REPORT=true
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Switches consumed by the lowering pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringOptions {
    /// Emit log-timer and log-size statements into the produced program
    pub profile: bool,

    /// Record the produced program in the debug report
    pub debug_report: bool,
}

impl LoweringOptions {
    /// Load options from default locations
    ///
    /// Merges in order:
    /// 1. stratalog.toml (base configuration)
    /// 2. stratalog.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (STRATALOG_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("stratalog.toml"))
            .merge(Toml::file("stratalog.local.toml"))
            .merge(Env::prefixed("STRATALOG_"))
            .extract()
    }

    /// Load options from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new().merge(Toml::file(path)).merge(Env::prefixed("STRATALOG_")).extract()
    }

    /// Enable profiling statements
    pub fn with_profile(mut self) -> Self {
        self.profile = true;
        self
    }

    /// Enable the debug report
    pub fn with_debug_report(mut self) -> Self {
        self.debug_report = true;
        self
    }
}
