//! # onetrick-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`EngineSettings::default()`]
//! 2. **User file**: `~/.onetrick/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ONETRICK_*` overrides
//!
//! There is no global instance; the driver loads settings once and hands
//! them to the engine.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, onetrick_home, resolve_path,
    settings_path,
};
pub use types::*;
