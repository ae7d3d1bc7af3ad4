//! # mindflow-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`Settings::default()`])
//! 2. **User file** `~/.mindflow/settings.json`, deep-merged over defaults
//! 3. **Environment variables**, highest priority
//!
//! API keys never live in the file; each backend names the environment
//! variable that holds its key.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
