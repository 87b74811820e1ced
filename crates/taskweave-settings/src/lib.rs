//! # taskweave-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`Settings::default()`]
//! 2. **Settings file**: `~/.taskweave/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: `TASKWEAVE_*` and `ANTHROPIC_API_KEY`
//!    overrides (highest priority)

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
