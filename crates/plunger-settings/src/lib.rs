//! # plunger-settings
//!
//! Configuration for the Plunger relay, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`PlungerSettings::default()`]
//! 2. **User file**: `~/.plunger/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PLUNGER_*` overrides (highest priority)
//!
//! Settings are read once at startup and handed to the relay by value; the
//! relay never re-reads them at runtime.
//!
//! # Usage
//!
//! ```no_run
//! use plunger_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("upstream: {}", settings.upstream.url());
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
