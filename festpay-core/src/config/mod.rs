//! Runtime configuration shared between the terminal components.
//!
//! Values live in [`ConfigStore`]s so the terminal binary can swap them on
//! reload while processors keep running. Loading and validating the config
//! file is done by the terminal crate.

mod config_store;
mod terminal;

pub use config_store::{ConfigStore, ConfigWatcher};
pub use terminal::{
    CachedTerminalConfig, ConfigUnavailable, TerminalConfig, TerminalConfigProvider,
};
