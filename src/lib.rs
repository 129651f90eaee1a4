//! nutri_voice — voice assistant that tracks food consumption.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod agent;
pub mod cli;
pub mod comm;
pub mod config;
pub mod error;
pub mod models;
pub mod room;
pub mod session;
pub mod store;
pub mod tools;
pub mod utils;

/// Return the nutri_voice home directory.
///
/// Resolution order:
/// 1. `NUTRI_HOME` environment variable
/// 2. `$HOME/.nutri_voice`
pub fn nutri_home() -> std::path::PathBuf {
    if let Ok(p) = std::env::var("NUTRI_HOME") {
        std::path::PathBuf::from(p)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".nutri_voice")
    }
}
