//! Storage infrastructure: configuration and the tracked-process ledger.
//!
//! This module provides a thin adapter between the application and the
//! file system.
//!
//! - `config` reads the TOML configuration file from the platform-appropriate
//!   directory and supplies defaults on first run.
//! - `tracker_file` persists the JSON list of embedded guest processes so a
//!   crashed host can clean up after itself on the next start.

pub mod config;
pub mod tracker_file;
