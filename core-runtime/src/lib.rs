//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the library and the sync engine:
//! - Logging and tracing bootstrap
//! - Configuration (`CoreConfig`, `SyncSettings`)
//! - Event bus carrying sync and library events
//!
//! ## Overview
//!
//! Nothing in here knows about SQL or merging. The crate establishes the
//! conventions (events, config validation, log format) the other crates
//! build on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
