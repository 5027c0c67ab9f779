//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the player core:
//! - Logging and tracing bootstrap
//! - Configuration and capability checks
//! - Typed event bus
//!
//! ## Overview
//!
//! Every other core crate depends on this one. It fixes the logging
//! conventions, the shape of the injected host bridges, and the events the
//! services publish to the UI.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
