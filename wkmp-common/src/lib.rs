//! # WKMP Common Library
//!
//! Shared code for the WKMP audio streaming crates:
//! - Event types (AudioEvent) and the broadcast EventBus
//! - Runtime audio parameters with validation metadata
//! - TOML bootstrap configuration
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod params;

pub use error::{Error, Result};
