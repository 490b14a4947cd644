//! Pitch Common - Shared types, utilities, and configuration for the Pitchmate services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    AgentConfig, AuthConfig, Config, NetworkConfig, ObservabilityConfig, SecretsConfig,
    StorageConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
