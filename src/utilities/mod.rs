//! Shared utilities.
//!
//! - [`errors`] - error taxonomy
//! - [`config`] - YAML and environment configuration
//! - [`rpm_controller`] - async requests-per-minute limiter
//! - [`string_utils`] - tokenization and text helpers

pub mod config;
pub mod errors;
pub mod rpm_controller;
pub mod string_utils;
