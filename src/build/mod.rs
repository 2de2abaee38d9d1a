//! Build configuration.
//!
//! This module provides:
//! - [`context`] - Immutable build configuration and derived working paths

pub mod context;
