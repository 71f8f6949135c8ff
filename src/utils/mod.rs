//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `envsub` application.
//!
//! It holds the crate's error types and the logging bootstrap so every other
//! module reports failures and diagnostics the same way.

pub mod error;
pub mod logging;
