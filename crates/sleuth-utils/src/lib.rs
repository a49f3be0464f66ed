//! Shared utilities for sleuth
//!
//! This crate provides common functionality used across the sleuth workspace,
//! currently limited to logging setup.

pub mod logging;

pub use logging::init_tracing;
