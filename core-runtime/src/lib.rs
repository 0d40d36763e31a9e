//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the library core:
//! - Logging and tracing infrastructure
//! - Configuration management
//!
//! ## Overview
//!
//! Every other crate reads its tunables from [`config::CoreConfig`] and logs
//! through `tracing`; this crate owns both so hosts configure them once.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
