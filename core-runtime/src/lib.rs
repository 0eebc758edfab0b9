//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the Drive Share core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the auth, provider and
//! service crates depend on. It establishes the configuration, logging
//! conventions and event broadcasting used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AuthSettings, CoreConfig, CoreConfigBuilder, DriveSettings};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus, UploadEvent};
