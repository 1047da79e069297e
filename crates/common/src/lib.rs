//! Common crate
//!
//! Shared error handling, configuration and logging for Igloo.
//!
//! # Example
//! ```rust
//! use igloo_common::Error;
//! let err = Error::new("example error");
//! assert!(err.to_string().contains("example error"));
//! ```

pub mod config;
pub mod error;
pub mod logging;

pub use config::Settings;
pub use error::{Error, Result};
