//! Common utilities for devreset
//!
//! This crate provides the pieces shared by the reset tool and its tests:
//! error handling, logging setup, and USB vendor/product id handling.

pub mod error;
pub mod logging;
pub mod usb_types;

pub use error::{Error, Result};
pub use logging::setup_logging;
pub use usb_types::{MatchFilter, parse_usb_id};
