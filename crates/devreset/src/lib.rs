//! devreset
//!
//! Forces USB devices matching a vendor/product pair to re-enumerate, as if
//! they had been unplugged and plugged back in.
//!
//! The binary is a thin wrapper: it validates the ids, loads configuration,
//! and hands a [`usb::RusbHost`] to a [`driver::ResetDriver`].

pub mod config;
pub mod driver;
pub mod listing;
pub mod test_utils;
pub mod usb;

pub use config::ResetConfig;
pub use driver::{DeviceOutcome, ResetDriver, ResetSummary, RetryPolicy, Stage};
