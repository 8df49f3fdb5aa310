//! USB subsystem
//!
//! The reset driver talks to hardware only through the traits in this module:
//! - [`UsbHost`] finds the devices selected by a [`MatchFilter`]
//! - [`ResettableDevice`] resolves a device and opens a session on it
//! - [`DeviceSession`] configures and re-enumerates an opened device
//!
//! [`RusbHost`] is the libusb-backed implementation used by the binary.

pub mod device;
pub mod error;
pub mod rusb_host;

pub use device::DeviceIdentity;
pub use error::DeviceError;
pub use rusb_host::{RusbDevice, RusbHost, RusbSession};

use common::MatchFilter;

/// Source of attached USB devices
pub trait UsbHost {
    type Device: ResettableDevice;

    /// Snapshot of the currently attached devices selected by `filter`
    ///
    /// An error here means the USB subsystem itself is unusable.
    fn matching_devices(&self, filter: &MatchFilter) -> common::Result<Vec<Self::Device>>;

    /// Snapshot of every attached device
    fn attached_devices(&self) -> common::Result<Vec<Self::Device>>;
}

/// A discovered device that can be opened for a reset
pub trait ResettableDevice {
    type Session: DeviceSession;

    /// Resolve the device and read its identity
    fn identity(&self) -> Result<DeviceIdentity, DeviceError>;

    /// Open the device exclusively
    ///
    /// Returns [`DeviceError::ExclusiveAccess`] while another consumer holds it.
    fn open(&self) -> Result<Self::Session, DeviceError>;
}

/// An open session on a single device
pub trait DeviceSession {
    /// Number of configurations the device offers
    fn num_configurations(&self) -> Result<u8, DeviceError>;

    /// `bConfigurationValue` of the configuration at `index`
    fn configuration_value(&self, index: u8) -> Result<u8, DeviceError>;

    /// Make `value` the active configuration
    fn set_configuration(&mut self, value: u8) -> Result<(), DeviceError>;

    /// Request a bus-level re-enumeration (port reset)
    fn reenumerate(&mut self) -> Result<(), DeviceError>;

    /// Close the session and release everything it holds
    fn close(self);
}
