//! Per-device error type

use thiserror::Error;

/// libusb error codes, reported verbatim for diagnostics
pub mod codes {
    pub const IO: i32 = -1;
    pub const INVALID_PARAM: i32 = -2;
    pub const ACCESS: i32 = -3;
    pub const NO_DEVICE: i32 = -4;
    pub const NOT_FOUND: i32 = -5;
    pub const BUSY: i32 = -6;
    pub const TIMEOUT: i32 = -7;
    pub const OVERFLOW: i32 = -8;
    pub const PIPE: i32 = -9;
    pub const INTERRUPTED: i32 = -10;
    pub const NO_MEM: i32 = -11;
    pub const NOT_SUPPORTED: i32 = -12;
    pub const OTHER: i32 = -99;
}

/// Error raised while driving one device through a reset
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Another process holds the device
    #[error("exclusive access unavailable (code {})", codes::BUSY)]
    ExclusiveAccess,

    #[error("device reports no configurations")]
    NoConfigurations,

    #[error("{message} (code {code})")]
    Platform { code: i32, message: String },
}

impl DeviceError {
    /// Raw platform error code, if the error came from the platform
    pub fn code(&self) -> Option<i32> {
        match self {
            DeviceError::ExclusiveAccess => Some(codes::BUSY),
            DeviceError::NoConfigurations => None,
            DeviceError::Platform { code, .. } => Some(*code),
        }
    }
}

impl From<rusb::Error> for DeviceError {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Busy => DeviceError::ExclusiveAccess,
            e => DeviceError::Platform {
                code: libusb_code(&e),
                message: e.to_string(),
            },
        }
    }
}

/// Map a rusb error back to the libusb code it was built from
pub fn libusb_code(e: &rusb::Error) -> i32 {
    match e {
        rusb::Error::Io => codes::IO,
        rusb::Error::InvalidParam => codes::INVALID_PARAM,
        rusb::Error::Access => codes::ACCESS,
        rusb::Error::NoDevice => codes::NO_DEVICE,
        rusb::Error::NotFound => codes::NOT_FOUND,
        rusb::Error::Busy => codes::BUSY,
        rusb::Error::Timeout => codes::TIMEOUT,
        rusb::Error::Overflow => codes::OVERFLOW,
        rusb::Error::Pipe => codes::PIPE,
        rusb::Error::Interrupted => codes::INTERRUPTED,
        rusb::Error::NoMem => codes::NO_MEM,
        rusb::Error::NotSupported => codes::NOT_SUPPORTED,
        _ => codes::OTHER,
    }
}
