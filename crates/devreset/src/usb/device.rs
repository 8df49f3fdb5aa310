//! USB device identity
//!
//! Identity fields are read once per matched device and used for progress
//! output only; matching is done by the host before a device is resolved.

use rusb::{DeviceDescriptor, UsbContext, Version};

/// Identifying fields of one attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Device release number in BCD (`bcdDevice`)
    pub release: u16,
    pub bus_number: u8,
    pub address: u8,
    pub num_configurations: u8,
}

impl DeviceIdentity {
    /// Build the identity of `device` from its device descriptor
    pub fn from_descriptor<T: UsbContext>(
        device: &rusb::Device<T>,
        descriptor: &DeviceDescriptor,
    ) -> Self {
        Self {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            release: version_to_bcd(descriptor.device_version()),
            bus_number: device.bus_number(),
            address: device.address(),
            num_configurations: descriptor.num_configurations(),
        }
    }
}

/// Re-encode a decoded rusb version as the BCD value found in the descriptor
pub fn version_to_bcd(version: Version) -> u16 {
    let major = u16::from(version.major());
    let minor = u16::from(version.minor() & 0x0F);
    let sub_minor = u16::from(version.sub_minor() & 0x0F);

    (((major / 10) & 0x0F) << 12) | ((major % 10) << 8) | (minor << 4) | sub_minor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_to_bcd() {
        assert_eq!(version_to_bcd(Version::from_bcd(0x0100)), 0x0100);
        assert_eq!(version_to_bcd(Version::from_bcd(0x0210)), 0x0210);
        assert_eq!(version_to_bcd(Version::from_bcd(0x1234)), 0x1234);
        assert_eq!(version_to_bcd(Version::from_bcd(0x9999)), 0x9999);
        assert_eq!(version_to_bcd(Version::from_bcd(0x0000)), 0x0000);
    }

    #[test]
    fn test_version_to_bcd_from_parts() {
        assert_eq!(version_to_bcd(Version(2, 1, 3)), 0x0213);
        assert_eq!(version_to_bcd(Version(12, 0, 1)), 0x1201);
    }
}
