//! Device listing (`--list-devices`)

use crate::usb::{DeviceIdentity, ResettableDevice, UsbHost};
use common::MatchFilter;
use tracing::warn;

/// Identities of attached devices, optionally restricted to `filter`
///
/// Sorted by bus and address. Devices whose descriptor cannot be read are
/// skipped with a warning.
pub fn list_devices<H: UsbHost>(
    host: &H,
    filter: Option<&MatchFilter>,
) -> common::Result<Vec<DeviceIdentity>> {
    let mut identities: Vec<DeviceIdentity> = host
        .attached_devices()?
        .iter()
        .filter_map(|device| match device.identity() {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Skipping device: {}", e);
                None
            }
        })
        .filter(|identity| {
            filter.is_none_or(|f| f.matches(identity.vendor_id, identity.product_id))
        })
        .collect();

    identities.sort_by_key(|identity| (identity.bus_number, identity.address));
    Ok(identities)
}

/// One line of listing output
pub fn format_device(identity: &DeviceIdentity) -> String {
    format!(
        "Bus {:03} Device {:03}: ID {:04x}:{:04x} (version 0x{:04X}, {} configuration(s))",
        identity.bus_number,
        identity.address,
        identity.vendor_id,
        identity.product_id,
        identity.release,
        identity.num_configurations
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockDevice, MockHost};
    use crate::usb::DeviceError;

    #[test]
    fn test_format_device() {
        let identity = MockDevice::new(0x04d8, 0x000a).at(1, 4).identity;
        assert_eq!(
            format_device(&identity),
            "Bus 001 Device 004: ID 04d8:000a (version 0x0100, 1 configuration(s))"
        );
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let host = MockHost::new()
            .with_device(MockDevice::new(0x1234, 0x5678).at(2, 1))
            .with_device(MockDevice::new(0xabcd, 0x0001).at(1, 9))
            .with_device(MockDevice::new(0x1234, 0x5678).at(1, 3));

        let all = list_devices(&host, None).unwrap();
        let positions: Vec<(u8, u8)> = all.iter().map(|d| (d.bus_number, d.address)).collect();
        assert_eq!(positions, vec![(1, 3), (1, 9), (2, 1)]);

        let filter = MatchFilter::new(0x1234, 0x5678).unwrap();
        let matching = list_devices(&host, Some(&filter)).unwrap();
        assert_eq!(matching.len(), 2);
        assert!(matching.iter().all(|d| d.vendor_id == 0x1234));
    }

    #[test]
    fn test_list_skips_unreadable_devices() {
        let unreadable = MockDevice::new(0x1234, 0x5678)
            .failing_identity(DeviceError::from(rusb::Error::Io));
        let host = MockHost::new()
            .with_device(unreadable)
            .with_device(MockDevice::new(0x1234, 0x5679));

        let all = list_devices(&host, None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].product_id, 0x5679);
    }
}
