//! libusb-backed USB host
//!
//! Matching uses a hotplug registration with enumeration enabled: libusb fires
//! one arrival per already-connected matching device while the callback is
//! being registered. The registration is dropped straight away and the event
//! loop is never run, so the result is a one-shot snapshot and later arrivals
//! are never seen. Platforms without hotplug support fall back to filtering
//! the device list.

use crate::usb::{DeviceError, DeviceIdentity, DeviceSession, ResettableDevice, UsbHost};
use common::MatchFilter;
use rusb::{Context, Device, DeviceHandle, Hotplug, HotplugBuilder, UsbContext};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// USB host backed by a libusb context
pub struct RusbHost {
    /// USB context for device operations
    context: Context,
    /// Detach kernel drivers on open so the configuration can be applied
    detach_kernel_drivers: bool,
}

impl RusbHost {
    /// Initialize libusb
    pub fn new(detach_kernel_drivers: bool) -> common::Result<Self> {
        let context = Context::new()
            .map_err(|e| common::Error::Usb(format!("Failed to initialize libusb: {}", e)))?;

        debug!(
            "libusb initialized (hotplug support: {})",
            rusb::has_hotplug()
        );

        Ok(Self {
            context,
            detach_kernel_drivers,
        })
    }

    /// Collect the arrivals libusb reports while registering an enumerating callback
    fn hotplug_snapshot(&self, filter: &MatchFilter) -> rusb::Result<Vec<Device<Context>>> {
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        let callback = ArrivalCollector {
            arrivals: Arc::clone(&arrivals),
        };

        let registration = HotplugBuilder::new()
            .vendor_id(filter.vendor_id())
            .product_id(filter.product_id())
            .enumerate(true)
            .register(&self.context, Box::new(callback))?;

        // Unregister before touching any device; no further arrivals are wanted
        drop(registration);

        let devices = match arrivals.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        Ok(devices)
    }

    /// Filter the current device list by descriptor
    fn list_snapshot(&self, filter: &MatchFilter) -> rusb::Result<Vec<Device<Context>>> {
        let devices = self.context.devices()?;

        Ok(devices
            .iter()
            .filter(|device| match device.device_descriptor() {
                Ok(desc) => filter.matches(desc.vendor_id(), desc.product_id()),
                Err(e) => {
                    debug!(
                        "Skipping device bus={} addr={}: cannot read descriptor: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    false
                }
            })
            .collect())
    }

    fn wrap(&self, device: Device<Context>) -> RusbDevice {
        RusbDevice {
            device,
            detach_kernel_drivers: self.detach_kernel_drivers,
        }
    }
}

impl UsbHost for RusbHost {
    type Device = RusbDevice;

    fn matching_devices(&self, filter: &MatchFilter) -> common::Result<Vec<RusbDevice>> {
        let devices = if rusb::has_hotplug() {
            self.hotplug_snapshot(filter)
        } else {
            self.list_snapshot(filter)
        }
        .map_err(|e| common::Error::Usb(format!("Failed to match devices ({}): {}", filter, e)))?;

        debug!("{} device(s) match {}", devices.len(), filter);
        Ok(devices.into_iter().map(|d| self.wrap(d)).collect())
    }

    fn attached_devices(&self) -> common::Result<Vec<RusbDevice>> {
        let devices = self
            .context
            .devices()
            .map_err(|e| common::Error::Usb(format!("Failed to list devices: {}", e)))?;

        Ok(devices.iter().map(|d| self.wrap(d)).collect())
    }
}

/// Hotplug callback that records arriving devices
struct ArrivalCollector {
    arrivals: Arc<Mutex<Vec<Device<Context>>>>,
}

impl Hotplug<Context> for ArrivalCollector {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        match self.arrivals.lock() {
            Ok(mut guard) => guard.push(device),
            Err(poisoned) => poisoned.into_inner().push(device),
        }
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
    }
}

/// A matched libusb device
pub struct RusbDevice {
    device: Device<Context>,
    detach_kernel_drivers: bool,
}

impl RusbDevice {
    /// Interface numbers of the active configuration
    fn active_interfaces(&self) -> Vec<u8> {
        match self.device.active_config_descriptor() {
            Ok(config) => config.interfaces().map(|i| i.number()).collect(),
            Err(e) => {
                debug!("No active configuration: {}", e);
                Vec::new()
            }
        }
    }
}

/// Detach kernel drivers from `interfaces`
///
/// Returns the interfaces that were detached so they can be reattached.
fn detach_drivers(handle: &mut DeviceHandle<Context>, interfaces: &[u8]) -> Vec<u8> {
    let mut detached = Vec::new();

    for &interface_number in interfaces {
        match handle.kernel_driver_active(interface_number) {
            Ok(true) => match handle.detach_kernel_driver(interface_number) {
                Ok(()) => {
                    debug!("Detached kernel driver from interface {}", interface_number);
                    detached.push(interface_number);
                }
                Err(e) => {
                    // set_configuration will most likely report busy next
                    warn!(
                        "Failed to detach kernel driver from interface {}: {}",
                        interface_number, e
                    );
                }
            },
            Ok(false) => {
                debug!("No kernel driver active on interface {}", interface_number);
            }
            Err(e) => {
                debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    interface_number, e
                );
            }
        }
    }

    detached
}

fn reattach_drivers(handle: &mut DeviceHandle<Context>, detached: &[u8]) {
    for &interface in detached {
        // The handle is usually stale after a reset; the kernel rebinds on its own then
        if let Err(e) = handle.attach_kernel_driver(interface) {
            debug!(
                "Could not reattach kernel driver to interface {}: {}",
                interface, e
            );
        } else {
            debug!("Reattached kernel driver to interface {}", interface);
        }
    }
}

/// Interface claiming on an open handle
trait InterfaceClaim {
    fn claim(&mut self, interface: u8) -> rusb::Result<()>;
    fn release(&mut self, interface: u8) -> rusb::Result<()>;
}

impl InterfaceClaim for DeviceHandle<Context> {
    fn claim(&mut self, interface: u8) -> rusb::Result<()> {
        self.claim_interface(interface)
    }

    fn release(&mut self, interface: u8) -> rusb::Result<()> {
        self.release_interface(interface)
    }
}

/// Claim and release every interface to find out whether another process holds one
///
/// libusb opens a device that another process is using without complaint; the
/// conflict only shows up as `Busy` when an interface is claimed. Errors other
/// than `Busy` (claiming unsupported on the platform, interface gone) are
/// ignored. All claims are released before returning.
fn check_exclusive<C: InterfaceClaim>(
    handle: &mut C,
    interfaces: &[u8],
) -> Result<(), DeviceError> {
    let mut claimed = Vec::new();
    let mut result = Ok(());

    for &interface in interfaces {
        match handle.claim(interface) {
            Ok(()) => claimed.push(interface),
            Err(rusb::Error::Busy) => {
                debug!("Interface {} is claimed by another process", interface);
                result = Err(DeviceError::ExclusiveAccess);
                break;
            }
            Err(e) => debug!("Could not claim interface {}: {}", interface, e),
        }
    }

    for interface in claimed {
        if let Err(e) = handle.release(interface) {
            debug!("Could not release interface {}: {}", interface, e);
        }
    }

    result
}

impl ResettableDevice for RusbDevice {
    type Session = RusbSession;

    fn identity(&self) -> Result<DeviceIdentity, DeviceError> {
        let descriptor = self.device.device_descriptor()?;
        Ok(DeviceIdentity::from_descriptor(&self.device, &descriptor))
    }

    fn open(&self) -> Result<RusbSession, DeviceError> {
        let mut handle = self.device.open()?;
        debug!(
            "Opened device bus={} addr={}",
            self.device.bus_number(),
            self.device.address()
        );

        let interfaces = self.active_interfaces();
        let detached = if self.detach_kernel_drivers {
            detach_drivers(&mut handle, &interfaces)
        } else {
            Vec::new()
        };

        // Interfaces still bound to a kernel driver are held by the kernel, not a process
        let unbound: Vec<u8> = interfaces
            .into_iter()
            .filter(|&i| !matches!(handle.kernel_driver_active(i), Ok(true)))
            .collect();

        if let Err(e) = check_exclusive(&mut handle, &unbound) {
            reattach_drivers(&mut handle, &detached);
            return Err(e);
        }

        Ok(RusbSession {
            device: self.device.clone(),
            handle,
            detached,
        })
    }
}

/// Open libusb handle on one device
pub struct RusbSession {
    device: Device<Context>,
    handle: DeviceHandle<Context>,
    /// Interfaces whose kernel driver we detached
    detached: Vec<u8>,
}

impl DeviceSession for RusbSession {
    fn num_configurations(&self) -> Result<u8, DeviceError> {
        Ok(self.device.device_descriptor()?.num_configurations())
    }

    fn configuration_value(&self, index: u8) -> Result<u8, DeviceError> {
        Ok(self.device.config_descriptor(index)?.number())
    }

    fn set_configuration(&mut self, value: u8) -> Result<(), DeviceError> {
        self.handle.set_active_configuration(value)?;
        debug!("Set active configuration {}", value);
        Ok(())
    }

    fn reenumerate(&mut self) -> Result<(), DeviceError> {
        match self.handle.reset() {
            Ok(()) => Ok(()),
            // libusb reports NotFound when the device came back as a new device
            Err(rusb::Error::NotFound) => {
                debug!("Device re-enumerated with a new address");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(self) {
        let RusbSession {
            device,
            mut handle,
            detached,
        } = self;

        reattach_drivers(&mut handle, &detached);

        debug!(
            "Closed device bus={} addr={}",
            device.bus_number(),
            device.address()
        );
        drop(handle);
    }
}
