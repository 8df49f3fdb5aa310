//! Test utilities for devreset
//!
//! A scripted in-memory [`UsbHost`] that records every call made through the
//! USB traits, so tests can assert on the exact order of operations without
//! any hardware attached.
//!
//! # Example
//!
//! ```
//! use common::MatchFilter;
//! use devreset::driver::ResetDriver;
//! use devreset::test_utils::{Call, MockDevice, MockHost};
//!
//! let host = MockHost::new().with_device(MockDevice::new(0x1234, 0x5678));
//! let driver = ResetDriver::new(host).with_sleeper(|_| {});
//! let filter = MatchFilter::new(0x1234, 0x5678).unwrap();
//!
//! let summary = driver.reset_matching_devices(&filter).unwrap();
//! assert_eq!(summary.reset_count(), 1);
//! assert!(driver.host().calls().contains(&Call::Reenumerate(0)));
//! ```

use crate::usb::{DeviceError, DeviceIdentity, DeviceSession, ResettableDevice, UsbHost};
use common::MatchFilter;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// One recorded call, tagged with the index of the device it was made on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Match,
    Identity(usize),
    Open(usize),
    NumConfigurations(usize),
    ConfigurationValue(usize, u8),
    SetConfiguration(usize, u8),
    Reenumerate(usize),
    Close(usize),
}

impl Call {
    /// Device index the call was made on, if any
    pub fn device(&self) -> Option<usize> {
        match self {
            Call::Match => None,
            Call::Identity(i)
            | Call::Open(i)
            | Call::NumConfigurations(i)
            | Call::ConfigurationValue(i, _)
            | Call::SetConfiguration(i, _)
            | Call::Reenumerate(i)
            | Call::Close(i) => Some(*i),
        }
    }
}

type CallLog = Rc<RefCell<Vec<Call>>>;

/// Scripted behaviour of one attached device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub identity: DeviceIdentity,
    pub identity_error: Option<DeviceError>,
    /// Number of leading open attempts that report busy
    pub busy_opens: u32,
    pub open_error: Option<DeviceError>,
    /// `bConfigurationValue` of each configuration, by index
    pub configurations: Vec<u8>,
    pub set_configuration_error: Option<DeviceError>,
    pub reenumerate_error: Option<DeviceError>,
}

impl MockDevice {
    /// A free device with a single configuration whose value is 1
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            identity: DeviceIdentity {
                vendor_id,
                product_id,
                release: 0x0100,
                bus_number: 1,
                address: 1,
                num_configurations: 1,
            },
            identity_error: None,
            busy_opens: 0,
            open_error: None,
            configurations: vec![1],
            set_configuration_error: None,
            reenumerate_error: None,
        }
    }

    pub fn at(mut self, bus_number: u8, address: u8) -> Self {
        self.identity.bus_number = bus_number;
        self.identity.address = address;
        self
    }

    /// Report busy for the first `attempts` opens (`u32::MAX` for always)
    pub fn busy_for(mut self, attempts: u32) -> Self {
        self.busy_opens = attempts;
        self
    }

    pub fn failing_identity(mut self, error: DeviceError) -> Self {
        self.identity_error = Some(error);
        self
    }

    pub fn failing_open(mut self, error: DeviceError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn with_configurations(mut self, values: Vec<u8>) -> Self {
        self.identity.num_configurations = values.len() as u8;
        self.configurations = values;
        self
    }

    pub fn failing_set_configuration(mut self, error: DeviceError) -> Self {
        self.set_configuration_error = Some(error);
        self
    }

    pub fn failing_reenumerate(mut self, error: DeviceError) -> Self {
        self.reenumerate_error = Some(error);
        self
    }
}

/// In-memory USB host
#[derive(Debug, Default)]
pub struct MockHost {
    devices: Vec<MockDevice>,
    match_error: Option<String>,
    log: CallLog,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Make matching fail as if the USB subsystem were unavailable
    pub fn failing_match(mut self, message: &str) -> Self {
        self.match_error = Some(message.to_string());
        self
    }

    /// Every call recorded so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    /// Calls made on the device at `index`, in order
    pub fn calls_for(&self, index: usize) -> Vec<Call> {
        self.log
            .borrow()
            .iter()
            .filter(|c| c.device() == Some(index))
            .cloned()
            .collect()
    }

    /// Number of recorded calls satisfying `predicate`
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.log.borrow().iter().filter(|c| predicate(*c)).count()
    }

    fn attach(&self, index: usize) -> MockAttached {
        MockAttached {
            index,
            spec: self.devices[index].clone(),
            opens: Cell::new(0),
            log: Rc::clone(&self.log),
        }
    }
}

impl UsbHost for MockHost {
    type Device = MockAttached;

    fn matching_devices(&self, filter: &MatchFilter) -> common::Result<Vec<MockAttached>> {
        self.log.borrow_mut().push(Call::Match);

        if let Some(message) = &self.match_error {
            return Err(common::Error::Usb(message.clone()));
        }

        Ok((0..self.devices.len())
            .filter(|&i| {
                let identity = &self.devices[i].identity;
                filter.matches(identity.vendor_id, identity.product_id)
            })
            .map(|i| self.attach(i))
            .collect())
    }

    fn attached_devices(&self) -> common::Result<Vec<MockAttached>> {
        if let Some(message) = &self.match_error {
            return Err(common::Error::Usb(message.clone()));
        }
        Ok((0..self.devices.len()).map(|i| self.attach(i)).collect())
    }
}

/// A device handed out by [`MockHost`]
#[derive(Debug)]
pub struct MockAttached {
    index: usize,
    spec: MockDevice,
    opens: Cell<u32>,
    log: CallLog,
}

impl ResettableDevice for MockAttached {
    type Session = MockSession;

    fn identity(&self) -> Result<DeviceIdentity, DeviceError> {
        self.log.borrow_mut().push(Call::Identity(self.index));
        match &self.spec.identity_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.spec.identity),
        }
    }

    fn open(&self) -> Result<MockSession, DeviceError> {
        self.log.borrow_mut().push(Call::Open(self.index));

        let attempt = self.opens.get();
        self.opens.set(attempt.saturating_add(1));

        if attempt < self.spec.busy_opens {
            return Err(DeviceError::ExclusiveAccess);
        }
        if let Some(error) = &self.spec.open_error {
            return Err(error.clone());
        }

        Ok(MockSession {
            index: self.index,
            spec: self.spec.clone(),
            log: Rc::clone(&self.log),
        })
    }
}

/// Session on a [`MockAttached`] device
#[derive(Debug)]
pub struct MockSession {
    index: usize,
    spec: MockDevice,
    log: CallLog,
}

impl DeviceSession for MockSession {
    fn num_configurations(&self) -> Result<u8, DeviceError> {
        self.log
            .borrow_mut()
            .push(Call::NumConfigurations(self.index));
        Ok(self.spec.configurations.len() as u8)
    }

    fn configuration_value(&self, index: u8) -> Result<u8, DeviceError> {
        self.log
            .borrow_mut()
            .push(Call::ConfigurationValue(self.index, index));
        self.spec
            .configurations
            .get(usize::from(index))
            .copied()
            .ok_or_else(|| DeviceError::from(rusb::Error::NotFound))
    }

    fn set_configuration(&mut self, value: u8) -> Result<(), DeviceError> {
        self.log
            .borrow_mut()
            .push(Call::SetConfiguration(self.index, value));
        match &self.spec.set_configuration_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn reenumerate(&mut self) -> Result<(), DeviceError> {
        self.log.borrow_mut().push(Call::Reenumerate(self.index));
        match &self.spec.reenumerate_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn close(self) {
        self.log.borrow_mut().push(Call::Close(self.index));
    }
}
