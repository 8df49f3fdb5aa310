//! Device reset driver
//!
//! Drives each matched device through
//! `Discovered -> InterfaceResolved -> Opened -> Configured -> Reenumerated -> Closed`.
//! Any per-device failure jumps straight to `Closed` for that device and the
//! driver moves on to the next one. Devices are processed one at a time.

use crate::usb::{DeviceError, DeviceIdentity, DeviceSession, ResettableDevice, UsbHost};
use common::MatchFilter;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Open attempts made while another process holds the device
pub const DEFAULT_MAX_OPEN_ATTEMPTS: u32 = 5;

/// Pause after each busy open attempt
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Bounded retry for the exclusive open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_OPEN_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Step at which a device was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Open,
    Configure,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Resolve => write!(f, "resolve"),
            Stage::Open => write!(f, "open"),
            Stage::Configure => write!(f, "configure"),
        }
    }
}

/// How processing of one device ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    /// Configured and re-enumerated
    Reset,
    /// Configured, but the re-enumeration request failed
    ReenumerateFailed(DeviceError),
    /// Processing stopped early; the session (if any) was closed
    Abandoned { stage: Stage, error: DeviceError },
}

/// Outcomes of one pass over the matched devices, in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub outcomes: Vec<DeviceOutcome>,
}

impl ResetSummary {
    /// Number of devices that matched the filter
    pub fn matched(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of devices that were re-enumerated
    pub fn reset_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DeviceOutcome::Reset))
            .count()
    }

    /// Number of devices given up on before the reset step
    pub fn abandoned_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DeviceOutcome::Abandoned { .. }))
            .count()
    }
}

/// Resets every currently attached device matching a filter
pub struct ResetDriver<H: UsbHost> {
    host: H,
    retry: RetryPolicy,
    sleep: Box<dyn Fn(Duration)>,
}

impl<H: UsbHost> ResetDriver<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            retry: RetryPolicy::default(),
            sleep: Box::new(std::thread::sleep),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the blocking sleep used between busy open attempts
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Reset all devices currently attached that match `filter`
    ///
    /// Only devices present right now are processed. Errors on individual
    /// devices are reported and recorded in the summary; only a failure to
    /// enumerate at all is returned as an error.
    pub fn reset_matching_devices(&self, filter: &MatchFilter) -> common::Result<ResetSummary> {
        let devices = self.host.matching_devices(filter)?;
        info!("{} device(s) match {}", devices.len(), filter);

        let outcomes = devices
            .iter()
            .map(|device| self.reset_device(device))
            .collect();

        Ok(ResetSummary { outcomes })
    }

    fn reset_device(&self, device: &H::Device) -> DeviceOutcome {
        let identity = match device.identity() {
            Ok(identity) => identity,
            Err(error) => {
                eprintln!("could not get device interface: {}", error);
                return DeviceOutcome::Abandoned {
                    stage: Stage::Resolve,
                    error,
                };
            }
        };

        println!(
            "Found device vendor=0x{:04X}, product=0x{:04X}, version=0x{:04X}",
            identity.vendor_id, identity.product_id, identity.release
        );

        let mut session = match self.open_exclusive(device) {
            Ok(session) => session,
            Err(error) => {
                eprintln!("could not open device: {}", error);
                return DeviceOutcome::Abandoned {
                    stage: Stage::Open,
                    error,
                };
            }
        };

        if let Err(error) = apply_first_configuration(&mut session) {
            eprintln!("could not configure device: {}", error);
            session.close();
            return DeviceOutcome::Abandoned {
                stage: Stage::Configure,
                error,
            };
        }

        let outcome = match session.reenumerate() {
            Ok(()) => {
                println!("Re-enumerated device {}", describe(&identity));
                DeviceOutcome::Reset
            }
            Err(error) => {
                println!("re-enumeration failed: {}", error);
                DeviceOutcome::ReenumerateFailed(error)
            }
        };

        session.close();
        outcome
    }

    /// Open `device`, waiting while another process holds it
    ///
    /// Every busy attempt is followed by one retry interval, including the
    /// last, so a device held throughout costs `max_attempts` intervals.
    fn open_exclusive(
        &self,
        device: &H::Device,
    ) -> Result<<H::Device as ResettableDevice>::Session, DeviceError> {
        let mut attempts = 0;

        loop {
            match device.open() {
                Err(DeviceError::ExclusiveAccess) => {
                    println!(
                        "waiting for access ({})",
                        self.retry.max_attempts.saturating_sub(attempts)
                    );
                    attempts += 1;
                    (self.sleep)(self.retry.interval);

                    if attempts >= self.retry.max_attempts {
                        warn!("Device still busy after {} attempts", attempts);
                        return Err(DeviceError::ExclusiveAccess);
                    }
                }
                result => {
                    debug!("Open finished after {} busy attempt(s)", attempts);
                    return result;
                }
            }
        }
    }
}

/// Apply the device's first configuration
///
/// Returns the `bConfigurationValue` that was set.
pub fn apply_first_configuration<S: DeviceSession>(session: &mut S) -> Result<u8, DeviceError> {
    if session.num_configurations()? == 0 {
        return Err(DeviceError::NoConfigurations);
    }

    let value = session.configuration_value(0)?;
    session.set_configuration(value)?;
    Ok(value)
}

fn describe(identity: &DeviceIdentity) -> String {
    format!(
        "vendor=0x{:04X}, product=0x{:04X} (bus {:03} device {:03})",
        identity.vendor_id, identity.product_id, identity.bus_number, identity.address
    )
}
