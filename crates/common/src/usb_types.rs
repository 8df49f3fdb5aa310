//! USB vendor/product id handling
//!
//! Ids arrive from the command line in whatever base the user typed them:
//! `1234`, `0x04d8`, `0X04D8` or `011064` (octal) are all accepted.

use crate::{Error, Result};
use std::fmt;

/// Largest valid vendor or product id
pub const MAX_USB_ID: i64 = 0xFFFF;

/// Parse an integer with C-style base detection
///
/// Leading/trailing whitespace and a single sign are allowed. A `0x`/`0X`
/// prefix selects hex, a leading `0` selects octal, anything else is decimal.
/// Returns `None` unless the whole input is a valid number.
pub fn parse_integer(input: &str) -> Option<i64> {
    let s = input.trim();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"));
    let (digits, radix) = if let Some(hex) = hex {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    // from_str_radix accepts its own sign, which would allow "--1" or "0x-5"
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }

    let value = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -value } else { value })
}

/// Parse a vendor or product id, requiring it to be in `1..=0xFFFF`
pub fn parse_usb_id(input: &str) -> Result<u16> {
    let value = parse_integer(input).ok_or_else(|| Error::InvalidId(input.to_string()))?;
    check_id_range(value).ok_or_else(|| Error::InvalidId(input.to_string()))
}

fn check_id_range(value: i64) -> Option<u16> {
    if value <= 0 || value > MAX_USB_ID {
        None
    } else {
        u16::try_from(value).ok()
    }
}

/// Vendor/product pair selecting the devices to operate on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchFilter {
    vendor_id: u16,
    product_id: u16,
}

impl MatchFilter {
    /// Build a filter from raw ids, rejecting zero
    pub fn new(vendor_id: u16, product_id: u16) -> Result<Self> {
        if vendor_id == 0 || product_id == 0 {
            return Err(Error::Config("Invalid productID or vendorID".to_string()));
        }
        Ok(Self {
            vendor_id,
            product_id,
        })
    }

    /// Build a filter from command-line strings (product first, as typed)
    pub fn from_args(product_id: &str, vendor_id: &str) -> Result<Self> {
        match (parse_usb_id(vendor_id), parse_usb_id(product_id)) {
            (Ok(vendor_id), Ok(product_id)) => Self::new(vendor_id, product_id),
            _ => Err(Error::Config("Invalid productID or vendorID".to_string())),
        }
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    /// Check whether a device with the given ids is selected by this filter
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

impl fmt::Display for MatchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vendor=0x{:04x} product=0x{:04x}",
            self.vendor_id, self.product_id
        )
    }
}
