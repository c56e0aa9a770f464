//! Human-readable size formatting for log output.

use core::fmt;

/// Wraps a byte count and formats it with binary SI prefixes.
///
/// Values are displayed with up to 2 decimal places, omitting trailing zeros.
///
/// # Examples
///
/// ```
/// use vmm::HumanSize;
///
/// assert_eq!(format!("{}", HumanSize::new(0)), "0B");
/// assert_eq!(format!("{}", HumanSize::new(1023)), "1023B");
/// assert_eq!(format!("{}", HumanSize::new(1024)), "1KiB");
/// assert_eq!(format!("{}", HumanSize::new(1536)), "1.5KiB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct HumanSize(pub usize);

impl HumanSize {
    /// Creates a new human-readable size from bytes.
    #[inline]
    pub const fn new(bytes: usize) -> Self {
        Self(bytes)
    }

    /// Returns the raw byte count.
    #[inline]
    pub const fn bytes(self) -> usize {
        self.0
    }
}

impl From<usize> for HumanSize {
    #[inline]
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl fmt::Display for HumanSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

        if self.0 < 1024 {
            return write!(f, "{}B", self.0);
        }

        let mut divisor: u128 = 1;
        let mut unit = 0;
        while self.0 as u128 / divisor >= 1024 && unit < UNITS.len() - 1 {
            divisor *= 1024;
            unit += 1;
        }

        // Scale to hundredths with integer arithmetic, then trim trailing
        // zeros from the fraction.
        let hundredths = self.0 as u128 * 100 / divisor;
        let (whole, frac) = (hundredths / 100, hundredths % 100);
        if frac == 0 {
            write!(f, "{whole}{}", UNITS[unit])
        } else if frac % 10 == 0 {
            write!(f, "{whole}.{}{}", frac / 10, UNITS[unit])
        } else {
            write!(f, "{whole}.{frac:02}{}", UNITS[unit])
        }
    }
}
