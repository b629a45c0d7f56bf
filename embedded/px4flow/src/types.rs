//! Types used by the driver.
//!
//! Errors, the driver configuration and the static calibration it attaches to
//! every report.

use core::fmt;

use crate::frame::FrameLayout;
use crate::register::*;
use crate::rotation::Rotation;

/// Px4flow errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The measurement command (register select) was not acknowledged.
    I2cWriteError,
    /// Reading a frame from the device failed.
    I2cReadError,
    /// The number of bytes does not match the size of the requested layout.
    ShortRead { expected: usize, actual: usize },
    /// The device at the configured address did not identify as a PX4FLOW.
    ProbeFailed,
    /// Address outside of `ADDRESS_MIN..=ADDRESS_MAX`.
    InvalidAddress(u8),
    /// Rotation code that does not name a supported orientation.
    InvalidRotation(u8),
    /// Polling interval outside of the supported range.
    InvalidInterval(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2cWriteError => write!(f, "Failed to write measurement command"),
            Self::I2cReadError => write!(f, "Failed to read frame from sensor"),
            Self::ShortRead { expected, actual } => {
                write!(f, "Frame has {actual} bytes, expected {expected}")
            }
            Self::ProbeFailed => write!(f, "Device did not respond like a PX4FLOW"),
            Self::InvalidAddress(address) => write!(
                f,
                "Address {address:#04x} is outside of {ADDRESS_MIN:#04x}..={ADDRESS_MAX:#04x}"
            ),
            Self::InvalidRotation(code) => write!(f, "Unsupported rotation code {code}"),
            Self::InvalidInterval(interval) => write!(
                f,
                "Interval {interval}us is outside of {CONVERSION_INTERVAL_MIN}..={CONVERSION_INTERVAL_MAX}us"
            ),
        }
    }
}

impl core::error::Error for Error {}

/// Calibration bounds attached to the published reports.
///
/// These are properties of the module, not measurements.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Maximum flow rate the camera can track, rad/s
    pub max_flow_rate: f32,
    /// Lower bound of the ground distance the flow is valid for, m
    pub min_ground_distance: f32,
    /// Upper bound of the ground distance the flow is valid for, m
    pub max_ground_distance: f32,
    /// Minimum range of the sonar, m
    pub min_distance: f32,
    /// Maximum range of the sonar, m
    pub max_distance: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            max_flow_rate: 2.5,
            min_ground_distance: 0.7,
            max_ground_distance: 3.0,
            min_distance: 0.3,
            max_distance: 5.0,
        }
    }
}

/// Driver configuration, fixed once the measurement cycle is built.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverConfig {
    /// 7-bit bus address
    pub address: u8,
    /// Rotation applied to the flow and delta angle vectors.
    pub flow_rotation: Rotation,
    /// Physical mounting of the sonar. Only used to tag distance reports.
    pub mounting_rotation: Rotation,
    /// Register and frame layout polled every cycle.
    pub layout: FrameLayout,
    /// Delay between two cycles in microseconds.
    pub interval_us: u32,
    pub calibration: Calibration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: ADDRESS_DEFAULT,
            flow_rotation: Rotation::None,
            mounting_rotation: Rotation::DOWNWARD_FACING,
            layout: FrameLayout::Integral,
            interval_us: CONVERSION_INTERVAL_DEFAULT,
            calibration: Calibration::default(),
        }
    }
}

impl DriverConfig {
    /// Checks the address and polling interval against the supported ranges.
    pub fn validate(&self) -> Result<(), Error> {
        if !(ADDRESS_MIN..=ADDRESS_MAX).contains(&self.address) {
            return Err(Error::InvalidAddress(self.address));
        }
        if !(CONVERSION_INTERVAL_MIN..=CONVERSION_INTERVAL_MAX).contains(&self.interval_us) {
            return Err(Error::InvalidInterval(self.interval_us));
        }
        Ok(())
    }
}

/// Source of monotonic timestamps in microseconds.
pub trait Clock {
    fn now_us(&self) -> u64;
}

impl<F> Clock for F
where
    F: Fn() -> u64,
{
    fn now_us(&self) -> u64 {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DriverConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.address, 0x42);
        assert_eq!(config.layout, FrameLayout::Integral);
        assert_eq!(u8::from(config.mounting_rotation), 25);
    }

    #[test]
    fn rejects_out_of_range_address() {
        let config = DriverConfig {
            address: 0x4A,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidAddress(0x4A)));
    }

    #[test]
    fn rejects_out_of_range_interval() {
        for interval_us in [9_999, 1_000_001] {
            let config = DriverConfig {
                interval_us,
                ..Default::default()
            };
            assert_eq!(config.validate(), Err(Error::InvalidInterval(interval_us)));
        }
        let config = DriverConfig {
            interval_us: 10_000,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
