//! Register map and bus constants of the PX4FLOW module.

/// Default 7-bit I2C address (8-bit address 0x84).
pub const ADDRESS_DEFAULT: u8 = 0x42;
/// Lowest address the module can be strapped to.
pub const ADDRESS_MIN: u8 = 0x42;
/// Highest address the module can be strapped to.
pub const ADDRESS_MAX: u8 = 0x49;

/// Register holding a non-integral frame directly followed by an integral frame.
pub const REG_FRAME: u8 = 0x00;
/// Register holding only the integral frame (register 22).
pub const REG_INTEGRAL_FRAME: u8 = 0x16;

/// Default polling interval in microseconds (10 Hz).
pub const CONVERSION_INTERVAL_DEFAULT: u32 = 100_000;
/// Fastest supported polling interval in microseconds (100 Hz).
pub const CONVERSION_INTERVAL_MIN: u32 = 10_000;
/// Slowest supported polling interval in microseconds (1 Hz).
pub const CONVERSION_INTERVAL_MAX: u32 = 1_000_000;

/// Number of bytes read from the neutral register while probing.
///
/// Other devices sharing this address range (LIDAR-Lite) NACK a read of this
/// size without a register select, whereas the PX4FLOW returns data.
pub const PROBE_LEN: usize = crate::frame::FRAME_SIZE;
