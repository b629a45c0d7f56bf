//! Platform-agnostic driver for the PX4FLOW optical flow module.
//!
//! The module integrates optical flow and gyro rotation between two readouts
//! and carries a sonar for the ground distance. Every pass of a
//! [`MeasurementCycle`] selects the frame register, reads the frame back,
//! rotates the vectors into the body frame and hands an
//! [`OpticalFlowReport`] (and, for the primary instance, a
//! [`DistanceReport`]) to a [`TelemetrySink`].
//!
//! ```
//! use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
//! use px4flow::{DriverConfig, IntegralFrame, MeasurementCycle, Schedule, TelemetrySink};
//! # use px4flow::{DistanceReport, OpticalFlowReport};
//! # struct Sink;
//! # impl TelemetrySink for Sink {
//! #     fn publish_flow(&mut self, _: &OpticalFlowReport) {}
//! #     fn publish_distance(&mut self, _: &DistanceReport) {}
//! #     fn distance_instance(&mut self) -> Option<u8> { Some(0) }
//! # }
//!
//! let frame = IntegralFrame { ground_distance: 1500, qual: 255, ..Default::default() };
//! let mut i2c = Mock::new(&[
//!     Transaction::write(0x42, vec![0x16]),
//!     Transaction::read(0x42, frame.to_bytes().to_vec()),
//! ]);
//!
//! let mut cycle = MeasurementCycle::new(i2c.clone(), DriverConfig::default(), 1, Sink, || 0u64).unwrap();
//! assert_eq!(cycle.run(), Schedule::After(100_000));
//! i2c.done();
//! ```

#![cfg_attr(not(test), no_std)]

pub mod cycle;
pub mod frame;
pub mod register;
pub mod reports;
pub mod rotation;
pub mod types;

pub use cycle::*;
pub use frame::*;
pub use register::*;
pub use reports::*;
pub use rotation::Rotation;
pub use types::*;
