//! Outbound report records.

use crate::frame::DecodedMeasurement;
use crate::rotation::Rotation;
use crate::types::{Clock, DriverConfig};

/// Device type code of the PX4FLOW inside a [`DeviceId`].
pub const DEVTYPE_PX4FLOW: u8 = 0x71;

/// `signal_quality` value meaning the sensor does not report one.
pub const SIGNAL_QUALITY_INVALID: i8 = -1;

/// Packed identity of a bus device.
///
/// Layout from the least significant bit: bus type (3 bits), bus number
/// (5 bits), address (8 bits), device type (8 bits).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId(pub u32);

impl DeviceId {
    const BUS_TYPE_I2C: u32 = 1;

    /// Identity of a PX4FLOW at `address` on I2C bus `bus`.
    pub fn px4flow(bus: u8, address: u8) -> Self {
        Self(
            Self::BUS_TYPE_I2C
                | (u32::from(bus) & 0x1F) << 3
                | u32::from(address) << 8
                | u32::from(DEVTYPE_PX4FLOW) << 16,
        )
    }

    pub fn bus(self) -> u8 {
        ((self.0 >> 3) & 0x1F) as u8
    }

    pub fn address(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn devtype(self) -> u8 {
        (self.0 >> 16) as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpticalFlowReport {
    pub timestamp_sample_us: u64,
    pub device_id: DeviceId,
    /// Integrated flow in the body frame, rad
    pub pixel_flow: [f32; 2],
    /// Integrated gyro rotation in the body frame, rad
    pub delta_angle: [f32; 3],
    pub delta_angle_available: bool,
    pub integration_timespan_us: u32,
    /// 0 is bad, 255 is best
    pub quality: u8,
    pub max_flow_rate: f32,
    pub min_ground_distance: f32,
    pub max_ground_distance: f32,
    /// Publication time
    pub timestamp_us: u64,
}

/// Range sensor technology, numbered like the MAVLink `MAV_DISTANCE_SENSOR` enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DistanceSensorType {
    Laser = 0,
    Ultrasound = 1,
    Infrared = 2,
    Radar = 3,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DistanceReport {
    pub timestamp_us: u64,
    pub device_id: DeviceId,
    pub min_distance: f32,
    pub max_distance: f32,
    /// m
    pub current_distance: f32,
    pub variance: f32,
    /// -1 if unknown, otherwise 0 (bad) to 100 (best)
    pub signal_quality: i8,
    pub sensor_type: DistanceSensorType,
    /// Mounting of the sensor. Informational, never applied to the distance.
    pub orientation: Rotation,
}

/// Builds the reports for one decoded measurement.
///
/// The distance report is only built for the primary publisher of distance
/// data, so that several modules on one vehicle do not emit duplicate ranges.
pub fn assemble(
    decoded: &DecodedMeasurement,
    config: &DriverConfig,
    device_id: DeviceId,
    is_primary_instance: bool,
    clock: &impl Clock,
) -> (OpticalFlowReport, Option<DistanceReport>) {
    let timestamp_sample_us = clock.now_us();
    let [flow_x, flow_y] = decoded.pixel_flow;
    let (flow_x, flow_y, _) = config.flow_rotation.rotate(flow_x, flow_y, 0.0);
    let calibration = &config.calibration;

    let flow = OpticalFlowReport {
        timestamp_sample_us,
        device_id,
        pixel_flow: [flow_x, flow_y],
        delta_angle: config.flow_rotation.rotate_vector(decoded.delta_angle),
        delta_angle_available: true,
        integration_timespan_us: decoded.integration_timespan_us,
        quality: decoded.quality,
        max_flow_rate: calibration.max_flow_rate,
        min_ground_distance: calibration.min_ground_distance,
        max_ground_distance: calibration.max_ground_distance,
        timestamp_us: clock.now_us(),
    };

    let distance = is_primary_instance.then(|| DistanceReport {
        timestamp_us: clock.now_us(),
        device_id,
        min_distance: calibration.min_distance,
        max_distance: calibration.max_distance,
        current_distance: decoded.ground_distance,
        variance: 0.0,
        signal_quality: SIGNAL_QUALITY_INVALID,
        sensor_type: DistanceSensorType::Ultrasound,
        orientation: config.mounting_rotation,
    });

    (flow, distance)
}
