//! A PX4FLOW behind a simulated I2C bus.
//!
//! The module integrates the configured scene between two readouts like the
//! real firmware does. A write selects the register the next read starts at; a
//! read without a preceding write returns the non-integral frame.

use std::time::Instant;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use px4flow::{Frame, IntegralFrame, FRAME_SIZE, REG_FRAME, REG_INTEGRAL_FRAME};

use crate::config::SimSettings;

/// Camera frame rate of the module, Hz
const FRAME_RATE: f32 = 400.0;

pub struct SimulatedFlow {
    address: u8,
    scene: SimSettings,
    register: Option<u8>,
    frame_count: u16,
    last_readout: Instant,
    reads: u32,
}

impl SimulatedFlow {
    pub fn new(address: u8, scene: SimSettings) -> Self {
        Self {
            address,
            scene,
            register: None,
            frame_count: 0,
            last_readout: Instant::now(),
            reads: 0,
        }
    }

    fn frame(&self) -> Frame {
        let per_frame = |rate: f32| to_fixed(rate / FRAME_RATE);
        Frame {
            frame_count: self.frame_count,
            pixel_flow_x_sum: per_frame(self.scene.flow_x),
            pixel_flow_y_sum: per_frame(self.scene.flow_y),
            flow_comp_m_x: to_fixed(self.scene.flow_x * self.scene.distance / 10.0),
            flow_comp_m_y: to_fixed(self.scene.flow_y * self.scene.distance / 10.0),
            qual: self.scene.quality.into(),
            gyro_x_rate: to_fixed(self.scene.gyro[0]),
            gyro_y_rate: to_fixed(self.scene.gyro[1]),
            gyro_z_rate: to_fixed(self.scene.gyro[2]),
            gyro_range: 0,
            sonar_timestamp: 0,
            ground_distance: to_millimeters(self.scene.distance),
        }
    }

    /// Takes the integrals accumulated since the last readout.
    fn take_integral_frame(&mut self) -> IntegralFrame {
        let now = Instant::now();
        let span = now.duration_since(self.last_readout);
        self.last_readout = now;

        let seconds = span.as_secs_f32();
        let frames = (seconds * FRAME_RATE).min(f32::from(u16::MAX)) as u16;
        self.frame_count = self.frame_count.wrapping_add(frames);
        let integral = |rate: f32| to_fixed(rate * seconds);
        IntegralFrame {
            frame_count_since_last_readout: frames,
            pixel_flow_x_integral: integral(self.scene.flow_x),
            pixel_flow_y_integral: integral(self.scene.flow_y),
            gyro_x_rate_integral: integral(self.scene.gyro[0]),
            gyro_y_rate_integral: integral(self.scene.gyro[1]),
            gyro_z_rate_integral: integral(self.scene.gyro[2]),
            integration_timespan: u32::try_from(span.as_micros()).unwrap_or(u32::MAX),
            sonar_timestamp: 0,
            ground_distance: to_millimeters(self.scene.distance),
            gyro_temperature: 2500,
            qual: self.scene.quality,
        }
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        self.reads = self.reads.wrapping_add(1);
        if self.scene.fail_every != 0 && self.reads.is_multiple_of(self.scene.fail_every) {
            return Err(ErrorKind::Bus);
        }
        let mut data = Vec::with_capacity(FRAME_SIZE + px4flow::INTEGRAL_FRAME_SIZE);
        match self.register.take() {
            Some(REG_INTEGRAL_FRAME) => {
                data.extend_from_slice(&self.take_integral_frame().to_bytes());
            }
            Some(REG_FRAME) => {
                data.extend_from_slice(&self.frame().to_bytes());
                data.extend_from_slice(&self.take_integral_frame().to_bytes());
            }
            None => data.extend_from_slice(&self.frame().to_bytes()),
            Some(_) => return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)),
        }
        data.resize(data.len().max(buf.len()), 0);
        buf.copy_from_slice(&data[..buf.len()]);
        Ok(())
    }
}

/// Radians (or rad/s) in the 1e-4 fixed point of the frames.
fn to_fixed(value: f32) -> i16 {
    (value * 10_000.0).clamp(i16::MIN.into(), i16::MAX.into()) as i16
}

fn to_millimeters(meters: f32) -> i16 {
    (meters * 1000.0).clamp(0.0, i16::MAX.into()) as i16
}

impl ErrorType for SimulatedFlow {
    type Error = ErrorKind;
}

impl I2c for SimulatedFlow {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.register = bytes.first().copied(),
                Operation::Read(buf) => self.read_into(buf)?,
            }
        }
        Ok(())
    }
}
