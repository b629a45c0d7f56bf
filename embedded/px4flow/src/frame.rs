//! Wire layout of the frames served by the module.
//!
//! All fields are little-endian and packed without padding.

use byteorder::{ByteOrder, LittleEndian};

use crate::register::{REG_FRAME, REG_INTEGRAL_FRAME};
use crate::types::Error;

/// Size of [`Frame`] on the wire.
pub const FRAME_SIZE: usize = 22;
/// Size of [`IntegralFrame`] on the wire.
pub const INTEGRAL_FRAME_SIZE: usize = 25;

/// Instantaneous (non-integral) frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub frame_count: u16,
    pub pixel_flow_x_sum: i16,
    pub pixel_flow_y_sum: i16,
    pub flow_comp_m_x: i16,
    pub flow_comp_m_y: i16,
    pub qual: i16,
    pub gyro_x_rate: i16,
    pub gyro_y_rate: i16,
    pub gyro_z_rate: i16,
    pub gyro_range: u8,
    pub sonar_timestamp: u8,
    pub ground_distance: i16,
}

impl Frame {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        check_len(buf, FRAME_SIZE)?;
        Ok(Self {
            frame_count: LittleEndian::read_u16(&buf[0..2]),
            pixel_flow_x_sum: LittleEndian::read_i16(&buf[2..4]),
            pixel_flow_y_sum: LittleEndian::read_i16(&buf[4..6]),
            flow_comp_m_x: LittleEndian::read_i16(&buf[6..8]),
            flow_comp_m_y: LittleEndian::read_i16(&buf[8..10]),
            qual: LittleEndian::read_i16(&buf[10..12]),
            gyro_x_rate: LittleEndian::read_i16(&buf[12..14]),
            gyro_y_rate: LittleEndian::read_i16(&buf[14..16]),
            gyro_z_rate: LittleEndian::read_i16(&buf[16..18]),
            gyro_range: buf[18],
            sonar_timestamp: buf[19],
            ground_distance: LittleEndian::read_i16(&buf[20..22]),
        })
    }

    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];
        LittleEndian::write_u16(&mut buf[0..2], self.frame_count);
        LittleEndian::write_i16(&mut buf[2..4], self.pixel_flow_x_sum);
        LittleEndian::write_i16(&mut buf[4..6], self.pixel_flow_y_sum);
        LittleEndian::write_i16(&mut buf[6..8], self.flow_comp_m_x);
        LittleEndian::write_i16(&mut buf[8..10], self.flow_comp_m_y);
        LittleEndian::write_i16(&mut buf[10..12], self.qual);
        LittleEndian::write_i16(&mut buf[12..14], self.gyro_x_rate);
        LittleEndian::write_i16(&mut buf[14..16], self.gyro_y_rate);
        LittleEndian::write_i16(&mut buf[16..18], self.gyro_z_rate);
        buf[18] = self.gyro_range;
        buf[19] = self.sonar_timestamp;
        LittleEndian::write_i16(&mut buf[20..22], self.ground_distance);
        buf
    }
}

/// Frame whose flow and gyro values are integrated since the last readout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IntegralFrame {
    pub frame_count_since_last_readout: u16,
    /// Accumulated flow around the x axis, 1e-4 rad
    pub pixel_flow_x_integral: i16,
    /// Accumulated flow around the y axis, 1e-4 rad
    pub pixel_flow_y_integral: i16,
    /// Accumulated gyro rotation, 1e-4 rad
    pub gyro_x_rate_integral: i16,
    pub gyro_y_rate_integral: i16,
    pub gyro_z_rate_integral: i16,
    /// Time span of the integration, us
    pub integration_timespan: u32,
    /// Time since the last sonar update, us
    pub sonar_timestamp: u32,
    /// Ground distance, mm
    pub ground_distance: i16,
    /// Gyro temperature, 1e-2 degC
    pub gyro_temperature: i16,
    /// 0 is bad, 255 is best
    pub qual: u8,
}

impl IntegralFrame {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        check_len(buf, INTEGRAL_FRAME_SIZE)?;
        Ok(Self {
            frame_count_since_last_readout: LittleEndian::read_u16(&buf[0..2]),
            pixel_flow_x_integral: LittleEndian::read_i16(&buf[2..4]),
            pixel_flow_y_integral: LittleEndian::read_i16(&buf[4..6]),
            gyro_x_rate_integral: LittleEndian::read_i16(&buf[6..8]),
            gyro_y_rate_integral: LittleEndian::read_i16(&buf[8..10]),
            gyro_z_rate_integral: LittleEndian::read_i16(&buf[10..12]),
            integration_timespan: LittleEndian::read_u32(&buf[12..16]),
            sonar_timestamp: LittleEndian::read_u32(&buf[16..20]),
            ground_distance: LittleEndian::read_i16(&buf[20..22]),
            gyro_temperature: LittleEndian::read_i16(&buf[22..24]),
            qual: buf[24],
        })
    }

    pub fn to_bytes(&self) -> [u8; INTEGRAL_FRAME_SIZE] {
        let mut buf = [0u8; INTEGRAL_FRAME_SIZE];
        LittleEndian::write_u16(&mut buf[0..2], self.frame_count_since_last_readout);
        LittleEndian::write_i16(&mut buf[2..4], self.pixel_flow_x_integral);
        LittleEndian::write_i16(&mut buf[4..6], self.pixel_flow_y_integral);
        LittleEndian::write_i16(&mut buf[6..8], self.gyro_x_rate_integral);
        LittleEndian::write_i16(&mut buf[8..10], self.gyro_y_rate_integral);
        LittleEndian::write_i16(&mut buf[10..12], self.gyro_z_rate_integral);
        LittleEndian::write_u32(&mut buf[12..16], self.integration_timespan);
        LittleEndian::write_u32(&mut buf[16..20], self.sonar_timestamp);
        LittleEndian::write_i16(&mut buf[20..22], self.ground_distance);
        LittleEndian::write_i16(&mut buf[22..24], self.gyro_temperature);
        buf[24] = self.qual;
        buf
    }
}

/// Which register is polled, and therefore which bytes come back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameLayout {
    /// Register 0x00: a [`Frame`] followed by an [`IntegralFrame`].
    Legacy,
    /// Register 0x16: a lone [`IntegralFrame`].
    Integral,
}

impl FrameLayout {
    pub const fn register(self) -> u8 {
        match self {
            Self::Legacy => REG_FRAME,
            Self::Integral => REG_INTEGRAL_FRAME,
        }
    }

    /// Number of bytes read per collection.
    pub const fn read_len(self) -> usize {
        match self {
            Self::Legacy => FRAME_SIZE + INTEGRAL_FRAME_SIZE,
            Self::Integral => INTEGRAL_FRAME_SIZE,
        }
    }
}

/// Frames contained in one collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RawFrame {
    Legacy { frame: Frame, integral: IntegralFrame },
    Integral(IntegralFrame),
}

impl RawFrame {
    /// Splits `buf` according to `layout`.
    ///
    /// Fails with [`Error::ShortRead`] unless `buf` is exactly `layout.read_len()` bytes.
    pub fn parse(layout: FrameLayout, buf: &[u8]) -> Result<Self, Error> {
        check_len(buf, layout.read_len())?;
        match layout {
            FrameLayout::Legacy => {
                let (frame, integral) = buf.split_at(FRAME_SIZE);
                Ok(Self::Legacy {
                    frame: Frame::from_bytes(frame)?,
                    integral: IntegralFrame::from_bytes(integral)?,
                })
            }
            FrameLayout::Integral => Ok(Self::Integral(IntegralFrame::from_bytes(buf)?)),
        }
    }

    pub fn integral(&self) -> &IntegralFrame {
        match self {
            Self::Legacy { integral, .. } => integral,
            Self::Integral(integral) => integral,
        }
    }

    /// The instantaneous frame, only present in the legacy layout.
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Self::Legacy { frame, .. } => Some(frame),
            Self::Integral(_) => None,
        }
    }
}

/// Integral frame converted to SI units.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecodedMeasurement {
    /// Integrated flow, rad
    pub pixel_flow: [f32; 2],
    /// Integrated gyro rotation, rad
    pub delta_angle: [f32; 3],
    pub integration_timespan_us: u32,
    /// Ground distance, m
    pub ground_distance: f32,
    pub quality: u8,
}

impl From<&IntegralFrame> for DecodedMeasurement {
    fn from(frame: &IntegralFrame) -> Self {
        Self {
            pixel_flow: [
                frame.pixel_flow_x_integral as f32 / 10000.0,
                frame.pixel_flow_y_integral as f32 / 10000.0,
            ],
            delta_angle: [
                frame.gyro_x_rate_integral as f32 / 10000.0,
                frame.gyro_y_rate_integral as f32 / 10000.0,
                frame.gyro_z_rate_integral as f32 / 10000.0,
            ],
            integration_timespan_us: frame.integration_timespan,
            ground_distance: frame.ground_distance as f32 / 1000.0,
            quality: frame.qual,
        }
    }
}

/// Decodes one collection read with `layout`.
pub fn decode(layout: FrameLayout, buf: &[u8]) -> Result<DecodedMeasurement, Error> {
    let raw = RawFrame::parse(layout, buf)?;
    Ok(raw.integral().into())
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), Error> {
    if buf.len() == expected {
        Ok(())
    } else {
        Err(Error::ShortRead {
            expected,
            actual: buf.len(),
        })
    }
}
