//! The measure / collect state machine.
//!
//! The cycle owns no timer. Every call to [`MeasurementCycle::run`] performs
//! one pass and returns the [`Schedule`] the host has to honor before the next
//! call. The host must never run two passes of one device concurrently.

use embedded_hal::i2c::I2c;
use log::{debug, info};

use crate::frame::{self, FRAME_SIZE, INTEGRAL_FRAME_SIZE};
use crate::register::PROBE_LEN;
use crate::reports::{self, DeviceId, DistanceReport, OpticalFlowReport};
use crate::types::{Clock, DriverConfig, Error};

/// Destination of the decoded reports.
///
/// Publishing is fire-and-forget: a sink that cannot deliver a report drops it.
pub trait TelemetrySink {
    fn publish_flow(&mut self, report: &OpticalFlowReport);

    fn publish_distance(&mut self, report: &DistanceReport);

    /// Instance index of this device's distance publication, if it could be
    /// advertised. Only instance 0 emits distance reports.
    fn distance_instance(&mut self) -> Option<u8>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleState {
    /// Not started yet.
    Idle,
    /// Waiting for the next scheduled pass.
    MeasurePending,
    /// A collection failed. Left by [`MeasurementCycle::start`] within the same pass.
    FaultedRestart,
}

/// When the host should run the next pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Schedule {
    Now,
    /// After the given number of microseconds.
    After(u32),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleStats {
    /// Successfully published samples.
    pub samples: u32,
    /// Failed command writes and failed collections.
    pub comms_errors: u32,
    pub last_sample_us: Option<u64>,
    /// Duration of the last successful collection.
    pub last_collect_us: u32,
}

/// Polls one PX4FLOW and publishes what it measures.
pub struct MeasurementCycle<I2C, S, C> {
    i2c: I2C,
    sink: S,
    clock: C,
    config: DriverConfig,
    device_id: DeviceId,
    state: CycleState,
    stats: CycleStats,
    restarted: bool,
}

impl<I2C, S, C> MeasurementCycle<I2C, S, C>
where
    I2C: I2c,
    S: TelemetrySink,
    C: Clock,
{
    /// Create a new instance for the device on bus number `bus`.
    pub fn new(i2c: I2C, config: DriverConfig, bus: u8, sink: S, clock: C) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            i2c,
            sink,
            clock,
            device_id: DeviceId::px4flow(bus, config.address),
            config,
            state: CycleState::Idle,
            stats: CycleStats::default(),
            restarted: false,
        })
    }

    /// Destroy the driver and return the bus, the sink and the clock
    pub fn destroy(self) -> (I2C, S, C) {
        (self.i2c, self.sink, self.clock)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    /// Checks that the device at the configured address is a PX4FLOW.
    ///
    /// A LIDAR-Lite may sit on the same address; it NACKs a plain read of
    /// [`PROBE_LEN`] bytes where the PX4FLOW answers. On success a first
    /// measurement is started.
    pub fn probe(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; PROBE_LEN];
        self.i2c
            .read(self.config.address, &mut buf)
            .map_err(|_| Error::ProbeFailed)?;
        self.measure().map_err(|_| Error::ProbeFailed)
    }

    /// Probes the device and starts the state machine.
    pub fn init(&mut self) -> Result<Schedule, Error> {
        self.probe()?;
        info!(
            "PX4FLOW found at {:#04x}, polling every {}us",
            self.config.address, self.config.interval_us
        );
        Ok(self.start())
    }

    /// Resets the state machine from any state. The next pass is due immediately.
    ///
    /// Called on init and after every failed collection.
    pub fn start(&mut self) -> Schedule {
        self.state = CycleState::MeasurePending;
        Schedule::Now
    }

    /// Runs one pass: command, collect, publish.
    pub fn run(&mut self) -> Schedule {
        if core::mem::take(&mut self.restarted) {
            debug!("{:#04x}: restarting measurement", self.config.address);
        }

        // a lost command is not fatal, the module keeps serving the last register
        if let Err(e) = self.measure() {
            debug!("{:#04x}: measure error: {e}", self.config.address);
        }

        if let Err(e) = self.collect() {
            debug!("{:#04x}: collection error: {e}", self.config.address);
            self.stats.comms_errors = self.stats.comms_errors.wrapping_add(1);
            self.state = CycleState::FaultedRestart;
            self.restarted = true;
            return self.start();
        }

        self.state = CycleState::MeasurePending;
        Schedule::After(self.config.interval_us)
    }

    /// Selects the frame register, which also starts a new measurement.
    fn measure(&mut self) -> Result<(), Error> {
        let cmd = [self.config.layout.register()];
        self.i2c.write(self.config.address, &cmd).map_err(|_| {
            self.stats.comms_errors = self.stats.comms_errors.wrapping_add(1);
            Error::I2cWriteError
        })
    }

    fn collect(&mut self) -> Result<(), Error> {
        let start = self.clock.now_us();
        let mut buf = [0u8; FRAME_SIZE + INTEGRAL_FRAME_SIZE];
        let buf = &mut buf[..self.config.layout.read_len()];
        self.i2c
            .read(self.config.address, buf)
            .map_err(|_| Error::I2cReadError)?;

        let decoded = frame::decode(self.config.layout, buf)?;
        let is_primary_instance = self.sink.distance_instance() == Some(0);
        let (flow, distance) = reports::assemble(
            &decoded,
            &self.config,
            self.device_id,
            is_primary_instance,
            &self.clock,
        );

        self.sink.publish_flow(&flow);
        if let Some(distance) = distance {
            self.sink.publish_distance(&distance);
        }

        let end = self.clock.now_us();
        self.stats.samples = self.stats.samples.wrapping_add(1);
        self.stats.last_sample_us = Some(flow.timestamp_sample_us);
        self.stats.last_collect_us = end.saturating_sub(start) as u32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    use super::*;
    use crate::frame::{Frame, FrameLayout, IntegralFrame};
    use crate::rotation::Rotation;

    const ADDR: u8 = 0x42;

    #[derive(Default)]
    struct RecordingSink {
        instance: Option<u8>,
        flow: Vec<OpticalFlowReport>,
        distance: Vec<DistanceReport>,
    }

    impl TelemetrySink for RecordingSink {
        fn publish_flow(&mut self, report: &OpticalFlowReport) {
            self.flow.push(*report);
        }

        fn publish_distance(&mut self, report: &DistanceReport) {
            self.distance.push(*report);
        }

        fn distance_instance(&mut self) -> Option<u8> {
            self.instance
        }
    }

    fn primary() -> RecordingSink {
        RecordingSink {
            instance: Some(0),
            ..Default::default()
        }
    }

    fn clock() -> impl Clock {
        || 42u64
    }

    fn integral() -> IntegralFrame {
        IntegralFrame {
            pixel_flow_x_integral: 5000,
            integration_timespan: 10_000,
            ground_distance: 1500,
            qual: 200,
            ..Default::default()
        }
    }

    fn command() -> I2cTransaction {
        I2cTransaction::write(ADDR, vec![0x16])
    }

    fn frame_read() -> I2cTransaction {
        I2cTransaction::read(ADDR, integral().to_bytes().to_vec())
    }

    fn cycle(
        expectations: &[I2cTransaction],
        config: DriverConfig,
        sink: RecordingSink,
    ) -> MeasurementCycle<I2cMock, RecordingSink, impl Clock> {
        MeasurementCycle::new(I2cMock::new(expectations), config, 1, sink, clock()).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = DriverConfig {
            address: 0x10,
            ..Default::default()
        };
        let mut i2c = I2cMock::new(&[]);
        let result = MeasurementCycle::new(i2c.clone(), config, 1, primary(), clock());
        assert!(matches!(result, Err(Error::InvalidAddress(0x10))));
        i2c.done();
    }

    #[test]
    fn probe_and_first_cycle() {
        let expectations = [
            I2cTransaction::read(ADDR, vec![0; 22]),
            command(),
            command(),
            frame_read(),
        ];
        let mut cycle = cycle(&expectations, DriverConfig::default(), primary());
        assert_eq!(cycle.state(), CycleState::Idle);
        assert_eq!(cycle.init(), Ok(Schedule::Now));
        assert_eq!(cycle.state(), CycleState::MeasurePending);
        assert_eq!(cycle.run(), Schedule::After(100_000));

        let stats = cycle.stats();
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.comms_errors, 0);
        assert_eq!(stats.last_sample_us, Some(42));

        let (mut i2c, sink, _) = cycle.destroy();
        i2c.done();
        assert_eq!(sink.flow.len(), 1);
        assert_eq!(sink.flow[0].pixel_flow, [0.5, 0.0]);
        assert_eq!(sink.flow[0].integration_timespan_us, 10_000);
        assert_eq!(sink.flow[0].quality, 200);
        assert!(sink.flow[0].delta_angle_available);
        assert_eq!(sink.distance.len(), 1);
        assert_eq!(sink.distance[0].current_distance, 1.5);
    }

    #[test]
    fn probe_rejects_nacking_device() {
        let expectations = [I2cTransaction::read(ADDR, vec![0; 22]).with_error(ErrorKind::Other)];
        let mut cycle = cycle(&expectations, DriverConfig::default(), primary());
        assert_eq!(cycle.init(), Err(Error::ProbeFailed));
        assert_eq!(cycle.state(), CycleState::Idle);
        cycle.destroy().0.done();
    }

    #[test]
    fn probe_fails_when_command_is_rejected() {
        let expectations = [
            I2cTransaction::read(ADDR, vec![0; 22]),
            command().with_error(ErrorKind::Other),
        ];
        let mut cycle = cycle(&expectations, DriverConfig::default(), primary());
        assert_eq!(cycle.probe(), Err(Error::ProbeFailed));
        cycle.destroy().0.done();
    }

    #[test]
    fn read_failure_restarts_with_a_new_command() {
        let expectations = [
            command(),
            I2cTransaction::read(ADDR, vec![0; 25]).with_error(ErrorKind::Other),
            command(),
            frame_read(),
        ];
        let mut cycle = cycle(&expectations, DriverConfig::default(), primary());
        cycle.start();

        assert_eq!(cycle.run(), Schedule::Now);
        assert_eq!(cycle.state(), CycleState::MeasurePending);
        assert_eq!(cycle.stats().comms_errors, 1);
        assert_eq!(cycle.stats().samples, 0);

        assert_eq!(cycle.run(), Schedule::After(100_000));
        assert_eq!(cycle.state(), CycleState::MeasurePending);
        assert_eq!(cycle.stats().samples, 1);

        let (mut i2c, sink, _) = cycle.destroy();
        i2c.done();
        assert_eq!(sink.flow.len(), 1);
    }

    #[test]
    fn failed_command_still_collects() {
        let expectations = [command().with_error(ErrorKind::Other), frame_read()];
        let mut cycle = cycle(&expectations, DriverConfig::default(), primary());
        cycle.start();

        assert_eq!(cycle.run(), Schedule::After(100_000));
        assert_eq!(cycle.stats().comms_errors, 1);
        assert_eq!(cycle.stats().samples, 1);

        let (mut i2c, sink, _) = cycle.destroy();
        i2c.done();
        assert_eq!(sink.flow.len(), 1);
    }

    #[test]
    fn never_gives_up() {
        let mut expectations = Vec::new();
        for _ in 0..10 {
            expectations.push(command().with_error(ErrorKind::Other));
            expectations.push(I2cTransaction::read(ADDR, vec![0; 25]).with_error(ErrorKind::Other));
        }
        expectations.push(command());
        expectations.push(frame_read());

        let mut cycle = cycle(&expectations, DriverConfig::default(), primary());
        cycle.start();
        for _ in 0..10 {
            assert_eq!(cycle.run(), Schedule::Now);
        }
        assert_eq!(cycle.run(), Schedule::After(100_000));
        assert_eq!(cycle.stats().comms_errors, 20);
        cycle.destroy().0.done();
    }

    #[test]
    fn secondary_instance_only_publishes_flow() {
        let sinks = [
            RecordingSink {
                instance: Some(1),
                ..Default::default()
            },
            RecordingSink::default(),
        ];
        for sink in sinks {
            let mut cycle = cycle(&[command(), frame_read()], DriverConfig::default(), sink);
            assert_eq!(cycle.run(), Schedule::After(100_000));
            let (mut i2c, sink, _) = cycle.destroy();
            i2c.done();
            assert_eq!(sink.flow.len(), 1);
            assert!(sink.distance.is_empty());
        }
    }

    #[test]
    fn legacy_layout_reads_both_frames() {
        let mut bytes = Frame::default().to_bytes().to_vec();
        bytes.extend_from_slice(&integral().to_bytes());
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x00]),
            I2cTransaction::read(ADDR, bytes),
        ];
        let config = DriverConfig {
            layout: FrameLayout::Legacy,
            interval_us: 20_000,
            ..Default::default()
        };
        let mut cycle = cycle(&expectations, config, primary());
        assert_eq!(cycle.run(), Schedule::After(20_000));
        let (mut i2c, sink, _) = cycle.destroy();
        i2c.done();
        assert_eq!(sink.flow[0].pixel_flow, [0.5, 0.0]);
        assert_eq!(sink.distance[0].current_distance, 1.5);
    }

    #[test]
    fn rotation_is_applied_before_publishing() {
        let frame = IntegralFrame {
            gyro_x_rate_integral: 100,
            gyro_y_rate_integral: 200,
            gyro_z_rate_integral: 300,
            ..integral()
        };
        let expectations = [command(), I2cTransaction::read(ADDR, frame.to_bytes().to_vec())];
        let config = DriverConfig {
            flow_rotation: Rotation::Yaw180,
            ..Default::default()
        };
        let mut cycle = cycle(&expectations, config, primary());
        cycle.run();
        let (mut i2c, sink, _) = cycle.destroy();
        i2c.done();
        assert_eq!(sink.flow[0].pixel_flow, [-0.5, -0.0]);
        assert_eq!(sink.flow[0].delta_angle, [-0.01, -0.02, 0.03]);
    }

    #[test]
    fn start_resets_state_after_fault() {
        let expectations = [
            command(),
            I2cTransaction::read(ADDR, vec![0; 25]).with_error(ErrorKind::Other),
        ];
        let mut cycle = cycle(&expectations, DriverConfig::default(), primary());
        assert_eq!(cycle.start(), Schedule::Now);
        assert_eq!(cycle.run(), Schedule::Now);
        assert_eq!(cycle.state(), CycleState::MeasurePending);

        assert_eq!(cycle.start(), Schedule::Now);
        assert_eq!(cycle.state(), CycleState::MeasurePending);
        assert_eq!(cycle.stats().comms_errors, 1);
        cycle.destroy().0.done();
    }
}
