//! One scheduler thread per device.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, LazyLock,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use embedded_hal::i2c::I2c;
use parking_lot::Mutex;
use px4flow::{
    Clock, CycleState, CycleStats, DeviceId, DistanceReport, MeasurementCycle, OpticalFlowReport,
    Schedule,
};
use tracing::{error, info};

use crate::telemetry::TopicSink;

static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Time since the process started.
pub fn uptime() -> Duration {
    EPOCH.elapsed()
}

/// Microseconds since the process started.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostClock;

impl Clock for HostClock {
    fn now_us(&self) -> u64 {
        u64::try_from(uptime().as_micros()).unwrap_or(u64::MAX)
    }
}

#[derive(Clone, Debug)]
pub struct InstanceStatus {
    pub address: u8,
    pub device_id: DeviceId,
    pub interval_us: u32,
    pub state: CycleState,
    pub stats: CycleStats,
    pub last_flow: Option<OpticalFlowReport>,
    pub last_distance: Option<DistanceReport>,
}

impl InstanceStatus {
    fn of<I2C: I2c>(cycle: &MeasurementCycle<I2C, TopicSink, HostClock>) -> Self {
        Self {
            address: cycle.config().address,
            device_id: cycle.device_id(),
            interval_us: cycle.config().interval_us,
            state: cycle.state(),
            stats: cycle.stats(),
            last_flow: cycle.sink().last_flow().copied(),
            last_distance: cycle.sink().last_distance().copied(),
        }
    }
}

/// A running device. Dropping the handle stops its thread.
pub struct DriverHandle {
    stop: Arc<AtomicBool>,
    status: Arc<Mutex<InstanceStatus>>,
    thread: Option<JoinHandle<()>>,
}

/// Runs `cycle` on its own thread, starting with `first`.
pub fn spawn<I2C>(
    mut cycle: MeasurementCycle<I2C, TopicSink, HostClock>,
    first: Schedule,
) -> std::io::Result<DriverHandle>
where
    I2C: I2c + Send + 'static,
{
    let address = cycle.config().address;
    let stop = Arc::new(AtomicBool::new(false));
    let status = Arc::new(Mutex::new(InstanceStatus::of(&cycle)));

    let thread = std::thread::Builder::new()
        .name(format!("px4flow-{address:#04x}"))
        .spawn({
            let stop = stop.clone();
            let status = status.clone();
            move || {
                let mut schedule = first;
                loop {
                    if let Schedule::After(us) = schedule {
                        spin_sleep::sleep(Duration::from_micros(us.into()));
                    }
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    schedule = cycle.run();
                    *status.lock() = InstanceStatus::of(&cycle);
                }
                info!("Stopped after {} samples", cycle.stats().samples);
            }
        })?;

    Ok(DriverHandle {
        stop,
        status,
        thread: Some(thread),
    })
}

impl DriverHandle {
    pub fn status(&self) -> InstanceStatus {
        self.status.lock().clone()
    }

    /// Stops the thread and waits for it to finish its current pass.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Driver thread panicked");
            }
        }
    }
}
