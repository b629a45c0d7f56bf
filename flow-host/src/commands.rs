//! The `start` / `stop` / `status` commands and the instances they manage.

use std::{collections::BTreeMap, fmt::Write, time::Duration};

use px4flow::MeasurementCycle;
use toml::Table;
use tracing::info;

use crate::{
    config::{BusSetting, Settings},
    error::HostError,
    sim::SimulatedFlow,
    telemetry::{Telemetry, TopicSink},
    worker::{self, DriverHandle, HostClock, InstanceStatus},
};

pub const USAGE: &str = "\
usage: flow-host <command> [key=value ...]

commands:
    start     probe and start polling a PX4FLOW, then read commands from stdin
    stop      stop one instance (address=0x..) or all of them
    status    print the state of every running instance
    help      print this message
    quit      stop all instances and exit (stdin only)

keys:
    address=0x42        7-bit address, 0x42..=0x49
    bus_number=1        bus number used in the device id
    bus=sim             transport
    rotation=25         mounting of the sonar, rotation code
    flow_rotation=0     rotation applied to the flow, rotation code
    layout=integral     integral or legacy frame
    interval_us=100000  poll interval, 10000..=1000000
    startup_delay_ms=6000
    log_level=INFO
    sim.distance=1.5    range seen by the simulated sonar, m
";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start(Vec<String>),
    Stop(Vec<String>),
    Status,
    Help,
    Quit,
}

impl Command {
    pub fn parse<S: AsRef<str>>(words: &[S]) -> Result<Self, HostError> {
        let Some((verb, args)) = words.split_first() else {
            return Err(HostError::MissingCommand);
        };
        let args: Vec<String> = args.iter().map(|a| a.as_ref().to_owned()).collect();
        match verb.as_ref() {
            "start" => Ok(Self::Start(args)),
            "stop" => Ok(Self::Stop(args)),
            "status" => without_args(Self::Status, &args),
            "help" => Ok(Self::Help),
            "quit" | "exit" => without_args(Self::Quit, &args),
            other => Err(HostError::UnknownCommand(other.to_owned())),
        }
    }

    /// Configuration overrides carried by the command.
    pub fn overrides(&self) -> &[String] {
        match self {
            Self::Start(args) | Self::Stop(args) => args.as_slice(),
            _ => &[],
        }
    }
}

fn without_args(command: Command, args: &[String]) -> Result<Command, HostError> {
    match args.first() {
        Some(arg) => Err(HostError::InvalidArgument(arg.clone())),
        None => Ok(command),
    }
}

/// Owns the running instances, keyed by address.
pub struct Runner {
    base: Table,
    telemetry: Telemetry,
    instances: BTreeMap<u8, DriverHandle>,
}

impl Runner {
    pub fn new(base: Table, telemetry: Telemetry) -> Self {
        Self {
            base,
            telemetry,
            instances: BTreeMap::new(),
        }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn is_running(&self) -> bool {
        !self.instances.is_empty()
    }

    pub fn execute(&mut self, command: Command) -> Result<Option<String>, HostError> {
        match command {
            Command::Start(args) => self.start(&args).map(|_| None),
            Command::Stop(args) => self.stop(&args).map(|_| None),
            Command::Status => Ok(Some(self.status_report())),
            Command::Help | Command::Quit => Ok(Some(USAGE.to_owned())),
        }
    }

    /// Probes the device and starts polling it. Returns its address.
    pub fn start(&mut self, args: &[String]) -> Result<u8, HostError> {
        let settings = Settings::resolve(&self.base, args)?;
        let config = settings.driver_config()?;
        let address = config.address;
        if self.instances.contains_key(&address) {
            return Err(HostError::AlreadyRunning { address });
        }

        let delay = Duration::from_millis(settings.startup_delay_ms);
        let uptime = worker::uptime();
        if uptime < delay {
            info!("Waiting {:?} for the module to boot", delay - uptime);
            std::thread::sleep(delay - uptime);
        }

        let bus = match settings.bus {
            BusSetting::Sim => SimulatedFlow::new(address, settings.sim.clone()),
        };
        let sink = TopicSink::new(self.telemetry.clone());
        let mut cycle = MeasurementCycle::new(bus, config, settings.bus_number, sink, HostClock)?;
        let first = cycle
            .init()
            .map_err(|error| HostError::StartFailed { address, error })?;
        let handle = worker::spawn(cycle, first)?;
        self.instances.insert(address, handle);
        Ok(address)
    }

    /// Stops the instance at `address=..`, or every instance without arguments.
    pub fn stop(&mut self, args: &[String]) -> Result<(), HostError> {
        if args.is_empty() {
            if !self.is_running() {
                return Err(HostError::NoInstances);
            }
            self.stop_all();
            return Ok(());
        }
        let settings = Settings::resolve(&self.base, args)?;
        let address = settings.address;
        let handle = self
            .instances
            .remove(&address)
            .ok_or(HostError::NotRunning { address })?;
        handle.stop();
        info!("Stopped PX4FLOW at {address:#04x}");
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for (address, handle) in std::mem::take(&mut self.instances) {
            handle.stop();
            info!("Stopped PX4FLOW at {address:#04x}");
        }
    }

    pub fn status(&self) -> Vec<InstanceStatus> {
        self.instances.values().map(DriverHandle::status).collect()
    }

    pub fn status_report(&self) -> String {
        let statuses = self.status();
        if statuses.is_empty() {
            return "not running\n".to_owned();
        }
        let mut out = String::new();
        for status in statuses {
            let _ = format_status(&mut out, &status);
        }
        out
    }
}

fn format_status(out: &mut String, status: &InstanceStatus) -> std::fmt::Result {
    writeln!(
        out,
        "px4flow {:#04x} (device id {:#08x}): {:?}",
        status.address, status.device_id.0, status.state
    )?;
    writeln!(
        out,
        "    poll interval: {}us, samples: {}, comms errors: {}, last collect: {}us",
        status.interval_us,
        status.stats.samples,
        status.stats.comms_errors,
        status.stats.last_collect_us
    )?;
    if let Some(flow) = &status.last_flow {
        writeln!(
            out,
            "    flow: [{:.4}, {:.4}] rad, delta angle: [{:.4}, {:.4}, {:.4}] rad, \
             integration: {}us, quality: {}",
            flow.pixel_flow[0],
            flow.pixel_flow[1],
            flow.delta_angle[0],
            flow.delta_angle[1],
            flow.delta_angle[2],
            flow.integration_timespan_us,
            flow.quality
        )?;
    }
    if let Some(distance) = &status.last_distance {
        writeln!(
            out,
            "    distance: {:.3} m ({:.1}..{:.1} m)",
            distance.current_distance, distance.min_distance, distance.max_distance
        )?;
    }
    Ok(())
}
