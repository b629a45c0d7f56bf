//! Host configuration.
//!
//! Values are looked up in the `[px4flow]` table of `app-config.toml`, then
//! overridden by `key=value` arguments. Top level values of the file apply
//! when the table does not set them.

use std::path::Path;

use anyhow::Context;
use px4flow::{Calibration, DriverConfig, FrameLayout, Rotation};
use serde::Deserialize;
use toml::{Table, Value};
use tracing::Level;

use crate::error::HostError;

pub const CONFIG_FILE: &str = "app-config.toml";
const SECTION: &str = "px4flow";

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(alias = "error")]
    ERROR,
    #[serde(alias = "warn")]
    WARN,
    #[serde(alias = "info")]
    INFO,
    #[serde(alias = "debug")]
    DEBUG,
    #[serde(alias = "trace")]
    TRACE,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::ERROR => Level::ERROR,
            LogLevel::WARN => Level::WARN,
            LogLevel::INFO => Level::INFO,
            LogLevel::DEBUG => Level::DEBUG,
            LogLevel::TRACE => Level::TRACE,
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LayoutSetting {
    Integral,
    Legacy,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BusSetting {
    Sim,
}

/// What the simulated module sees.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SimSettings {
    /// Optical flow around the sensor x axis, rad/s
    pub flow_x: f32,
    /// Optical flow around the sensor y axis, rad/s
    pub flow_y: f32,
    /// Body rates, rad/s
    pub gyro: [f32; 3],
    /// Sonar range, m
    pub distance: f32,
    pub quality: u8,
    /// Fail every n-th read. 0 never fails.
    pub fail_every: u32,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            flow_x: 0.2,
            flow_y: -0.1,
            gyro: [0.0, 0.0, 0.05],
            distance: 1.5,
            quality: 255,
            fail_every: 0,
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub bus: BusSetting,
    pub bus_number: u8,
    pub address: u8,
    /// Mounting of the sonar, rotation code
    pub rotation: u8,
    /// Rotation applied to the flow vectors, rotation code
    pub flow_rotation: u8,
    pub layout: LayoutSetting,
    pub interval_us: u32,
    /// Time the module needs after power-up, measured from process start
    pub startup_delay_ms: u64,
    pub log_level: LogLevel,
    pub sim: SimSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bus: BusSetting::Sim,
            bus_number: 1,
            address: px4flow::ADDRESS_DEFAULT,
            rotation: Rotation::DOWNWARD_FACING.into(),
            flow_rotation: Rotation::None.into(),
            layout: LayoutSetting::Integral,
            interval_us: px4flow::CONVERSION_INTERVAL_DEFAULT,
            startup_delay_ms: 6000,
            log_level: LogLevel::INFO,
            sim: SimSettings::default(),
        }
    }
}

impl Settings {
    /// Applies `key=value` overrides on top of `base` and deserializes the result.
    ///
    /// Dotted keys (`sim.distance=2.0`) reach into sub tables.
    pub fn resolve<S: AsRef<str>>(base: &Table, args: &[S]) -> Result<Self, HostError> {
        let mut table = base.clone();
        for arg in args {
            let arg = arg.as_ref();
            let Some((key, value)) = arg.split_once('=') else {
                return Err(HostError::InvalidArgument(arg.to_owned()));
            };
            if key.is_empty() {
                return Err(HostError::InvalidArgument(arg.to_owned()));
            }
            insert_dotted(&mut table, key, inline_parse(value))
                .ok_or_else(|| HostError::InvalidArgument(arg.to_owned()))?;
        }
        Ok(table.try_into()?)
    }

    pub fn driver_config(&self) -> Result<DriverConfig, px4flow::Error> {
        let config = DriverConfig {
            address: self.address,
            flow_rotation: rotation(self.flow_rotation)?,
            mounting_rotation: rotation(self.rotation)?,
            layout: match self.layout {
                LayoutSetting::Integral => FrameLayout::Integral,
                LayoutSetting::Legacy => FrameLayout::Legacy,
            },
            interval_us: self.interval_us,
            calibration: Calibration::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

fn rotation(code: u8) -> Result<Rotation, px4flow::Error> {
    Rotation::try_from(code).map_err(|_| px4flow::Error::InvalidRotation(code))
}

/// Reads the `[px4flow]` table of `path`. A missing file is an empty table.
pub fn load_file(path: impl AsRef<Path>) -> anyhow::Result<Table> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Table::new());
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Reading {}", path.display()))?;
    let file: Table =
        toml::from_str(&data).with_context(|| format!("Parsing {}", path.display()))?;
    Ok(select_section(file))
}

fn select_section(file: Table) -> Table {
    let mut section = None;
    let mut common_values = vec![];
    for (k, v) in file {
        match v {
            Value::Table(v) if k == SECTION => section = Some(v),
            Value::Table(_) => {}
            v => common_values.push((k, v)),
        }
    }
    let mut section = section.unwrap_or_default();
    for (k, v) in common_values {
        if !section.contains_key(&k) {
            section.insert(k, v);
        }
    }
    section
}

/// Integer (decimal or `0x` hex), float, bool, or else a string.
pub fn inline_parse(string: &str) -> Value {
    if let Some(hex) = string
        .strip_prefix("0x")
        .or_else(|| string.strip_prefix("0X"))
    {
        if let Ok(n) = i64::from_str_radix(hex, 16) {
            return Value::Integer(n);
        }
    }
    if let Ok(n) = string.parse() {
        return Value::Integer(n);
    }
    if let Ok(n) = string.parse() {
        return Value::Float(n);
    }
    if let Ok(b) = string.parse() {
        return Value::Boolean(b);
    }
    Value::String(string.to_owned())
}

fn insert_dotted(table: &mut Table, key: &str, value: Value) -> Option<()> {
    match key.split_once('.') {
        None => {
            table.insert(key.to_owned(), value);
            Some(())
        }
        Some((head, rest)) => {
            let entry = table
                .entry(head.to_owned())
                .or_insert(Value::Table(Table::new()));
            insert_dotted(entry.as_table_mut()?, rest, value)
        }
    }
}
