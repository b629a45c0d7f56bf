//! Host side runner for the `px4flow` driver.
//!
//! Each started device gets a [`worker`] thread that drives its
//! measurement cycle and publishes into the shared [`telemetry`] topics.

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod sim;
pub mod telemetry;
pub mod worker;

pub use error::HostError;
