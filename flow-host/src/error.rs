#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Invalid command line argument: {0}")]
    InvalidArgument(String),
    #[error("No command provided")]
    MissingCommand,
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Failed to deserialize configuration")]
    Config(#[from] toml::de::Error),
    #[error("Invalid driver configuration")]
    Driver(#[from] px4flow::Error),
    #[error("PX4FLOW at {address:#04x} is already running")]
    AlreadyRunning { address: u8 },
    #[error("PX4FLOW at {address:#04x} is not running")]
    NotRunning { address: u8 },
    #[error("not running")]
    NoInstances,
    #[error("Failed to start PX4FLOW at {address:#04x}: {error}")]
    StartFailed { address: u8, error: px4flow::Error },
    #[error("Failed to spawn driver thread")]
    Spawn(#[from] std::io::Error),
}
