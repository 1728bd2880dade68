use grainfield_core::ProtocolError;

/// Error types for the connection hub
#[derive(thiserror::Error, Debug)]
pub enum HubError {
    #[error("A recorder is already connected")]
    RecorderBusy,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid listen address '{host}:{port}'")]
    InvalidAddress { host: String, port: u16 },
}
