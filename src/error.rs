use thiserror::Error;

/// Errors surfaced across the crate boundary. Transient, expected-and-absorbed
/// conditions (malformed datagrams, reassembly gaps, single failed sends) are
/// not represented here; they are handled inline and only observable through
/// `LinkHealth` counters and log events.
#[derive(Debug, Error)]
pub enum GroundStationError {
    #[error("failed to bind {kind} socket on {addr}: {source}")]
    Bind {
        kind: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not discover a local address able to reach {drone_ip}: {source}")]
    LocalAddrDiscovery {
        drone_ip: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid session configuration: {0}")]
    Config(String),

    #[error("rtsp backend error: {0}")]
    Rtsp(String),

    #[error("transport is shutting down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, GroundStationError>;
