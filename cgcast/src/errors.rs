use thiserror::Error;

/// Errors raised while discovering or talking to a cast device.
#[derive(Error, Debug)]
pub enum CastError {
    #[error("Cannot connect to {host}:{port}: {message}")]
    Connection {
        host: String,
        port: u16,
        message: String,
    },
    #[error("Cast protocol error during {operation}: {message}")]
    Protocol {
        operation: &'static str,
        message: String,
    },
    #[error("No application is running on the device")]
    NoApplication,
    #[error("No media session is available")]
    NoMediaSession,
    #[error("mDNS discovery failed: {0}")]
    Discovery(String),
    #[error("Invalid Chromecast location: {0}")]
    InvalidLocation(String),
    #[error("Session state lock poisoned")]
    Lock,
}

impl CastError {
    pub fn connection(host: &str, port: u16, err: impl std::fmt::Display) -> Self {
        CastError::Connection {
            host: host.to_string(),
            port,
            message: err.to_string(),
        }
    }

    pub fn protocol(operation: &'static str, err: impl std::fmt::Display) -> Self {
        CastError::Protocol {
            operation,
            message: err.to_string(),
        }
    }

    /// True for failures that say nothing about the link itself.
    pub fn is_benign(&self) -> bool {
        matches!(self, CastError::NoApplication | CastError::NoMediaSession)
    }
}

pub type CastResult<T> = Result<T, CastError>;
