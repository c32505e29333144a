//! Error types
use serde_json;
use std::{convert::From, error, fmt, io, result};

#[derive(Debug)]
pub enum Error {
    /// Command name not present in the remote's table
    UnknownCommand(String),
    /// The GPIO line could not be claimed or configured
    PinConfiguration { pin: u8, reason: String },
    /// A GPIO write failed part way through a pulse train
    TransmissionIncomplete { pin: u8, symbol: usize },
    InvalidSpeed { value: u32, max: u8 },
    InvalidProfile(String),
    UnknownRemote(String),
    UnknownNode(String),
    InvalidHostCommand(String),
    IO(io::Error),
    Serde(serde_json::Error),
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownCommand(name) => write!(f, "Unknown remote command: {}", name),
            Error::PinConfiguration { pin, reason } => {
                write!(f, "Could not configure GPIO pin {}: {}", pin, reason)
            }
            Error::TransmissionIncomplete { pin, symbol } => write!(
                f,
                "Transmission on GPIO pin {} stopped at symbol {}",
                pin, symbol
            ),
            Error::InvalidSpeed { value, max } => write!(
                f,
                "Invalid speed {}; must be between 0 and {}",
                value, max
            ),
            Error::InvalidProfile(reason) => write!(f, "Invalid remote profile: {}", reason),
            Error::UnknownRemote(name) => write!(f, "Unknown remote: {}", name),
            Error::UnknownNode(address) => write!(f, "No node with address {}", address),
            Error::InvalidHostCommand(line) => write!(f, "Invalid host command: {}", line),
            Error::IO(_) => f.write_str("I/O error"),
            Error::Serde(_) => f.write_str("Could not parse the configuration"),
            Error::Other(err) => f.write_str(err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IO(err) => Some(err),
            Error::Serde(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::IO(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serde(error)
    }
}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Error::Other(error)
    }
}

pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_speed() {
        let err = Error::InvalidSpeed { value: 9, max: 6 };

        assert_eq!("Invalid speed 9; must be between 0 and 6", err.to_string());
    }

    #[test]
    fn io_error_is_source() {
        let err = Error::from(io::Error::new(io::ErrorKind::Other, "boom"));

        assert!(error::Error::source(&err).is_some());
    }
}
