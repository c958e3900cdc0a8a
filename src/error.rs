use std::net::SocketAddr;

use thiserror::Error;

/// Errors that may occur in this library.
///
/// These are all fatal at startup; once the server is running, I/O
/// trouble is handled (or deliberately ignored) at the point it happens.
#[derive(Debug, Error)]
pub enum Error {
    /// The serial port could not be opened with the required settings.
    #[error("Could not open serial port `{path}`")]
    SerialOpen {
        /// The device path which was attempted.
        path: String,

        /// The underlying serial port problem.
        #[source]
        source: tokio_serial::Error,
    },

    /// The bridge's TCP listener could not bind.
    #[error("Could not bind TCP listener on `{addr}`")]
    Bind {
        /// The address which was attempted.
        addr: SocketAddr,

        /// The underlying I/O problem.
        #[source]
        source: std::io::Error,
    },

    /// A GPIO pin could not be set up or driven.
    #[error("Could not set up GPIO pin {pin}")]
    Gpio {
        /// The pin number.
        pin: u32,

        /// The underlying I/O problem.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file does not describe a runnable setup.
    #[error("Bad configuration: {0}")]
    BadConfig(String),
}

impl Error {
    /// If this is a [`Error::BadConfig`], get the message.
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(message) = self {
            Ok(message)
        } else {
            Err(self)
        }
    }
}
