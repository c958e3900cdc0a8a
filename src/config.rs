use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The configuration used for running the server.
///
/// The serial line settings themselves (115200 8N1) are fixed; what varies
/// per deployment is which device node carries them, which ports to listen
/// on, and which pins are wired to the board's buttons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the serial device node, e.g. `/dev/ttyUSB0`.
    pub serial_path: String,

    /// The TCP port tunneling raw bytes to and from the serial line.
    pub bridge_port: u16,

    /// The port serving the HTTP control endpoints.
    pub http_port: u16,

    /// GPIO pin wired to the board's reset line.
    pub reset_pin: u32,

    /// GPIO pin wired to the board's shutdown/wake line.
    pub shutdown_pin: u32,

    /// Address the watchdog probes for route presence,
    /// e.g. `8.8.8.8:53`. No packets are sent to it.
    pub probe_address: SocketAddr,

    /// If set, debug logs are additionally written to daily-rolling
    /// files in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_path: "/dev/ttyUSB0".into(),
            bridge_port: 8001,
            http_port: 8080,
            reset_pin: 12,
            shutdown_pin: 14,
            probe_address: "8.8.8.8:53".parse().expect("Valid address literal"),
            log_dir: None,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    /// Panics if the input is not valid .ron.
    pub fn deserialize(input: &str) -> Self {
        Self::ron().from_str::<Config>(input).unwrap()
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            serial_path: "/dev/ttyUSB0".into(),
            log_dir: Some("/var/log/serial-tether".into()),
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .unwrap()
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Self {
        let s = std::fs::read_to_string(p).unwrap();

        Self::deserialize(&s)
    }

    fn check_distinct_pins(&self) -> Result<(), Error> {
        if self.reset_pin == self.shutdown_pin {
            return Err(Error::BadConfig(format!(
                "The reset and shutdown pins are both {}. Pulsing one role must not pulse the other, so they need distinct pins.",
                self.reset_pin
            )));
        }

        Ok(())
    }

    fn check_distinct_ports(&self) -> Result<(), Error> {
        if self.bridge_port == self.http_port {
            return Err(Error::BadConfig(format!(
                "The bridge and HTTP servers both want port {}. They need distinct ports.",
                self.bridge_port
            )));
        }

        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        self.check_distinct_pins()?;
        self.check_distinct_ports()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize() {
        let c = Config::example();

        println!("{}", c.serialize_pretty());
    }

    #[test]
    fn deserialize() {
        let input = r#"
(
    serial_path: "/dev/ttyACM0",
    bridge_port: 8001,
    http_port: 8080,
    reset_pin: 5,
    shutdown_pin: 4,
    probe_address: "1.1.1.1:53",
    log_dir: "/tmp/tether-logs",
)
"#;
        let config = Config::deserialize(input);

        assert_eq!(config.serial_path, "/dev/ttyACM0");
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/tether-logs")));
    }

    #[test]
    fn deserialize_without_log_dir() {
        let input = r#"
(
    serial_path: "/dev/ttyACM0",
    bridge_port: 8001,
    http_port: 8080,
    reset_pin: 5,
    shutdown_pin: 4,
    probe_address: "1.1.1.1:53",
    log_dir: None,
)
"#;
        let config = Config::deserialize(input);

        assert!(config.log_dir.is_none());
    }

    #[test]
    fn bad_config_shared_pin() {
        let c = Config {
            reset_pin: 7,
            shutdown_pin: 7,
            ..Default::default()
        };

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();

        // Let's do some assertions that enforce our error messages to at least be decent.
        assert!(err.contains('7'));
    }

    #[test]
    fn bad_config_shared_port() {
        let c = Config {
            bridge_port: 9000,
            http_port: 9000,
            ..Default::default()
        };

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();

        assert!(err.contains("9000"));
    }

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }
}
