use clap::ArgMatches;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity, StopBits};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::modbus::client::DEFAULT_INTER_FRAME_DELAY;
use crate::modbus::transport::SerialSettings;
use crate::utils::error::ModbusError;

/// Timeout used when the configured one is zero or negative.
pub const FALLBACK_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub port_name: String,
    pub slave_id: u8,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: ParityConfig,
    pub stop_bits: StopBitsConfig,

    // Timing
    pub timeout_ms: i64,
    pub inter_frame_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBitsConfig {
    One,
    Two,
}

impl ParityConfig {
    pub fn to_serial(self) -> Parity {
        match self {
            ParityConfig::None => Parity::None,
            ParityConfig::Even => Parity::Even,
            ParityConfig::Odd => Parity::Odd,
        }
    }
}

impl FromStr for ParityConfig {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(ParityConfig::None),
            "even" | "e" => Ok(ParityConfig::Even),
            "odd" | "o" => Ok(ParityConfig::Odd),
            other => Err(ModbusError::ConfigError(format!("unknown parity '{}'", other))),
        }
    }
}

impl StopBitsConfig {
    pub fn to_serial(self) -> StopBits {
        match self {
            StopBitsConfig::One => StopBits::One,
            StopBitsConfig::Two => StopBits::Two,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port_name: "/dev/ttyUSB0".to_string(),
            slave_id: 1,
            baud_rate: 9600,
            data_bits: 8,
            parity: ParityConfig::None,
            stop_bits: StopBitsConfig::One,
            timeout_ms: 3000,
            inter_frame_delay_ms: DEFAULT_INTER_FRAME_DELAY.as_millis() as u64,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overrides settings with the command line options that were given.
    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<(), ModbusError> {
        if let Some(port) = matches.get_one::<String>("port") {
            self.port_name = port.clone();
        }
        if let Some(baud) = matches.get_one::<u32>("baud") {
            self.baud_rate = *baud;
        }
        if let Some(slave) = matches.get_one::<u8>("slave") {
            self.slave_id = *slave;
        }
        if let Some(timeout) = matches.get_one::<i64>("timeout") {
            self.timeout_ms = *timeout;
        }
        if let Some(parity) = matches.get_one::<String>("parity") {
            self.parity = parity.parse()?;
        }
        Ok(())
    }

    /// Response timeout; zero or negative falls back to one second.
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout_ms <= 0 {
            warn!(
                "⚠️ timeout_ms = {} is not usable, using {} ms",
                self.timeout_ms, FALLBACK_TIMEOUT_MS
            );
            Duration::from_millis(FALLBACK_TIMEOUT_MS)
        } else {
            Duration::from_millis(self.timeout_ms as u64)
        }
    }

    pub fn inter_frame_delay(&self) -> Duration {
        Duration::from_millis(self.inter_frame_delay_ms)
    }

    pub fn serial_settings(&self) -> Result<SerialSettings, ModbusError> {
        let data_bits = match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                return Err(ModbusError::ConfigError(format!(
                    "data_bits must be 5..=8, got {}",
                    other
                )))
            }
        };

        Ok(SerialSettings {
            port_name: self.port_name.clone(),
            baud_rate: self.baud_rate,
            data_bits,
            parity: self.parity.to_serial(),
            stop_bits: self.stop_bits.to_serial(),
            timeout: self.effective_timeout(),
        })
    }

    pub fn log_summary(&self) {
        info!(
            "📋 Port {} @ {} baud, {}{}{}, slave {}, timeout {} ms",
            self.port_name,
            self.baud_rate,
            self.data_bits,
            match self.parity {
                ParityConfig::None => 'N',
                ParityConfig::Even => 'E',
                ParityConfig::Odd => 'O',
            },
            match self.stop_bits {
                StopBitsConfig::One => 1,
                StopBitsConfig::Two => 2,
            },
            self.slave_id,
            self.effective_timeout().as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{value_parser, Arg, Command};
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.slave_id, 1);
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.effective_timeout(), Duration::from_millis(3000));
        assert_eq!(config.inter_frame_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_timeout_clamp() {
        for timeout_ms in [0, -5] {
            let config = Config {
                timeout_ms,
                ..Config::default()
            };
            assert_eq!(config.effective_timeout(), Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("modbus.toml");

        let config = Config {
            port_name: "COM3".to_string(),
            slave_id: 17,
            parity: ParityConfig::Even,
            stop_bits: StopBitsConfig::Two,
            ..Config::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "port_name = \"/dev/ttyS1\"\nbaud_rate = 19200\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.port_name, "/dev/ttyS1");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.slave_id, 1);
    }

    #[test]
    fn test_bad_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "baud_rate = \"fast\"").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ModbusError::ConfigError(_))));
        assert!(Config::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_serial_settings() {
        let settings = Config::default().serial_settings().unwrap();
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(settings.parity, Parity::None);

        let config = Config {
            data_bits: 9,
            ..Config::default()
        };
        assert!(matches!(config.serial_settings(), Err(ModbusError::ConfigError(_))));
    }

    #[test]
    fn test_apply_matches() {
        let cmd = Command::new("test")
            .arg(Arg::new("port").long("port"))
            .arg(Arg::new("baud").long("baud").value_parser(value_parser!(u32)))
            .arg(Arg::new("slave").long("slave").value_parser(value_parser!(u8)))
            .arg(Arg::new("timeout").long("timeout").value_parser(value_parser!(i64)))
            .arg(Arg::new("parity").long("parity"));
        let matches = cmd
            .try_get_matches_from(["test", "--port", "COM7", "--slave", "4", "--parity", "odd"])
            .unwrap();

        let mut config = Config::default();
        config.apply_matches(&matches).unwrap();
        assert_eq!(config.port_name, "COM7");
        assert_eq!(config.slave_id, 4);
        assert_eq!(config.parity, ParityConfig::Odd);
        assert_eq!(config.baud_rate, 9600);
    }
}
