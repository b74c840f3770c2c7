//! INI-style config file loader and CLI/file merge.
//!
//! One `key=value` per line; `#` and `;` start a comment; whitespace is
//! trimmed from both sides. Unknown keys are ignored rather than rejected,
//! so older config files keep working against a newer server.

use std::fmt;
use std::path::Path;

pub const DEFAULT_IP: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 7777;
pub const DEFAULT_MAX_CLIENTS: u32 = 128;
pub const DEFAULT_MAX_ROOMS: u32 = 32;
pub const MAX_CLIENTS_CAP: u32 = 128;
pub const MAX_ROOMS_CAP: u32 = 64;

#[derive(Debug, Clone)]
pub struct Config {
    pub ip: String,
    pub port: u16,
    pub max_clients: u32,
    pub max_rooms: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            max_rooms: DEFAULT_MAX_ROOMS,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read config file: {e}"),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value for '{key}': {value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Parses an INI-style file, filling only the keys it recognizes.
    /// Starts from [`Config::default`] and overwrites fields as they're
    /// found, so a file that only sets `port` leaves everything else at
    /// its default.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let mut config = Config::default();

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "ip" => config.ip = value.to_string(),
                "port" => {
                    config.port = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue { key: key.into(), value: value.into() })?
                }
                "max_clients" => {
                    config.max_clients = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue { key: key.into(), value: value.into() })?
                }
                "max_rooms" => {
                    config.max_rooms = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue { key: key.into(), value: value.into() })?
                }
                _ => {} // unknown keys ignored
            }
        }

        config.clamp();
        Ok(config)
    }

    fn clamp(&mut self) {
        self.max_clients = self.max_clients.min(MAX_CLIENTS_CAP);
        self.max_rooms = self.max_rooms.min(MAX_ROOMS_CAP);
    }

    /// Applies CLI overrides on top of whatever the file (or defaults)
    /// produced, then re-clamps.
    pub fn apply_cli(&mut self, args: &crate::cli::Args) {
        if let Some(ip) = &args.ip {
            self.ip = ip.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(max_clients) = args.max_clients {
            self.max_clients = max_clients;
        }
        if let Some(max_rooms) = args.max_rooms {
            self.max_rooms = max_rooms;
        }
        self.clamp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_keys_and_ignores_unknown() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("sedma-test-config-{}.ini", std::process::id()));
        std::fs::write(
            &path,
            "# comment\nip=127.0.0.1\nport=9000\n; another comment\nmax_clients=64\nbogus=1\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.ip, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_clients, 64);
        assert_eq!(config.max_rooms, DEFAULT_MAX_ROOMS);
    }

    #[test]
    fn clamps_caps() {
        let mut config = Config { max_clients: 9999, max_rooms: 9999, ..Config::default() };
        config.clamp();
        assert_eq!(config.max_clients, MAX_CLIENTS_CAP);
        assert_eq!(config.max_rooms, MAX_ROOMS_CAP);
    }
}
