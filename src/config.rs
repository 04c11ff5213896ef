use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid port range {0:?}, expected \"start-end\" with positive port numbers")]
    InvalidPortRange(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Parses `"25565-25590"`. Reversed bounds are normalized, zero or
    /// non-numeric input is rejected.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidPortRange(raw.to_string());

        let (start, end) = raw.split_once('-').ok_or_else(invalid)?;
        let start: u16 = start.trim().parse().map_err(|_| invalid())?;
        let end: u16 = end.trim().parse().map_err(|_| invalid())?;
        if start == 0 || end == 0 {
            return Err(invalid());
        }

        Ok(Self {
            start: start.min(end),
            end: start.max(end),
        })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

/// Loaded once at startup and handed to the gateway explicitly; nothing reads
/// the environment after this.
#[derive(Clone, Debug)]
pub struct Config {
    pub crafty_base_url: String,
    pub crafty_token: String,
    pub port_range: PortRange,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = require("CRAFTY_BASE_URL")?;
        let port_range =
            env::var("CRAFTY_PORT_RANGE").unwrap_or_else(|_| "25565-25590".to_string());

        Ok(Self {
            crafty_base_url: base_url.trim_end_matches('/').to_string(),
            crafty_token: require("CRAFTY_TOKEN")?,
            port_range: PortRange::parse(&port_range)?,
        })
    }
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_range() {
        let range = PortRange::parse("25565-25590").unwrap();
        assert_eq!(range, PortRange { start: 25565, end: 25590 });
        assert!(range.contains(25565));
        assert!(!range.contains(25591));
    }

    #[test]
    fn reversed_bounds_normalize() {
        assert_eq!(
            PortRange::parse("25590-25565").unwrap(),
            PortRange::parse("25565-25590").unwrap()
        );
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert!(matches!(
            PortRange::parse("not-a-range"),
            Err(ConfigError::InvalidPortRange(_))
        ));
        assert!(PortRange::parse("25565").is_err());
        assert!(PortRange::parse("0-25590").is_err());
    }
}
