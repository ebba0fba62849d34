//! Broker address resolution.
//!
//! The broker is located by, in order: the `--path` flag, the `C2C_PATH`
//! environment variable (both handled by clap), then the default socket
//! path shared with the server. Addresses may be bare paths or
//! `unix://` URLs.

use std::path::PathBuf;

/// Environment variable naming the broker address.
pub const PATH_ENV: &str = "C2C_PATH";

const UNIX_SCHEME: &str = "unix://";

/// Client-side settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Path of the broker's Unix socket.
    pub socket_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: c2c_server::default_socket_path(),
        }
    }
}

impl ClientConfig {
    /// Builds the config from an optional address, falling back to the
    /// default socket path.
    pub fn from_address(address: Option<&str>) -> Self {
        match address.map(str::trim).filter(|a| !a.is_empty()) {
            Some(address) => Self {
                socket_path: parse_address(address),
            },
            None => Self::default(),
        }
    }
}

/// Turns an address (`/run/c2c.sock` or `unix:///run/c2c.sock`) into a
/// socket path.
pub fn parse_address(address: &str) -> PathBuf {
    PathBuf::from(address.strip_prefix(UNIX_SCHEME).unwrap_or(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_path() {
        assert_eq!(parse_address("/tmp/c2c.sock"), PathBuf::from("/tmp/c2c.sock"));
    }

    #[test]
    fn unix_url() {
        assert_eq!(
            parse_address("unix:///run/user/1000/c2c.sock"),
            PathBuf::from("/run/user/1000/c2c.sock")
        );
    }

    #[test]
    fn missing_or_blank_address_uses_default() {
        let default = ClientConfig::default();
        assert_eq!(ClientConfig::from_address(None), default);
        assert_eq!(ClientConfig::from_address(Some("  ")), default);
    }

    #[test]
    fn explicit_address() {
        let config = ClientConfig::from_address(Some("unix:///tmp/other.sock"));
        assert_eq!(config.socket_path, PathBuf::from("/tmp/other.sock"));
    }
}
