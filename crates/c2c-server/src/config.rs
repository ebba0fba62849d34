//! Broker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the Unix socket.
    pub socket_path: PathBuf,

    /// How long a new connection may take to send its hello frame.
    pub hello_timeout: Duration,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Whether to remove stale socket on startup.
    pub cleanup_stale_socket: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            hello_timeout: Duration::from_secs(5),
            max_connections: 256,
            cleanup_stale_socket: true,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    pub fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_cleanup_stale_socket(mut self, cleanup: bool) -> Self {
        self.cleanup_stale_socket = cleanup;
        self
    }
}

/// Returns the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/c2c.sock` if available, otherwise
/// `/tmp/c2c-$UID.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("c2c.sock")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/c2c-{}.sock", uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert!(config.socket_path.to_string_lossy().contains("c2c"));
        assert_eq!(config.hello_timeout, Duration::from_secs(5));
        assert_eq!(config.max_connections, 256);
        assert!(config.cleanup_stale_socket);
    }

    #[test]
    fn custom_config() {
        let config = ServerConfig::new("/custom/c2c.sock")
            .with_hello_timeout(Duration::from_millis(250))
            .with_max_connections(8)
            .with_cleanup_stale_socket(false);

        assert_eq!(config.socket_path, PathBuf::from("/custom/c2c.sock"));
        assert_eq!(config.hello_timeout, Duration::from_millis(250));
        assert_eq!(config.max_connections, 8);
        assert!(!config.cleanup_stale_socket);
    }

    #[test]
    fn default_socket_path_format() {
        let path = default_socket_path();
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("c2c"));
        assert!(name.ends_with(".sock"));
    }
}
