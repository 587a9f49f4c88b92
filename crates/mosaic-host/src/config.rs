use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub bind: SocketAddr,
    /// Directory for the catalogue database and deployed widget artifacts.
    pub data_dir: PathBuf,
    /// Timeout for remote template/package downloads.
    pub fetch_timeout: Duration,
    /// Maximum accepted request body size in bytes.
    pub max_body: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: ([127, 0, 0, 1], 7600).into(),
            data_dir: PathBuf::from("./mosaic"),
            fetch_timeout: Duration::from_secs(30),
            max_body: 50 * 1024 * 1024, // 50MB
        }
    }
}
