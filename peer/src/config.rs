use shared::{DEFAULT_ROOT_NAME, DISCOVERY_TIMEOUT_SECS};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for one peer process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix every player registers under; the id is appended as a suffix.
    pub root_name: String,
    /// Root of the file-backed directory shared by peers on one host.
    pub directory_root: PathBuf,
    /// Address the RPC endpoint binds to. Port 0 picks a free one.
    pub listen_addr: SocketAddr,
    /// Run the connectivity check before joining.
    pub fail_fast: bool,
    pub preflight_target: String,
    pub preflight_timeout: Duration,
    pub discovery_timeout: Duration,
    /// How often a master re-reads the directory. `None` disables polling.
    pub poll_interval: Option<Duration>,
    /// Capacity of the door notification channel.
    pub door_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_name: DEFAULT_ROOT_NAME.to_string(),
            directory_root: std::env::temp_dir().join("volley-directory"),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            fail_fast: false,
            preflight_target: "example.com:80".to_string(),
            preflight_timeout: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(DISCOVERY_TIMEOUT_SECS),
            poll_interval: Some(Duration::from_secs(2)),
            door_buffer: 1,
        }
    }
}

impl Config {
    /// Name pattern matching every registered player.
    pub fn lookup_pattern(&self) -> String {
        format!("{}*", self.root_name)
    }
}
