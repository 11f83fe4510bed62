use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub requests: RequestsConfig,
    #[serde(default)]
    pub dial: DialConfig,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the audio-control daemon listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_host")]
    pub host: String,
    #[serde(default = "default_daemon_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between periodic `/apps` fetches.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Budget for `/apps` and `/icon` requests.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsConfig {
    /// Budget for fire-and-forget mutations and `/_log` calls.  The request
    /// is aborted when it expires.
    #[serde(default = "default_mutation_timeout_ms")]
    pub mutation_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialConfig {
    /// Volume change per dial tick, as a fraction of full scale.
    #[serde(default = "default_volume_step")]
    pub volume_step: f64,
}

/// Feature switches.  `mute = false` gives the volume-only dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default = "default_true")]
    pub mute: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderConfig {
    /// PNG composited over muted apps.  The built-in overlay is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute_overlay: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Forward WARN/ERROR events to the daemon's `/_log` endpoint.
    #[serde(default = "default_true")]
    pub forward_to_daemon: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_daemon_host(),
            port: default_daemon_port(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            mutation_timeout_ms: default_mutation_timeout_ms(),
        }
    }
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            volume_step: default_volume_step(),
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { mute: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            forward_to_daemon: true,
            filter: default_log_filter(),
        }
    }
}

fn default_daemon_host() -> String {
    platform::DAEMON_HOST.to_string()
}

fn default_daemon_port() -> u16 {
    platform::DAEMON_PORT
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_fetch_timeout_ms() -> u64 {
    1500
}

fn default_mutation_timeout_ms() -> u64 {
    500
}

fn default_volume_step() -> f64 {
    0.03
}

fn default_true() -> bool {
    true
}

fn default_log_filter() -> String {
    "info,dial_plugin=debug,hyper_util=warn,reqwest=warn".to_string()
}

impl DaemonConfig {
    pub fn base_url(&self) -> String {
        platform::daemon_base_url(&self.host, self.port)
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic
        Duration::from_millis(self.interval_ms.max(100))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl RequestsConfig {
    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, writing the defaults there first if it is missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.daemon.port, 8823);
        assert_eq!(config.daemon.host, "127.0.0.1");
        assert_eq!(config.daemon.base_url(), "http://127.0.0.1:8823");
        assert_eq!(config.polling.interval(), Duration::from_secs(2));
        assert_eq!(config.requests.mutation_timeout(), Duration::from_millis(500));
        assert!((config.dial.volume_step - 0.03).abs() < f64::EPSILON);
        assert!(config.capabilities.mute);
        assert!(config.render.mute_overlay.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [daemon]
            port = 9000

            [capabilities]
            mute = false
            "#,
        )
        .unwrap();
        assert_eq!(config.daemon.port, 9000);
        assert_eq!(config.daemon.host, "127.0.0.1");
        assert!(!config.capabilities.mute);
        assert_eq!(config.polling.interval_ms, 2000);
    }

    #[test]
    fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.daemon.port, 8823);

        let mut changed = config.clone();
        changed.dial.volume_step = 0.05;
        changed.save_to(&path).unwrap();
        let reloaded = Config::load_from(&path).unwrap();
        assert!((reloaded.dial.volume_step - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_interval_is_floored() {
        let polling = PollingConfig {
            interval_ms: 0,
            ..PollingConfig::default()
        };
        assert_eq!(polling.interval(), Duration::from_millis(100));
    }
}
