use std::path::PathBuf;

/// Port the audio-control daemon listens on by default.
pub const DAEMON_PORT: u16 = 8823;

/// The daemon only ever binds loopback.
pub const DAEMON_HOST: &str = "127.0.0.1";

/// Host the dial software exposes its plugin websocket on.
pub const HOST_WS_ADDRESS: &str = "127.0.0.1";

pub fn daemon_base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

pub fn host_ws_url(port: u16) -> String {
    format!("ws://{}:{}", HOST_WS_ADDRESS, port)
}

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/dial-mixer/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("dial-mixer")
    }
    #[cfg(windows)]
    {
        // Plugins ship as a folder; prefer a data/ dir beside the executable
        if let Some(dir) = beside_exe("data") {
            return dir;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dial-mixer")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(config) = beside_exe("config.toml") {
            if let Some(parent) = config.parent() {
                return parent.to_path_buf();
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("dial-mixer")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dial-mixer")
    }
}

#[cfg(windows)]
fn beside_exe(name: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(name);
    candidate.exists().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        assert_eq!(
            daemon_base_url(DAEMON_HOST, DAEMON_PORT),
            "http://127.0.0.1:8823"
        );
        assert_eq!(host_ws_url(28196), "ws://127.0.0.1:28196");
    }
}
