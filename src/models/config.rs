use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime options for the daemon, loaded from `autoprint.yaml` and
/// `AUTOPRINT_*` environment variables.
///
/// These differ from [`Settings`](crate::models::Settings): settings are
/// user preferences that change while the daemon runs, runtime options are
/// fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding `Settings.yaml` and `History.yaml`
    pub data_dir: String,

    /// Directory for rotating log files
    pub log_dir: String,

    pub debug: bool,

    /// Shell command used to print a file; `{path}` is replaced with the quoted file path
    pub print_command: String,

    /// Shell command that shows a file to the user when printing falls back
    /// to manual; `{path}` is replaced like in `print_command`
    pub viewer_command: Option<String>,

    /// Optional program invoked for desktop alerts (see `CommandNotifier`)
    pub notify_command: Option<String>,

    pub ready_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub dispose_delay_ms: u64,
    pub print_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: "AutoPrint Data".to_string(),
            log_dir: "logs".to_string(),
            debug: false,
            print_command: default_print_command(),
            viewer_command: Some(default_viewer_command()),
            notify_command: None,
            ready_timeout_ms: 3000,
            settle_delay_ms: 500,
            dispose_delay_ms: 5000,
            print_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn dispose_delay(&self) -> Duration {
        Duration::from_millis(self.dispose_delay_ms)
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_secs(self.print_timeout_secs)
    }
}

fn default_print_command() -> String {
    if cfg!(target_os = "windows") {
        "powershell -NoProfile -Command Start-Process -FilePath {path} -Verb Print".to_string()
    } else {
        "lp {path}".to_string()
    }
}

fn default_viewer_command() -> String {
    if cfg!(target_os = "windows") {
        "start \"\" {path}".to_string()
    } else if cfg!(target_os = "macos") {
        "open {path}".to_string()
    } else {
        "xdg-open {path}".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.data_dir, "AutoPrint Data");
        assert_eq!(config.ready_timeout(), Duration::from_secs(3));
        assert_eq!(config.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.dispose_delay(), Duration::from_secs(5));
        assert!(config.print_command.contains("{path}"));
        assert!(config.notify_command.is_none());
        assert!(config.viewer_command.as_deref().unwrap().contains("{path}"));
    }
}
