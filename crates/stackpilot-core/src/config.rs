use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/stackpilot/stackpilot.toml";
pub const DEFAULT_MARKER_PREFIX: &str = "stackpilot";
pub const DEFAULT_METADATA_DIR: &str = "/var/lib/stackpilot/cron";
pub const DEFAULT_UNIT_PREFIX: &str = "stackpilot-";
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 30_000;
pub const DEFAULT_LOG_WINDOW_LINES: usize = 500;

/// Top-level config (stackpilot.toml + STACKPILOT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackpilotConfig {
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub timers: TimersConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}

/// Live schedule and metadata store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Leading token of every marker comment, e.g. `# stackpilot-job-7`.
    #[serde(default = "default_marker_prefix")]
    pub marker_prefix: String,
    /// Directory holding one `job-<id>.json` record per job.
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: String,
    #[serde(default = "default_crontab_bin")]
    pub crontab_bin: String,
    /// Install into another user's crontab (`crontab -u <user>`).
    #[serde(default)]
    pub crontab_user: Option<String>,
    /// Substrings that identify an unmarked crontab line as ours.
    #[serde(default = "default_app_patterns")]
    pub app_patterns: Vec<String>,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            marker_prefix: default_marker_prefix(),
            metadata_dir: default_metadata_dir(),
            crontab_bin: default_crontab_bin(),
            crontab_user: None,
            app_patterns: default_app_patterns(),
        }
    }
}

/// Service-manager timer discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimersConfig {
    /// Set false on hosts without a service manager.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_unit_prefix")]
    pub unit_prefix: String,
    #[serde(default = "default_systemctl_bin")]
    pub systemctl_bin: String,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unit_prefix: default_unit_prefix(),
            systemctl_bin: default_systemctl_bin(),
        }
    }
}

/// On-demand job execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    #[serde(default = "default_exec_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_EXEC_TIMEOUT_SECS,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            shell: default_shell(),
        }
    }
}

/// Where cron activity is logged and how the daemon is identified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    /// Dedicated cron log; preferred when it exists.
    #[serde(default = "default_cron_log")]
    pub cron_log: String,
    #[serde(default = "default_system_log")]
    pub system_log: String,
    /// Number of trailing log lines scanned per query.
    #[serde(default = "default_window_lines")]
    pub window_lines: usize,
    /// Token a line must contain to count as cron activity.
    #[serde(default = "default_log_marker")]
    pub marker: String,
    /// Unit names tried in order when probing daemon health.
    #[serde(default = "default_daemon_units")]
    pub daemon_units: Vec<String>,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            cron_log: default_cron_log(),
            system_log: default_system_log(),
            window_lines: DEFAULT_LOG_WINDOW_LINES,
            marker: default_log_marker(),
            daemon_units: default_daemon_units(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_marker_prefix() -> String {
    DEFAULT_MARKER_PREFIX.to_string()
}
fn default_metadata_dir() -> String {
    DEFAULT_METADATA_DIR.to_string()
}
fn default_crontab_bin() -> String {
    "crontab".to_string()
}
fn default_app_patterns() -> Vec<String> {
    vec![
        "stackpilot".to_string(),
        "/usr/local/bin/stackpilot".to_string(),
        "certbot renew".to_string(),
    ]
}
fn default_unit_prefix() -> String {
    DEFAULT_UNIT_PREFIX.to_string()
}
fn default_systemctl_bin() -> String {
    "systemctl".to_string()
}
fn default_exec_timeout_secs() -> u64 {
    DEFAULT_EXEC_TIMEOUT_SECS
}
fn default_max_output_chars() -> usize {
    DEFAULT_MAX_OUTPUT_CHARS
}
fn default_shell() -> String {
    "sh".to_string()
}
fn default_cron_log() -> String {
    "/var/log/cron.log".to_string()
}
fn default_system_log() -> String {
    "/var/log/syslog".to_string()
}
fn default_window_lines() -> usize {
    DEFAULT_LOG_WINDOW_LINES
}
fn default_log_marker() -> String {
    "CRON".to_string()
}
fn default_daemon_units() -> Vec<String> {
    vec!["cron".to_string(), "crond".to_string()]
}

impl StackpilotConfig {
    /// Load config from a TOML file with STACKPILOT_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. STACKPILOT_CONFIG env var
    ///   3. /etc/stackpilot/stackpilot.toml
    ///
    /// A missing file yields the defaults. Nested keys in env overrides are
    /// separated by `__` (`STACKPILOT_EXEC__TIMEOUT_SECS=60`).
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("STACKPILOT_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let config: StackpilotConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("STACKPILOT_").split("__"))
            .extract()
            .map_err(|e| crate::error::StackpilotError::Config(e.to_string()))?;

        Ok(config)
    }
}
