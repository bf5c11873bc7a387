//! Configuration for the selection watchers.
//!
//! Layers, lowest first: built-in defaults, a YAML file, `SELSYNC_*`
//! environment variables. The result is validated before use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::resolve::DepthExtractor;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_DEPTH_PATTERN: &str = r"z:(\d+)";

const ENV_POLL_INTERVAL_MS: &str = "SELSYNC_POLL_INTERVAL_MS";
const ENV_DEPTH_PATTERN: &str = "SELSYNC_DEPTH_PATTERN";
const ENV_FAULT_POLICY: &str = "SELSYNC_FAULT_POLICY";
const ENV_LOG_LEVEL: &str = "SELSYNC_LOG_LEVEL";
const ENV_LOG_FORMAT: &str = "SELSYNC_LOG_FORMAT";

/// What happens to the other watcher when one faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Only the faulted watcher ends; the lifecycle stays running.
    #[default]
    Isolate,
    /// A fault stops both watchers.
    StopAll,
}

impl FaultPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Isolate => "isolate",
            Self::StopAll => "stop-all",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "isolate" => Some(Self::Isolate),
            "stop-all" | "stop_all" => Some(Self::StopAll),
            _ => None,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub depth_pattern: String,
    pub fault_policy: FaultPolicy,
    pub logging: LoggingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            depth_pattern: DEFAULT_DEPTH_PATTERN.to_string(),
            fault_policy: FaultPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "console".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    poll_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fault_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logging: Option<FileLogging>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct FileLogging {
    level: Option<String>,
    format: Option<String>,
}

impl SyncConfig {
    /// Load from `path`, or from the first config file found in the search
    /// paths, then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`SyncConfig::load`] with an explicit environment lookup.
    pub fn load_with_env(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        let found = match path {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };
        if let Some(path) = found {
            cfg.merge_file(&path)?;
        }
        cfg.apply_env_overrides(lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Merge settings from a YAML file over the current values.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.merge_yaml(&raw, &path.display().to_string())
    }

    fn merge_yaml(&mut self, raw: &str, origin: &str) -> Result<(), ConfigError> {
        // An empty document deserializes to unit, not to a mapping.
        if raw.trim().is_empty() {
            return Ok(());
        }
        let file: FileConfig = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        self.merge(file)
    }

    fn merge(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(pattern) = file.depth_pattern {
            self.depth_pattern = pattern;
        }
        if let Some(policy) = file.fault_policy {
            self.fault_policy = parse_fault_policy(&policy)?;
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
        Ok(())
    }

    /// Apply `SELSYNC_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let ms = raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{ENV_POLL_INTERVAL_MS} must be an integer, got {raw:?}"
                ))
            })?;
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(pattern) = lookup(ENV_DEPTH_PATTERN) {
            self.depth_pattern = pattern;
        }
        if let Some(policy) = lookup(ENV_FAULT_POLICY) {
            self.fault_policy = parse_fault_policy(&policy)?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = format;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(ConfigError::Invalid(format!(
                "poll_interval must be at least {}ms",
                MIN_POLL_INTERVAL.as_millis()
            )));
        }
        DepthExtractor::new(&self.depth_pattern)?;
        match self.logging.level.to_lowercase().trim() {
            "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "logging.level must be one of debug, info, warn, error".into(),
                ))
            }
        }
        match self.logging.format.to_lowercase().trim() {
            "console" | "json" => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "logging.format must be one of console, json".into(),
                ))
            }
        }
        Ok(())
    }

    /// YAML rendering of the effective configuration, in the config file
    /// format.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        let poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX);
        let file = FileConfig {
            poll_interval_ms: Some(poll_interval_ms),
            depth_pattern: Some(self.depth_pattern.clone()),
            fault_policy: Some(self.fault_policy.as_str().to_string()),
            logging: Some(FileLogging {
                level: Some(self.logging.level.clone()),
                format: Some(self.logging.format.clone()),
            }),
        };
        serde_yaml::to_string(&file).map_err(ConfigError::Render)
    }
}

fn parse_fault_policy(raw: &str) -> Result<FaultPolicy, ConfigError> {
    FaultPolicy::parse(raw).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "fault_policy must be one of isolate, stop-all, got {raw:?}"
        ))
    })
}

/// Search for `config.yaml` in the standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    config_search_paths()
        .into_iter()
        .map(|dir| dir.join("config.yaml"))
        .find(|candidate| candidate.is_file())
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(Path::new(&xdg).join("selsync"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config/selsync"));
    }
    paths.push(PathBuf::from("."));
    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_validate() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_millis(200));
        assert_eq!(cfg.depth_pattern, r"z:(\d+)");
        assert_eq!(cfg.fault_policy, FaultPolicy::Isolate);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "poll_interval_ms: 50\nfault_policy: stop-all\nlogging:\n  format: json"
        )
        .unwrap();

        let mut cfg = SyncConfig::default();
        cfg.merge_file(file.path()).unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_millis(50));
        assert_eq!(cfg.fault_policy, FaultPolicy::StopAll);
        assert_eq!(cfg.logging.format, "json");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn empty_file_keeps_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut cfg = SyncConfig::default();
        cfg.merge_file(file.path()).unwrap();
        assert_eq!(cfg, SyncConfig::default());
    }

    #[test]
    fn unknown_file_key_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval: 50").unwrap();
        let err = SyncConfig::default().merge_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got {err:?}");
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut cfg = SyncConfig::default();
        cfg.apply_env_overrides(env(&[
            ("SELSYNC_POLL_INTERVAL_MS", "75"),
            ("SELSYNC_FAULT_POLICY", "STOP_ALL"),
            ("SELSYNC_LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_millis(75));
        assert_eq!(cfg.fault_policy, FaultPolicy::StopAll);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn env_rejects_non_numeric_interval() {
        let err = SyncConfig::default()
            .apply_env_overrides(env(&[("SELSYNC_POLL_INTERVAL_MS", "fast")]))
            .unwrap_err();
        assert!(err.to_string().contains("SELSYNC_POLL_INTERVAL_MS"));
    }

    #[test]
    fn validate_rejects_short_interval() {
        let cfg = SyncConfig {
            poll_interval: Duration::from_millis(1),
            ..SyncConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_depth_pattern() {
        let cfg = SyncConfig {
            depth_pattern: "z:(".into(),
            ..SyncConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DepthPattern { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let mut cfg = SyncConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn yaml_rendering_round_trips_through_merge() {
        let cfg = SyncConfig {
            poll_interval: Duration::from_millis(120),
            depth_pattern: r"slice=(\d+)".into(),
            fault_policy: FaultPolicy::StopAll,
            logging: LoggingConfig {
                level: "warn".into(),
                format: "json".into(),
            },
        };
        let mut parsed = SyncConfig::default();
        parsed.merge_yaml(&cfg.to_yaml().unwrap(), "inline").unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn yaml_rendering_keeps_line_breaks_in_pattern() {
        let mut cfg = SyncConfig::default();
        cfg.apply_env_overrides(env(&[("SELSYNC_DEPTH_PATTERN", "z:(\\d+)\n")]))
            .unwrap();
        cfg.validate().unwrap();

        let mut parsed = SyncConfig::default();
        parsed.merge_yaml(&cfg.to_yaml().unwrap(), "inline").unwrap();
        assert_eq!(parsed.depth_pattern, "z:(\\d+)\n");
        assert_eq!(parsed, cfg);
    }
}
