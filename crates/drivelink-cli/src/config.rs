//! Configuration – reads/writes `~/.drivelink/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use drivelink_runtime::ControlLoopConfig;
use drivelink_types::DriveError;

/// Persisted operator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket URL of the remote predictor.  When absent and override is
    /// enabled, an in-process simulated predictor is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictor_url: Option<String>,

    /// Hand control authority to the predictor.
    #[serde(default)]
    pub override_enabled: bool,

    /// Flag observations as supervised by a human.
    #[serde(default)]
    pub supervision_enabled: bool,

    /// Bound on each prediction wait, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub prediction_timeout_ms: u64,

    #[serde(default = "default_tick_hz")]
    pub tick_rate_hz: f64,

    /// Sensor snapshots older than this are sent as absent.
    #[serde(default = "default_max_frame_age_ms")]
    pub max_frame_age_ms: u64,

    #[serde(default = "default_silence_limit_ms")]
    pub predictor_silence_limit_ms: u64,

    /// Directory for JSONL session recordings; recording is off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_dir: Option<PathBuf>,
}

fn default_timeout_ms() -> u64 {
    20
}
fn default_tick_hz() -> f64 {
    30.0
}
fn default_max_frame_age_ms() -> u64 {
    200
}
fn default_silence_limit_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            predictor_url: None,
            override_enabled: false,
            supervision_enabled: false,
            prediction_timeout_ms: default_timeout_ms(),
            tick_rate_hz: default_tick_hz(),
            max_frame_age_ms: default_max_frame_age_ms(),
            predictor_silence_limit_ms: default_silence_limit_ms(),
            recording_dir: None,
        }
    }
}

impl Config {
    pub fn loop_config(&self) -> ControlLoopConfig {
        ControlLoopConfig {
            override_enabled: self.override_enabled,
            supervision_enabled: self.supervision_enabled,
            prediction_timeout: Duration::from_millis(self.prediction_timeout_ms),
            tick_rate_hz: self.tick_rate_hz,
            max_frame_age: Duration::from_millis(self.max_frame_age_ms),
            predictor_silence_limit: Duration::from_millis(self.predictor_silence_limit_ms),
        }
    }
}

/// Return the path to `~/.drivelink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".drivelink").join("config.toml")
}

/// Load the config file (if any) and apply environment overrides.
///
/// Returns the config and whether a file was found.
pub fn load() -> Result<(Config, bool), DriveError> {
    let found = load_from(&config_path())?;
    let exists = found.is_some();
    let mut cfg = found.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok((cfg, exists))
}

/// Load the config from a specific path.  `Ok(None)` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, DriveError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| DriveError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| DriveError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `DRIVELINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `DRIVELINK_PREDICTOR_URL` | `predictor_url` |
/// | `DRIVELINK_OVERRIDE` | `override_enabled` |
/// | `DRIVELINK_SUPERVISION` | `supervision_enabled` |
/// | `DRIVELINK_TIMEOUT_MS` | `prediction_timeout_ms` |
/// | `DRIVELINK_TICK_HZ` | `tick_rate_hz` |
/// | `DRIVELINK_RECORDING_DIR` | `recording_dir` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("DRIVELINK_PREDICTOR_URL") {
        cfg.predictor_url = (!v.trim().is_empty()).then_some(v);
    }
    if let Ok(v) = std::env::var("DRIVELINK_OVERRIDE")
        && let Some(on) = parse_flag(&v)
    {
        cfg.override_enabled = on;
    }
    if let Ok(v) = std::env::var("DRIVELINK_SUPERVISION")
        && let Some(on) = parse_flag(&v)
    {
        cfg.supervision_enabled = on;
    }
    if let Ok(v) = std::env::var("DRIVELINK_TIMEOUT_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.prediction_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("DRIVELINK_TICK_HZ")
        && let Ok(hz) = v.trim().parse::<f64>()
    {
        cfg.tick_rate_hz = hz;
    }
    if let Ok(v) = std::env::var("DRIVELINK_RECORDING_DIR") {
        cfg.recording_dir = (!v.trim().is_empty()).then(|| PathBuf::from(v));
    }
}

/// Save the config to disk, creating `~/.drivelink/` if necessary.
pub fn save(cfg: &Config) -> Result<(), DriveError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), DriveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| DriveError::Config(format!("failed to create {}: {e}", parent.display())))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| DriveError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| DriveError::Config(format!("failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            predictor_url: Some("ws://10.0.0.5:8765".into()),
            override_enabled: true,
            recording_dir: Some(dir.path().join("sessions")),
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "override_enabled = true\n").unwrap();

        let loaded = load_from(&path).unwrap().unwrap();
        assert!(loaded.override_enabled);
        assert_eq!(loaded.prediction_timeout_ms, 20);
        assert_eq!(loaded.tick_rate_hz, 30.0);
        assert!(loaded.predictor_url.is_none());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tick_rate_hz = \"fast\"\n").unwrap();
        assert!(matches!(load_from(&path), Err(DriveError::Config(_))));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_drivelink_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".drivelink"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn loop_config_converts_units() {
        let cfg = Config {
            prediction_timeout_ms: 15,
            predictor_silence_limit_ms: 500,
            ..Config::default()
        };
        let lc = cfg.loop_config();
        assert_eq!(lc.prediction_timeout, Duration::from_millis(15));
        assert_eq!(lc.predictor_silence_limit, Duration::from_millis(500));
        assert_eq!(lc.tick_rate_hz, 30.0);
    }

    #[test]
    fn flag_parsing() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn apply_env_overrides_changes_predictor_url() {
        // SAFETY: each env test touches a distinct variable.
        unsafe { std::env::set_var("DRIVELINK_PREDICTOR_URL", "ws://robot-host:8765") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.predictor_url.as_deref(), Some("ws://robot-host:8765"));
        unsafe { std::env::remove_var("DRIVELINK_PREDICTOR_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_override_flag() {
        // SAFETY: each env test touches a distinct variable.
        unsafe { std::env::set_var("DRIVELINK_OVERRIDE", "yes") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(cfg.override_enabled);
        unsafe { std::env::remove_var("DRIVELINK_OVERRIDE") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_timeout() {
        // SAFETY: each env test touches a distinct variable.
        unsafe { std::env::set_var("DRIVELINK_TIMEOUT_MS", "soon") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.prediction_timeout_ms, 20);
        unsafe { std::env::remove_var("DRIVELINK_TIMEOUT_MS") };
    }

    #[test]
    fn apply_env_overrides_changes_recording_dir() {
        // SAFETY: each env test touches a distinct variable.
        unsafe { std::env::set_var("DRIVELINK_RECORDING_DIR", "/tmp/sessions") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.recording_dir, Some(PathBuf::from("/tmp/sessions")));
        unsafe { std::env::remove_var("DRIVELINK_RECORDING_DIR") };
    }
}
