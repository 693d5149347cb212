//! Daemon configuration: defaults, an optional TOML file and `ROLLCALL_*` overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rollcall_core::RecognizerConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::engine::LoopTiming;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "system" => Ok(Self::System),
            other => Err(format!("unknown bus {other:?}")),
        }
    }
}

/// Daemon configuration: defaults, then an optional TOML file, then
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Frames discarded right after the camera is acquired.
    pub warmup_frames: usize,
    /// Fixed JPEG quality of sampled frames (1-100).
    pub jpeg_quality: u8,
    /// Base URL of the recognition service.
    pub service_url: String,
    pub recognize_path: String,
    pub request_timeout_secs: u64,
    pub tick_interval_ms: u64,
    pub cooldown_ms: u64,
    /// How long a `Recognized` status stays up before reverting to `Scanning`.
    pub display_ms: u64,
    /// Start the detection loop as soon as the daemon is up.
    pub autostart: bool,
    pub bus: BusKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            frame_width: 640,
            frame_height: 480,
            warmup_frames: 4,
            jpeg_quality: rollcall_hw::sampler::DEFAULT_JPEG_QUALITY,
            service_url: "http://127.0.0.1:5000".to_string(),
            recognize_path: "/api/mark_attendance".to_string(),
            request_timeout_secs: 10,
            tick_interval_ms: 2_000,
            cooldown_ms: 30_000,
            display_ms: 5_000,
            autostart: false,
            bus: BusKind::Session,
        }
    }
}

/// On-disk shape of `rollcall.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    camera_device: Option<String>,
    frame_width: Option<u32>,
    frame_height: Option<u32>,
    warmup_frames: Option<usize>,
    jpeg_quality: Option<u8>,
    service_url: Option<String>,
    recognize_path: Option<String>,
    request_timeout_secs: Option<u64>,
    tick_interval_ms: Option<u64>,
    cooldown_ms: Option<u64>,
    display_ms: Option<u64>,
    autostart: Option<bool>,
    bus: Option<BusKind>,
}

impl Config {
    /// Load configuration from the config file (if any) and `ROLLCALL_*`
    /// environment variables, then validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = config_file_path() {
            tracing::info!(path = %path.display(), "loading config file");
            config.apply_file(&path)?;
        }
        config.apply_vars(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml_str(source: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::default();
        config.merge(file);
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        *self = Self::from_toml_str(&source, path)?;
        Ok(())
    }

    fn merge(&mut self, file: FileConfig) {
        overlay(&mut self.camera_device, file.camera_device);
        overlay(&mut self.frame_width, file.frame_width);
        overlay(&mut self.frame_height, file.frame_height);
        overlay(&mut self.warmup_frames, file.warmup_frames);
        overlay(&mut self.jpeg_quality, file.jpeg_quality);
        overlay(&mut self.service_url, file.service_url);
        overlay(&mut self.recognize_path, file.recognize_path);
        overlay(&mut self.request_timeout_secs, file.request_timeout_secs);
        overlay(&mut self.tick_interval_ms, file.tick_interval_ms);
        overlay(&mut self.cooldown_ms, file.cooldown_ms);
        overlay(&mut self.display_ms, file.display_ms);
        overlay(&mut self.autostart, file.autostart);
        overlay(&mut self.bus, file.bus);
    }

    /// Overlay `ROLLCALL_*` variables obtained through `lookup`.
    /// Unparseable values are logged and ignored.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("ROLLCALL_SERVICE_URL") {
            self.service_url = v;
        }
        if let Some(v) = lookup("ROLLCALL_RECOGNIZE_PATH") {
            self.recognize_path = v;
        }
        parse_var(&lookup, "ROLLCALL_FRAME_WIDTH", &mut self.frame_width);
        parse_var(&lookup, "ROLLCALL_FRAME_HEIGHT", &mut self.frame_height);
        parse_var(&lookup, "ROLLCALL_WARMUP_FRAMES", &mut self.warmup_frames);
        parse_var(&lookup, "ROLLCALL_JPEG_QUALITY", &mut self.jpeg_quality);
        parse_var(&lookup, "ROLLCALL_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
        parse_var(&lookup, "ROLLCALL_TICK_INTERVAL_MS", &mut self.tick_interval_ms);
        parse_var(&lookup, "ROLLCALL_COOLDOWN_MS", &mut self.cooldown_ms);
        parse_var(&lookup, "ROLLCALL_DISPLAY_MS", &mut self.display_ms);
        parse_var(&lookup, "ROLLCALL_BUS", &mut self.bus);
        if let Some(v) = lookup("ROLLCALL_AUTOSTART") {
            self.autostart = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !(1..=100).contains(&self.jpeg_quality) {
            return invalid("jpeg_quality must be between 1 and 100");
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return invalid("frame_width and frame_height must be non-zero");
        }
        if self.tick_interval_ms == 0 || self.cooldown_ms == 0 || self.display_ms == 0 {
            return invalid("tick_interval_ms, cooldown_ms and display_ms must be non-zero");
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be non-zero");
        }
        if !(self.service_url.starts_with("http://") || self.service_url.starts_with("https://")) {
            return invalid("service_url must start with http:// or https://");
        }
        Ok(())
    }

    pub fn recognizer_config(&self) -> RecognizerConfig {
        RecognizerConfig {
            base_url: self.service_url.clone(),
            path: self.recognize_path.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn loop_timing(&self) -> LoopTiming {
        LoopTiming {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            display_window: Duration::from_millis(self.display_ms),
        }
    }

    pub fn cooldown_window(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// `ROLLCALL_CONFIG`, else `$XDG_CONFIG_HOME/rollcall/rollcall.toml` if present.
fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ROLLCALL_CONFIG") {
        return Some(PathBuf::from(path));
    }

    let config_dir = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
        .ok()?;
    let path = config_dir.join("rollcall").join("rollcall.toml");
    path.exists().then_some(path)
}

fn overlay<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable config value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.tick_interval_ms, 2_000);
        assert_eq!(config.cooldown_ms, 30_000);
        assert_eq!(config.display_ms, 5_000);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = Config::from_toml_str(
            r#"
            camera_device = "/dev/video4"
            tick_interval_ms = 1500
            bus = "system"
            autostart = true
            "#,
            Path::new("rollcall.toml"),
        )
        .unwrap();

        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.tick_interval_ms, 1_500);
        assert_eq!(config.bus, BusKind::System);
        assert!(config.autostart);
        assert_eq!(config.cooldown_ms, 30_000);
    }

    #[test]
    fn test_toml_rejects_unknown_keys() {
        let err = Config::from_toml_str("tick = 5", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides_and_bad_values_ignored() {
        let mut config = Config::default();
        config.apply_vars(vars(&[
            ("ROLLCALL_SERVICE_URL", "https://attend.local"),
            ("ROLLCALL_COOLDOWN_MS", "60000"),
            ("ROLLCALL_TICK_INTERVAL_MS", "soon"),
            ("ROLLCALL_AUTOSTART", "1"),
            ("ROLLCALL_BUS", "System"),
        ]));

        assert_eq!(config.service_url, "https://attend.local");
        assert_eq!(config.cooldown_ms, 60_000);
        assert_eq!(config.tick_interval_ms, 2_000);
        assert!(config.autostart);
        assert_eq!(config.bus, BusKind::System);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: [fn(&mut Config); 4] = [
            |c| c.jpeg_quality = 0,
            |c| c.tick_interval_ms = 0,
            |c| c.frame_height = 0,
            |c| c.service_url = "ftp://x".into(),
        ];
        for mutate in cases {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_derived_settings() {
        let config = Config::default();
        assert_eq!(
            config.recognizer_config().endpoint(),
            "http://127.0.0.1:5000/api/mark_attendance"
        );
        assert_eq!(config.loop_timing().tick_interval, Duration::from_secs(2));
        assert_eq!(config.cooldown_window(), Duration::from_secs(30));
    }
}
