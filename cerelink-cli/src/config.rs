//! Configuration file support for cerelink.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (CERELINK_*)
//! 3. Local config file (./cerelink.toml)
//! 4. Global config file (~/.config/cerelink/config.toml)
//!
//! ```toml
//! [connection]
//! port = "/dev/ttyUSB0"
//! baud = 230400
//!
//! [timing]
//! boot_delay_ms = 5000
//! observation_window_ms = 6000
//!
//! [scale]
//! gain = 12.0
//! ```

use {
    cerelink::{NegotiationTimings, SampleScale},
    directories::ProjectDirs,
    log::{debug, warn},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Local configuration file name.
pub const LOCAL_CONFIG: &str = "cerelink.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Target baud rate.
    pub baud: Option<u32>,
}

/// Negotiation delay overrides, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub boot_delay_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub reopen_pause_ms: Option<u64>,
    pub observation_window_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

/// Sample scaling overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Reference voltage in volts.
    pub vref: Option<f64>,
    /// PGA gain.
    pub gain: Option<f64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "cerelink").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; set fields in `other` win.
    fn merge(&mut self, other: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.connection.port, other.connection.port);
        take(&mut self.connection.baud, other.connection.baud);

        take(&mut self.timing.boot_delay_ms, other.timing.boot_delay_ms);
        take(&mut self.timing.settle_delay_ms, other.timing.settle_delay_ms);
        take(&mut self.timing.reopen_pause_ms, other.timing.reopen_pause_ms);
        take(
            &mut self.timing.observation_window_ms,
            other.timing.observation_window_ms,
        );
        take(&mut self.timing.poll_interval_ms, other.timing.poll_interval_ms);

        take(&mut self.scale.vref, other.scale.vref);
        take(&mut self.scale.gain, other.scale.gain);
    }

    /// Negotiation delays with overrides applied.
    pub fn timings(&self) -> NegotiationTimings {
        let defaults = NegotiationTimings::default();
        let ms = |value: Option<u64>, fallback: Duration| {
            value.map_or(fallback, Duration::from_millis)
        };
        NegotiationTimings {
            boot_delay: ms(self.timing.boot_delay_ms, defaults.boot_delay),
            settle_delay: ms(self.timing.settle_delay_ms, defaults.settle_delay),
            reopen_pause: ms(self.timing.reopen_pause_ms, defaults.reopen_pause),
            observation_window: ms(
                self.timing.observation_window_ms,
                defaults.observation_window,
            ),
            poll_interval: ms(self.timing.poll_interval_ms, defaults.poll_interval),
        }
    }

    /// Sample scale with overrides applied and validated.
    pub fn scale(&self) -> cerelink::Result<SampleScale> {
        let defaults = SampleScale::default();
        SampleScale::new(
            self.scale.vref.unwrap_or(defaults.vref),
            self.scale.gain.unwrap_or(defaults.gain),
        )
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::tempdir};

    #[test]
    fn test_default_config_is_empty() {
        let config = Config::default();
        assert!(config.connection.port.is_none());
        assert!(config.connection.baud.is_none());
        assert_eq!(config.timings(), NegotiationTimings::default());
        assert_eq!(config.scale().unwrap(), SampleScale::default());
    }

    #[test]
    fn test_parse_all_sections() {
        let content = r#"
[connection]
port = "/dev/ttyUSB1"
baud = 230400

[timing]
boot_delay_ms = 100
observation_window_ms = 6000

[scale]
vref = 2.4
gain = 12.0
"#;
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.connection.baud, Some(230_400));

        let timings = config.timings();
        assert_eq!(timings.boot_delay, Duration::from_millis(100));
        assert_eq!(timings.observation_window, Duration::from_secs(6));
        assert_eq!(timings.settle_delay, Duration::from_secs(2));

        let scale = config
            .scale()
            .unwrap();
        assert!((scale.vref - 2.4).abs() < f64::EPSILON);
        assert!((scale.gain - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_sections_parse() {
        let config: Config = toml::from_str("[scale]\ngain = 6.0\n").unwrap();
        assert!(config.connection.port.is_none());
        assert_eq!(config.scale.gain, Some(6.0));
        assert!(config.scale.vref.is_none());
    }

    #[test]
    fn test_merge_prefers_set_fields() {
        let mut base = Config::default();
        base.connection.port = Some("/dev/ttyUSB0".to_string());
        base.connection.baud = Some(115_200);
        base.timing.boot_delay_ms = Some(5000);

        let mut other = Config::default();
        other.connection.baud = Some(921_600);
        other.timing.settle_delay_ms = Some(500);

        base.merge(other);
        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.connection.baud, Some(921_600));
        assert_eq!(base.timing.boot_delay_ms, Some(5000));
        assert_eq!(base.timing.settle_delay_ms, Some(500));
    }

    #[test]
    fn test_invalid_scale_is_rejected() {
        let mut config = Config::default();
        config.scale.gain = Some(0.0);
        assert!(config.scale().is_err());
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempdir().unwrap();
        let path = dir
            .path()
            .join("cerelink.toml");
        fs::write(&path, "[connection]\nport = \"COM7\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.port.as_deref(), Some("COM7"));
    }

    #[test]
    fn test_load_from_path_invalid_toml_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir
            .path()
            .join("broken.toml");
        fs::write(&path, "[connection\nport = ").unwrap();

        assert_eq!(Config::load_from_path(&path), Config::default());
    }

    #[test]
    fn test_load_from_missing_path_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_global_config_path_ends_with_config_toml() {
        if let Some(path) = Config::global_config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
