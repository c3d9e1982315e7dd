use crate::snapshot::Channel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAX_WINDOW_DAYS: u64 = 36_500;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub output_dir: PathBuf,
    pub data_file: String,
    pub report_file: String,
    pub window_days: u64,
    pub channels: Vec<Channel>,
    pub hardware_backend: HardwareBackend,
    pub event_batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HardwareBackend {
    /// CIM on Windows, sysinfo elsewhere.
    #[default]
    Auto,
    Cim,
    Sysinfo,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("system_analysis"),
            data_file: "system_data.json".to_string(),
            report_file: "system_report.txt".to_string(),
            window_days: 7,
            channels: Channel::ALL.to_vec(),
            hardware_backend: HardwareBackend::Auto,
            event_batch_size: 256,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        // An empty document is YAML null, which serde refuses for a struct.
        let cfg: Config = if text.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path_display,
                source,
            })?
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "output_dir must not be empty".to_string(),
            ));
        }
        validate_file_name("data_file", &self.data_file)?;
        validate_file_name("report_file", &self.report_file)?;
        if self.data_file == self.report_file {
            return Err(ConfigError::Validation(
                "data_file and report_file must differ".to_string(),
            ));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.window_days) {
            return Err(ConfigError::Validation(format!(
                "window_days must be in 1..={MAX_WINDOW_DAYS}"
            )));
        }
        if self.event_batch_size < 1 {
            return Err(ConfigError::Validation(
                "event_batch_size must be >= 1".to_string(),
            ));
        }

        validate_channels(&self.channels)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_file_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "{field} must not be empty"
        )));
    }
    if name.contains(['/', '\\']) {
        return Err(ConfigError::Validation(format!(
            "{field} '{name}' must be a plain file name, not a path"
        )));
    }
    Ok(())
}

fn validate_channels(channels: &[Channel]) -> Result<(), ConfigError> {
    if channels.is_empty() {
        return Err(ConfigError::Validation(
            "channels must list at least one event log".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for channel in channels {
        if !seen.insert(channel) {
            return Err(ConfigError::Validation(format!(
                "channel '{channel}' is listed more than once"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        fs::write(&path, contents).expect("write config");
        (dir, path)
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.output_dir, PathBuf::from("system_analysis"));
        assert_eq!(cfg.data_file, "system_data.json");
        assert_eq!(cfg.report_file, "system_report.txt");
        assert_eq!(cfg.window_days, 7);
        assert_eq!(cfg.channels, Channel::ALL.to_vec());
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn bundled_example_parses_to_defaults() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("example parses");
        cfg.validate().expect("example is valid");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let (_dir, path) =
            write_config("window_days: 3\nchannels: [Security]\nhardware_backend: sysinfo\n");
        let cfg = Config::load_from_file(&path).expect("loads");
        assert_eq!(cfg.window_days, 3);
        assert_eq!(cfg.channels, vec![Channel::Security]);
        assert_eq!(cfg.hardware_backend, HardwareBackend::Sysinfo);
        assert_eq!(cfg.report_file, "system_report.txt");
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let (_dir, path) = write_config("\n");
        assert_eq!(Config::load_from_file(&path).expect("loads"), Config::default());
    }

    #[test]
    fn channel_names_are_case_insensitive() {
        let (_dir, path) = write_config("channels: [security, system]\n");
        let cfg = Config::load_from_file(&path).expect("loads");
        assert_eq!(cfg.channels, vec![Channel::Security, Channel::System]);
    }

    #[test]
    fn unknown_channel_is_a_parse_error() {
        let (_dir, path) = write_config("channels: [Setup]\n");
        let err = Config::load_from_file(&path).expect_err("Setup is not supported");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Config::load_from_file(dir.path().join("absent.yaml")).expect_err("no file");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn rejects_zero_day_window() {
        let cfg = Config {
            window_days: 0,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_empty_and_duplicate_channels() {
        let empty = Config {
            channels: vec![],
            ..Config::default()
        };
        assert!(empty.validate().is_err());

        let dup = Config {
            channels: vec![Channel::System, Channel::System],
            ..Config::default()
        };
        let err = dup.validate().expect_err("duplicate channel");
        assert!(err.to_string().contains("System"));
    }

    #[test]
    fn rejects_path_like_and_clashing_file_names() {
        let nested = Config {
            data_file: "out/system_data.json".to_string(),
            ..Config::default()
        };
        assert!(nested.validate().is_err());

        let clash = Config {
            report_file: "system_data.json".to_string(),
            ..Config::default()
        };
        assert!(clash.validate().is_err());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let cfg = Config {
            event_batch_size: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
