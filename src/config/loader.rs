//! Configuration loading from flags, environment and disk.
//!
//! Precedence is flags > environment > file > defaults. The config file path
//! itself follows the same precedence, so `--config` beats
//! `ECHOPILOT_CONFIG_FILE`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{PartialConfig, StaticConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::net::tls::TlsError;

pub const ENV_CONFIG_FILE: &str = "ECHOPILOT_CONFIG_FILE";
pub const ENV_HOST: &str = "ECHOPILOT_HOST";
pub const ENV_BIND_IP: &str = "ECHOPILOT_BIND_IP";
pub const ENV_PORT: &str = "ECHOPILOT_PORT";
pub const ENV_TLS_CERT: &str = "ECHOPILOT_TLS_CERT";
pub const ENV_TLS_KEY: &str = "ECHOPILOT_TLS_KEY";
pub const ENV_TLS_ENABLED: &str = "ECHOPILOT_TLS_ENABLED";
pub const ENV_TLS_SKIP_VERIFY: &str = "ECHOPILOT_TLS_SKIP_VERIFY";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("TLS is enabled but no TLS material is loaded")]
    MissingTls,
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read one layer of configuration from environment variables.
///
/// `lookup` returns the value of a variable, or `None` if it is unset. Empty
/// values count as unset.
pub fn config_from_env<F>(lookup: F) -> Result<PartialConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|value| !value.is_empty());

    let config = PartialConfig {
        config_file: get(ENV_CONFIG_FILE).map(PathBuf::from),
        host: get(ENV_HOST),
        ip: get(ENV_BIND_IP),
        port: parse_env(ENV_PORT, get(ENV_PORT))?,
        tls_cert: get(ENV_TLS_CERT).map(PathBuf::from),
        tls_key: get(ENV_TLS_KEY).map(PathBuf::from),
        tls_enabled: parse_env(ENV_TLS_ENABLED, get(ENV_TLS_ENABLED))?,
        tls_skip_verify: parse_env(ENV_TLS_SKIP_VERIFY, get(ENV_TLS_SKIP_VERIFY))?,
    };

    tracing::debug!(config = ?config, "Loaded config from environment");
    Ok(config)
}

fn parse_env<T: FromStr>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    match value {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}

/// Read one layer of configuration from a JSON file.
pub fn config_from_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: PartialConfig =
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::debug!(path = ?path, config = ?config, "Loaded config from file");
    Ok(config)
}

/// Merge flags, environment and file into a validated configuration.
pub fn load_config<F>(flags: &PartialConfig, lookup: F) -> Result<StaticConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = config_from_env(lookup)?;
    let overrides = env.merge(flags.clone());

    // Resolve the file path before reading the file; finalize() applies the
    // default path only if that file exists.
    let file_path = overrides
        .config_file
        .clone()
        .or_else(|| PartialConfig::default().finalize().config_file);

    let layered = match &file_path {
        Some(path) => config_from_file(path)?.merge(overrides),
        None => overrides,
    };

    let mut config = layered.finalize();
    config.config_file = file_path;

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn env_values_are_parsed() {
        let config = config_from_env(env(&[
            (ENV_BIND_IP, "0.0.0.0"),
            (ENV_PORT, "8443"),
            (ENV_TLS_ENABLED, "false"),
            (ENV_HOST, ""),
        ]))
        .unwrap();

        assert_eq!(config.ip.as_deref(), Some("0.0.0.0"));
        assert_eq!(config.port, Some(8443));
        assert_eq!(config.tls_enabled, Some(false));
        assert_eq!(config.host, None);
    }

    #[test]
    fn invalid_env_value_is_rejected() {
        let err = config_from_env(env(&[(ENV_PORT, "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_PORT, .. }));
    }

    #[test]
    fn flags_beat_env_beat_file() {
        let file = write_config(r#"{"bindHost": "10.0.0.1", "serverPort": 1000, "serverHost": "file.local", "tlsEnabled": false}"#);
        let path = file.path().to_string_lossy().to_string();

        let flags = PartialConfig {
            port: Some(3000),
            ..Default::default()
        };
        let config = load_config(
            &flags,
            env(&[(ENV_CONFIG_FILE, path.as_str()), (ENV_PORT, "2000"), (ENV_BIND_IP, "10.0.0.2")]),
        )
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.ip, "10.0.0.2");
        assert_eq!(config.host, "file.local");
        assert!(!config.tls_enabled);
        assert_eq!(config.config_file.as_deref(), Some(file.path()));
    }

    #[test]
    fn missing_config_file_is_error() {
        let flags = PartialConfig {
            config_file: Some(PathBuf::from("/nonexistent/echopilot.json")),
            ..Default::default()
        };
        let err = load_config(&flags, env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_config_file_is_error() {
        let file = write_config("{ not json");
        let flags = PartialConfig {
            config_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let err = load_config(&flags, env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
