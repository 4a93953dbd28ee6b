//! Configuration schema definitions.
//!
//! Settings arrive from three sources (flags, environment, JSON file), each of
//! which may leave any field unset. [`PartialConfig`] holds one source;
//! sources are layered with [`PartialConfig::merge`] and then finalized into a
//! fully populated [`StaticConfig`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "/etc/echopilot/echopilot.json";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TLS_ENABLED: bool = true;
pub const DEFAULT_TLS_SKIP_VERIFY: bool = false;
pub const DEFAULT_TLS_CERT: &str = "/etc/echopilot/tls/cert.pem";
pub const DEFAULT_TLS_KEY: &str = "/etc/echopilot/tls/key.pem";

/// One layer of server configuration. Unset fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialConfig {
    /// Path of the JSON config file.
    pub config_file: Option<PathBuf>,

    /// Public host name of the server.
    #[serde(rename = "serverHost")]
    pub host: Option<String>,

    /// IP address to bind.
    #[serde(rename = "bindHost")]
    pub ip: Option<String>,

    /// Port to bind.
    #[serde(rename = "serverPort")]
    pub port: Option<u16>,

    /// Path to certificate file (PEM).
    pub tls_cert: Option<PathBuf>,

    /// Path to private key file (PEM).
    pub tls_key: Option<PathBuf>,

    pub tls_enabled: Option<bool>,

    /// Skip certificate verification on outgoing connections.
    pub tls_skip_verify: Option<bool>,
}

impl PartialConfig {
    /// Layer `higher` on top of `self`: every field set in `higher` wins.
    pub fn merge(self, higher: PartialConfig) -> PartialConfig {
        PartialConfig {
            config_file: higher.config_file.or(self.config_file),
            host: higher.host.or(self.host),
            ip: higher.ip.or(self.ip),
            port: higher.port.or(self.port),
            tls_cert: higher.tls_cert.or(self.tls_cert),
            tls_key: higher.tls_key.or(self.tls_key),
            tls_enabled: higher.tls_enabled.or(self.tls_enabled),
            tls_skip_verify: higher.tls_skip_verify.or(self.tls_skip_verify),
        }
    }

    /// Fill every unset field with its default.
    ///
    /// The default config file is only used if it exists on disk.
    pub fn finalize(self) -> StaticConfig {
        let config_file = self.config_file.or_else(|| {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            default.exists().then(|| default.to_path_buf())
        });

        StaticConfig {
            config_file,
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            ip: self.ip.unwrap_or_else(|| DEFAULT_IP.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            tls_cert: self.tls_cert.unwrap_or_else(|| PathBuf::from(DEFAULT_TLS_CERT)),
            tls_key: self.tls_key.unwrap_or_else(|| PathBuf::from(DEFAULT_TLS_KEY)),
            tls_enabled: self.tls_enabled.unwrap_or(DEFAULT_TLS_ENABLED),
            tls_skip_verify: self.tls_skip_verify.unwrap_or(DEFAULT_TLS_SKIP_VERIFY),
        }
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticConfig {
    pub config_file: Option<PathBuf>,
    pub host: String,
    pub ip: String,
    pub port: u16,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
    pub tls_enabled: bool,
    pub tls_skip_verify: bool,
}

impl StaticConfig {
    /// Bind address in `ip:port` form. IPv6 literals are bracketed.
    pub fn bind_address(&self) -> String {
        if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }
}

impl Default for StaticConfig {
    fn default() -> Self {
        PartialConfig::default().finalize()
    }
}
