//! Live server options for the lifecycle manager.
//!
//! The lifecycle asks for options once per reload iteration through
//! [`OptionsProvider`]. [`ServerConfig`] is the production provider: it keeps
//! the flags given at startup and re-reads environment, config file and TLS
//! material whenever a refresh is requested.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{PartialConfig, StaticConfig};
use crate::net::tls::TlsMaterial;

/// Source of bind address and TLS settings for a listener.
///
/// With `refresh = true` the provider reloads its configuration before
/// answering. A failed refresh leaves the previous snapshot in place.
pub trait OptionsProvider: Send + Sync + 'static {
    fn addr(&self, refresh: bool) -> Result<String, ConfigError>;

    /// TLS material, `None` when TLS is disabled.
    fn tls_config(&self, refresh: bool) -> Result<Option<TlsMaterial>, ConfigError>;

    fn tls_enabled(&self, refresh: bool) -> Result<bool, ConfigError>;
}

impl<T: OptionsProvider> OptionsProvider for Arc<T> {
    fn addr(&self, refresh: bool) -> Result<String, ConfigError> {
        (**self).addr(refresh)
    }

    fn tls_config(&self, refresh: bool) -> Result<Option<TlsMaterial>, ConfigError> {
        (**self).tls_config(refresh)
    }

    fn tls_enabled(&self, refresh: bool) -> Result<bool, ConfigError> {
        (**self).tls_enabled(refresh)
    }
}

type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Resolved configuration plus the TLS material it points at.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub settings: StaticConfig,
    pub tls: Option<TlsMaterial>,
}

/// Reloadable server configuration.
pub struct ServerConfig {
    flags: PartialConfig,
    env: Box<EnvLookup>,
    current: ArcSwap<Snapshot>,
}

impl ServerConfig {
    /// Load configuration from flags, the process environment and the config
    /// file. Fails if the initial configuration is invalid.
    pub fn new(flags: PartialConfig) -> Result<Self, ConfigError> {
        Self::with_env(flags, |var| std::env::var(var).ok())
    }

    /// Like [`ServerConfig::new`] with a custom environment lookup.
    pub fn with_env<F>(flags: PartialConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let snapshot = build_snapshot(&flags, &env)?;
        tracing::info!(config = ?snapshot.settings, "Server config loaded");

        Ok(Self {
            flags,
            env: Box::new(env),
            current: ArcSwap::from_pointee(snapshot),
        })
    }

    /// Re-read every source and swap in the result.
    pub fn refresh(&self) -> Result<(), ConfigError> {
        let snapshot = match build_snapshot(&self.flags, &*self.env) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::debug!(error = %e, "Server config refresh rejected");
                return Err(e);
            }
        };

        tracing::info!(config = ?snapshot.settings, "Server config refreshed");
        self.current.store(Arc::new(snapshot));
        Ok(())
    }

    /// Current snapshot without refreshing.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    fn refreshed(&self, refresh: bool) -> Result<Arc<Snapshot>, ConfigError> {
        if refresh {
            self.refresh()?;
        }
        Ok(self.snapshot())
    }
}

impl OptionsProvider for ServerConfig {
    fn addr(&self, refresh: bool) -> Result<String, ConfigError> {
        Ok(self.refreshed(refresh)?.settings.bind_address())
    }

    fn tls_config(&self, refresh: bool) -> Result<Option<TlsMaterial>, ConfigError> {
        Ok(self.refreshed(refresh)?.tls.clone())
    }

    fn tls_enabled(&self, refresh: bool) -> Result<bool, ConfigError> {
        Ok(self.refreshed(refresh)?.settings.tls_enabled)
    }
}

fn build_snapshot(flags: &PartialConfig, env: &EnvLookup) -> Result<Snapshot, ConfigError> {
    let settings = load_config(flags, env)?;
    let tls = if settings.tls_enabled {
        Some(TlsMaterial::load(&settings.tls_cert, &settings.tls_key)?)
    } else {
        None
    };
    Ok(Snapshot { settings, tls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::config::loader::ENV_PORT;

    fn plaintext_flags() -> PartialConfig {
        PartialConfig {
            ip: Some("127.0.0.1".into()),
            tls_enabled: Some(false),
            ..Default::default()
        }
    }

    fn shared_env() -> (Arc<Mutex<HashMap<String, String>>>, impl Fn(&str) -> Option<String> + Send + Sync) {
        let vars = Arc::new(Mutex::new(HashMap::new()));
        let lookup = {
            let vars = Arc::clone(&vars);
            move |key: &str| vars.lock().unwrap().get(key).cloned()
        };
        (vars, lookup)
    }

    #[test]
    fn refresh_picks_up_environment_changes() {
        let (vars, lookup) = shared_env();
        vars.lock().unwrap().insert(ENV_PORT.into(), "8080".into());
        let config = ServerConfig::with_env(plaintext_flags(), lookup).unwrap();
        assert_eq!(config.addr(false).unwrap(), "127.0.0.1:8080");

        vars.lock().unwrap().insert(ENV_PORT.into(), "9090".into());
        assert_eq!(config.addr(false).unwrap(), "127.0.0.1:8080");
        assert_eq!(config.addr(true).unwrap(), "127.0.0.1:9090");
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot() {
        let (vars, lookup) = shared_env();
        vars.lock().unwrap().insert(ENV_PORT.into(), "8080".into());
        let config = ServerConfig::with_env(plaintext_flags(), lookup).unwrap();

        vars.lock().unwrap().insert(ENV_PORT.into(), "not-a-port".into());
        assert!(config.addr(true).is_err());
        assert_eq!(config.addr(false).unwrap(), "127.0.0.1:8080");
    }

    #[test]
    fn tls_disabled_has_no_material() {
        let config = ServerConfig::with_env(plaintext_flags(), |_| None).unwrap();
        assert!(!config.tls_enabled(false).unwrap());
        assert!(config.tls_config(false).unwrap().is_none());
    }

    #[test]
    fn missing_tls_files_fail_startup() {
        let flags = PartialConfig {
            tls_enabled: Some(true),
            tls_cert: Some("/nonexistent/cert.pem".into()),
            tls_key: Some("/nonexistent/key.pem".into()),
            ..Default::default()
        };
        let err = ServerConfig::with_env(flags, |_| None).err().unwrap();
        assert!(matches!(err, ConfigError::Tls(_)));
    }
}
