/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Configuration options shared by token providers

use crate::error::TokenError;
use crate::subject_token::executable::process::{SharedProcessSpawner, TokioProcessSpawner};
use wif_types::connector::SharedHttpConnector;
use wif_types::os_shim_internal::{Env, Fs};
use wif_types::time::{SharedTimeSource, SystemTimeSource};

/// Configuration options for token providers
///
/// Bundles the collaborators every provider needs: the process environment, the file system, a
/// clock, an HTTP connector, and a way to spawn processes. The defaults use the real operating
/// system and, with the `rustls` feature, a hyper + rustls HTTPS connector.
///
/// # Example
/// ```rust
/// use wif_auth::provider_config::ProviderConfig;
/// use wif_types::os_shim_internal::Env;
/// let conf = ProviderConfig::default()
///     .with_env(Env::from_slice(&[("GOOGLE_EXTERNAL_ACCOUNT_ALLOW_EXECUTABLES", "1")]));
/// ```
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    env: Env,
    fs: Fs,
    time_source: SharedTimeSource,
    connector: Option<SharedHttpConnector>,
    process_spawner: SharedProcessSpawner,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            env: Env::default(),
            fs: Fs::default(),
            time_source: SharedTimeSource::new(SystemTimeSource::new()),
            connector: default_connector(),
            process_spawner: SharedProcessSpawner::new(TokioProcessSpawner),
        }
    }
}

#[cfg(feature = "rustls")]
fn default_connector() -> Option<SharedHttpConnector> {
    Some(wif_types::connector::https())
}

#[cfg(not(feature = "rustls"))]
fn default_connector() -> Option<SharedHttpConnector> {
    None
}

impl ProviderConfig {
    /// A configuration with an empty environment, an empty file system, and no HTTP connector
    ///
    /// Useful for tests: everything a provider reads must be set explicitly.
    pub fn no_configuration() -> Self {
        ProviderConfig {
            env: Env::from_slice(&[]),
            fs: Fs::from_slice(&[]),
            time_source: SharedTimeSource::new(SystemTimeSource::new()),
            connector: None,
            process_spawner: SharedProcessSpawner::new(TokioProcessSpawner),
        }
    }

    pub(crate) fn env(&self) -> Env {
        self.env.clone()
    }

    pub(crate) fn fs(&self) -> Fs {
        self.fs.clone()
    }

    pub(crate) fn time_source(&self) -> SharedTimeSource {
        self.time_source.clone()
    }

    pub(crate) fn process_spawner(&self) -> SharedProcessSpawner {
        self.process_spawner.clone()
    }

    pub(crate) fn connector(&self) -> Result<SharedHttpConnector, TokenError> {
        self.connector.clone().ok_or_else(|| {
            TokenError::invalid_configuration(
                "no HTTP connector was configured. Enable the `rustls` feature or set one with `ProviderConfig::with_connector`",
            )
        })
    }

    pub fn with_env(self, env: Env) -> Self {
        ProviderConfig { env, ..self }
    }

    pub fn with_fs(self, fs: Fs) -> Self {
        ProviderConfig { fs, ..self }
    }

    pub fn with_time_source(self, time_source: SharedTimeSource) -> Self {
        ProviderConfig {
            time_source,
            ..self
        }
    }

    /// Override the HTTPS connector for this configuration
    pub fn with_connector(self, connector: SharedHttpConnector) -> Self {
        ProviderConfig {
            connector: Some(connector),
            ..self
        }
    }

    /// Override how executable subject token sources spawn processes
    pub fn with_process_spawner(self, process_spawner: SharedProcessSpawner) -> Self {
        ProviderConfig {
            process_spawner,
            ..self
        }
    }
}

#[cfg(test)]
mod test {
    use super::ProviderConfig;
    use crate::error::TokenError;

    #[test]
    fn missing_connector_is_a_configuration_error() {
        let conf = ProviderConfig::no_configuration();
        assert!(matches!(
            conf.connector(),
            Err(TokenError::InvalidConfiguration(_))
        ));
        assert!(conf.env().get("HOME").is_err());
    }
}
