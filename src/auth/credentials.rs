//! Credential broker
//!
//! Turns ticket caches or username/password pairs into verified
//! `Credentials`. Every entry point reloads the realm configuration, so a
//! broken `krb5.conf` shows up as a per-request error rather than a startup
//! failure. Nothing is retried or cached between requests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error};

use crate::krb5::{CCache, ClientSettings, Credentials, KdcConnector, Krb5Config, Krb5Error};

/// Broker failures, one per step that can fail
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("reading krb5.conf fails: {0}")]
    ConfigLoad(Krb5Error),

    #[error("unable to load ticket cache: {0}")]
    CacheLoad(Krb5Error),

    #[error("client login fails: {0}")]
    Login(Krb5Error),

    #[error("unable to store kerberos ticket: {0}")]
    TempFile(String),

    #[error("unable to obtain user credentials")]
    EmptyCredential,
}

/// Broker configuration, fixed at startup
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Path of the realm configuration (`krb5.conf`)
    pub krb5_conf: PathBuf,
    /// Realm for password logins; falls back to `default_realm`
    pub realm: Option<String>,
    /// Directory for spooled ticket uploads
    pub ticket_dir: PathBuf,
}

/// Obtains credentials through a `KdcConnector`
pub struct CredentialBroker {
    config: BrokerConfig,
    connector: Arc<dyn KdcConnector>,
}

impl CredentialBroker {
    pub fn new(config: BrokerConfig, connector: Arc<dyn KdcConnector>) -> Self {
        Self { config, connector }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    async fn load_config(&self) -> Result<Arc<Krb5Config>, CredentialError> {
        Krb5Config::load(&self.config.krb5_conf)
            .await
            .map(Arc::new)
            .map_err(CredentialError::ConfigLoad)
    }

    /// Log in with an existing ticket cache file
    pub async fn from_cache(&self, cache_file: &Path) -> Result<Option<Credentials>, CredentialError> {
        let config = self.load_config().await?;
        let cache = CCache::load(cache_file)
            .await
            .map_err(CredentialError::CacheLoad)?;

        let mut client = self.connector.client_from_ccache(cache, config);
        client.login().await.map_err(CredentialError::Login)?;
        Ok(client.into_credentials())
    }

    /// Log in with a username and password
    pub async fn from_password(
        &self,
        user: &str,
        password: &str,
    ) -> Result<Option<Credentials>, CredentialError> {
        let config = match self.load_config().await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "reading krb5.conf fails");
                return Err(e);
            }
        };

        let realm = match self.config.realm.as_deref().or(config.default_realm()) {
            Some(r) => r.to_string(),
            None => {
                let e = CredentialError::ConfigLoad(Krb5Error::NotConfigured(
                    "no realm configured and krb5.conf has no default_realm".into(),
                ));
                error!(error = %e, "reading krb5.conf fails");
                return Err(e);
            }
        };

        let settings = ClientSettings {
            disable_pa_fx_fast: true,
        };
        let mut client = self
            .connector
            .client_with_password(user, &realm, password, config, settings);

        if let Err(e) = client.login().await {
            let e = CredentialError::Login(e);
            error!(error = %e, user = %user, realm = %realm, "client login fails");
            return Err(e);
        }
        Ok(client.into_credentials())
    }

    /// Log in with ticket cache bytes uploaded by a non-browser client.
    ///
    /// The bytes are spooled to a temporary file named after `name`; the file
    /// is removed before this returns, whatever the outcome.
    pub async fn from_uploaded_ticket(
        &self,
        name: &str,
        ticket: &[u8],
    ) -> Result<Credentials, CredentialError> {
        let prefix = spool_prefix(name);
        let dir = self.config.ticket_dir.clone();
        let spool = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempfile_in(&dir)
        })
        .await
        .map_err(|e| CredentialError::TempFile(format!("Unable to create tempfile: {}", e)))?
        .map_err(|e| CredentialError::TempFile(format!("Unable to create tempfile: {}", e)))?;

        tokio::fs::write(spool.path(), ticket)
            .await
            .map_err(|e| CredentialError::TempFile(format!("unable to write kerberos ticket: {}", e)))?;

        debug!(path = %spool.path().display(), bytes = ticket.len(), "spooled uploaded ticket");

        // `spool` is dropped (and unlinked) on every path out of this function.
        match self.from_cache(spool.path()).await? {
            Some(creds) => Ok(creds),
            None => Err(CredentialError::EmptyCredential),
        }
    }
}

/// Temp file prefix derived from a caller-supplied name.
///
/// Only portable filename characters survive, so the name can never point
/// outside the spool directory.
fn spool_prefix(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .take(64)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "ticket-".to_string()
    } else {
        format!("{}-", cleaned)
    }
}
