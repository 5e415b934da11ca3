//! Ticket clients
//!
//! A `TicketClient` is bound to one source of credential material (a loaded
//! ccache or a username/password pair) and turns it into `Credentials` on
//! `login()`. The `KdcConnector` trait is the seam the broker builds clients
//! through, so tests can swap in their own.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::ccache::CCache;
use super::config::Krb5Config;
use super::credentials::Credentials;
use super::Krb5Error;

/// Options for password clients
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    /// Skip PA-FX-FAST armoring
    pub disable_pa_fx_fast: bool,
}

/// A client that can log in and then hand out credentials
#[async_trait::async_trait]
pub trait TicketClient: Send {
    async fn login(&mut self) -> Result<(), Krb5Error>;

    /// Credentials from the last successful login
    fn credentials(&self) -> Option<&Credentials>;

    /// Consume the client, keeping only its credentials
    fn into_credentials(self: Box<Self>) -> Option<Credentials>;
}

/// Builds ticket clients (allows mocking in tests)
pub trait KdcConnector: Send + Sync {
    fn client_from_ccache(&self, cache: CCache, config: Arc<Krb5Config>) -> Box<dyn TicketClient>;

    fn client_with_password(
        &self,
        user: &str,
        realm: &str,
        password: &str,
        config: Arc<Krb5Config>,
        settings: ClientSettings,
    ) -> Box<dyn TicketClient>;
}

// ============================================================================
// Cache client
// ============================================================================

/// Client bound to an already obtained ticket cache.
///
/// Login never contacts the KDC: it succeeds when the client is configured
/// and the cache holds an unexpired TGT for the principal's realm.
pub struct CacheClient {
    cache: CCache,
    config: Arc<Krb5Config>,
    credentials: Option<Credentials>,
}

impl CacheClient {
    pub fn new(cache: CCache, config: Arc<Krb5Config>) -> Self {
        Self {
            cache,
            config,
            credentials: None,
        }
    }

    fn check_configured(&self) -> Result<(), Krb5Error> {
        let principal = self.cache.default_principal();
        if principal.components.is_empty() || principal.name().is_empty() {
            return Err(Krb5Error::NotConfigured("cache has no default principal".into()));
        }
        if principal.realm.is_empty() {
            return Err(Krb5Error::NotConfigured("cache principal has no realm".into()));
        }
        if !self.config.can_locate_kdc(&principal.realm) {
            return Err(Krb5Error::NotConfigured(format!(
                "no KDC configured for realm {}",
                principal.realm
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TicketClient for CacheClient {
    async fn login(&mut self) -> Result<(), Krb5Error> {
        self.check_configured()?;

        let principal = self.cache.default_principal();
        let tgt = self.cache.tgt().ok_or_else(|| {
            Krb5Error::NoSession(format!("no TGT for {} in cache", principal))
        })?;

        let now = Utc::now();
        if tgt.is_expired_at(now) {
            return Err(Krb5Error::NoSession(format!(
                "TGT for {} expired at {}",
                principal, tgt.end_time
            )));
        }

        debug!(principal = %principal, end_time = %tgt.end_time, "ccache login");
        self.credentials = Some(Credentials::from_tgt(&self.cache, tgt));
        Ok(())
    }

    fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    fn into_credentials(self: Box<Self>) -> Option<Credentials> {
        self.credentials
    }
}

// ============================================================================
// kinit client
// ============================================================================

/// Password client that performs the AS exchange through the system `kinit`.
///
/// The resulting ccache is written into a private temporary directory, read
/// back, and removed when the login returns.
pub struct KinitClient {
    kinit_path: PathBuf,
    user: String,
    realm: String,
    password: Zeroizing<String>,
    config: Arc<Krb5Config>,
    settings: ClientSettings,
    credentials: Option<Credentials>,
}

impl KinitClient {
    pub fn new(
        kinit_path: PathBuf,
        user: &str,
        realm: &str,
        password: &str,
        config: Arc<Krb5Config>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            kinit_path,
            user: user.to_string(),
            realm: realm.to_string(),
            password: Zeroizing::new(password.to_string()),
            config,
            settings,
            credentials: None,
        }
    }

    fn principal(&self) -> String {
        format!("{}@{}", self.user, self.realm)
    }

    fn build_command(&self, ccache: &std::path::Path) -> Result<Command, Krb5Error> {
        let conf = self.config.source().ok_or_else(|| {
            Krb5Error::NotConfigured("realm configuration was not loaded from a file".into())
        })?;

        let mut cmd = Command::new(&self.kinit_path);
        cmd.arg("-c")
            .arg(format!("FILE:{}", ccache.display()))
            // Everything after this is the principal, never an option
            .arg("--")
            .arg(self.principal())
            .env("KRB5_CONFIG", conf)
            .env_remove("KRB5CCNAME")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait::async_trait]
impl TicketClient for KinitClient {
    async fn login(&mut self) -> Result<(), Krb5Error> {
        if self.user.is_empty() {
            return Err(Krb5Error::NotConfigured("empty username".into()));
        }
        if self.user.starts_with('-') {
            return Err(Krb5Error::NotConfigured(format!(
                "username {:?} is not a principal name",
                self.user
            )));
        }
        if self.realm.is_empty() || self.realm.starts_with('-') {
            return Err(Krb5Error::NotConfigured(format!("invalid realm {:?}", self.realm)));
        }
        if !self.config.can_locate_kdc(&self.realm) {
            return Err(Krb5Error::NotConfigured(format!(
                "no KDC configured for realm {}",
                self.realm
            )));
        }

        let workdir = tempfile::Builder::new()
            .prefix("datagate-kinit-")
            .tempdir()
            .map_err(|e| Krb5Error::Kinit(format!("unable to create work dir: {}", e)))?;
        let ccache_path = workdir.path().join("ccache");

        debug!(
            principal = %self.principal(),
            fast = !self.settings.disable_pa_fx_fast,
            "running kinit"
        );

        let mut child = self
            .build_command(&ccache_path)?
            .spawn()
            .map_err(|e| Krb5Error::Kinit(format!("unable to run {}: {}", self.kinit_path.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut line = Zeroizing::new(self.password.as_bytes().to_vec());
            line.push(b'\n');
            if let Err(e) = stdin.write_all(&line).await {
                warn!("writing password to kinit failed: {}", e);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Krb5Error::Kinit(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Krb5Error::Kinit(format!(
                "{} ({})",
                stderr.trim(),
                output.status
            )));
        }

        let cache = CCache::load(&ccache_path).await?;
        let mut inner = CacheClient::new(cache, Arc::clone(&self.config));
        inner.login().await?;
        self.credentials = inner.credentials;
        Ok(())
    }

    fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    fn into_credentials(self: Box<Self>) -> Option<Credentials> {
        self.credentials
    }
}

/// Default connector: caches are checked locally, passwords go through `kinit`
#[derive(Debug, Clone)]
pub struct KinitConnector {
    kinit_path: PathBuf,
}

impl KinitConnector {
    pub fn new(kinit_path: impl Into<PathBuf>) -> Self {
        Self {
            kinit_path: kinit_path.into(),
        }
    }
}

impl KdcConnector for KinitConnector {
    fn client_from_ccache(&self, cache: CCache, config: Arc<Krb5Config>) -> Box<dyn TicketClient> {
        Box::new(CacheClient::new(cache, config))
    }

    fn client_with_password(
        &self,
        user: &str,
        realm: &str,
        password: &str,
        config: Arc<Krb5Config>,
        settings: ClientSettings,
    ) -> Box<dyn TicketClient> {
        Box::new(KinitClient::new(
            self.kinit_path.clone(),
            user,
            realm,
            password,
            config,
            settings,
        ))
    }
}
