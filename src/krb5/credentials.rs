//! Verified user credentials

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ccache::{CCache, CachedCredential};

/// Principal and ticket lifetime obtained from a successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub realm: String,
    pub auth_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renew_till: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Credentials for the cache's default principal, backed by `tgt`
    pub(crate) fn from_tgt(cache: &CCache, tgt: &CachedCredential) -> Self {
        let principal = cache.default_principal();
        Self {
            username: principal.name(),
            realm: principal.realm.clone(),
            auth_time: tgt.auth_time,
            end_time: tgt.end_time,
            renew_till: tgt.renew_till,
        }
    }

    /// `user@REALM`
    pub fn principal(&self) -> String {
        format!("{}@{}", self.username, self.realm)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.end_time > now
    }
}
