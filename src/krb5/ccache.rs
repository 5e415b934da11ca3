//! MIT file credential cache parsing
//!
//! Supports the big-endian formats written by every current Kerberos
//! implementation: version 3 (0x0503) and version 4 (0x0504, which adds a
//! tagged header block). Versions 1 and 2 used host byte order and are
//! rejected.
//!
//! Layout (v4):
//! ```text
//! u16 version | u16 header_len | header | principal | credential*
//! ```

use std::fmt;
use std::path::Path;

use bytes::Buf;
use chrono::{DateTime, Utc};

use super::Krb5Error;

/// Service name of ticket granting tickets
pub const TGT_SERVICE: &str = "krbtgt";

/// Realm used by cache configuration entries, which are not tickets
pub const CONF_REALM: &str = "X-CACHECONF:";

const VERSION_3: u16 = 0x0503;
const VERSION_4: u16 = 0x0504;

/// Kerberos principal name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name_type: u32,
    pub realm: String,
    pub components: Vec<String>,
}

impl Principal {
    /// Components joined with `/`, without the realm
    pub fn name(&self) -> String {
        self.components.join("/")
    }

    /// Whether this is the TGS principal `krbtgt/REALM@REALM`
    pub fn is_tgt_for(&self, realm: &str) -> bool {
        self.realm == realm
            && self.components.len() == 2
            && self.components[0] == TGT_SERVICE
            && self.components[1] == realm
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name(), self.realm)
    }
}

/// One credential entry of a cache
#[derive(Debug, Clone)]
pub struct CachedCredential {
    pub client: Principal,
    pub server: Principal,
    pub key_enctype: u16,
    pub auth_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub renew_till: Option<DateTime<Utc>>,
    pub is_skey: bool,
    pub ticket_flags: u32,
    pub ticket: Vec<u8>,
}

impl CachedCredential {
    /// Configuration entries (`X-CACHECONF:`) carry settings, not tickets
    pub fn is_config_entry(&self) -> bool {
        self.server.realm == CONF_REALM
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }
}

/// Parsed credential cache
#[derive(Debug, Clone)]
pub struct CCache {
    version: u16,
    default_principal: Principal,
    credentials: Vec<CachedCredential>,
}

impl CCache {
    /// Load a cache from a file
    pub async fn load(path: &Path) -> Result<Self, Krb5Error> {
        let data = tokio::fs::read(path).await.map_err(|source| Krb5Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&data)
    }

    /// Parse cache bytes
    pub fn parse(data: &[u8]) -> Result<Self, Krb5Error> {
        let mut buf = data;

        let version = read_u16(&mut buf, "version")?;
        match version {
            VERSION_4 => {
                let header_len = read_u16(&mut buf, "header length")? as usize;
                need(&buf, header_len, "header")?;
                buf.advance(header_len);
            }
            VERSION_3 => {}
            other => return Err(Krb5Error::UnsupportedCacheVersion(other)),
        }

        let default_principal = read_principal(&mut buf)?;

        let mut credentials = Vec::new();
        while buf.has_remaining() {
            credentials.push(read_credential(&mut buf, version)?);
        }

        Ok(Self {
            version,
            default_principal,
            credentials,
        })
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn default_principal(&self) -> &Principal {
        &self.default_principal
    }

    pub fn credentials(&self) -> &[CachedCredential] {
        &self.credentials
    }

    /// Ticket granting ticket for the default principal's realm.
    ///
    /// When several are cached the one that lasts longest wins.
    pub fn tgt(&self) -> Option<&CachedCredential> {
        let realm = &self.default_principal.realm;
        self.credentials
            .iter()
            .filter(|c| !c.is_config_entry())
            .filter(|c| c.client == self.default_principal && c.server.is_tgt_for(realm))
            .max_by_key(|c| c.end_time)
    }
}

fn need(buf: &&[u8], len: usize, what: &str) -> Result<(), Krb5Error> {
    if buf.remaining() < len {
        return Err(Krb5Error::CacheFormat(format!(
            "truncated {}: need {} bytes, {} left",
            what,
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

fn read_u8(buf: &mut &[u8], what: &str) -> Result<u8, Krb5Error> {
    need(buf, 1, what)?;
    Ok(buf.get_u8())
}

fn read_u16(buf: &mut &[u8], what: &str) -> Result<u16, Krb5Error> {
    need(buf, 2, what)?;
    Ok(buf.get_u16())
}

fn read_u32(buf: &mut &[u8], what: &str) -> Result<u32, Krb5Error> {
    need(buf, 4, what)?;
    Ok(buf.get_u32())
}

fn read_octets(buf: &mut &[u8], what: &str) -> Result<Vec<u8>, Krb5Error> {
    let len = read_u32(buf, what)? as usize;
    need(buf, len, what)?;
    let out = buf[..len].to_vec();
    buf.advance(len);
    Ok(out)
}

fn read_string(buf: &mut &[u8], what: &str) -> Result<String, Krb5Error> {
    let raw = read_octets(buf, what)?;
    String::from_utf8(raw)
        .map_err(|_| Krb5Error::CacheFormat(format!("{} is not valid UTF-8", what)))
}

fn read_time(buf: &mut &[u8], what: &str) -> Result<Option<DateTime<Utc>>, Krb5Error> {
    let secs = read_u32(buf, what)?;
    if secs == 0 {
        return Ok(None);
    }
    DateTime::from_timestamp(i64::from(secs), 0)
        .map(Some)
        .ok_or_else(|| Krb5Error::CacheFormat(format!("{} out of range", what)))
}

fn read_principal(buf: &mut &[u8]) -> Result<Principal, Krb5Error> {
    let name_type = read_u32(buf, "principal name type")?;
    let count = read_u32(buf, "principal component count")?;
    let realm = read_string(buf, "principal realm")?;
    // Each component needs at least its 4-byte length.
    need(buf, count as usize * 4, "principal components")?;
    let components = (0..count)
        .map(|_| read_string(buf, "principal component"))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Principal {
        name_type,
        realm,
        components,
    })
}

fn skip_tagged_list(buf: &mut &[u8], what: &str) -> Result<(), Krb5Error> {
    let count = read_u32(buf, what)?;
    need(buf, count as usize * 6, what)?;
    for _ in 0..count {
        read_u16(buf, what)?;
        read_octets(buf, what)?;
    }
    Ok(())
}

fn read_credential(buf: &mut &[u8], version: u16) -> Result<CachedCredential, Krb5Error> {
    let client = read_principal(buf)?;
    let server = read_principal(buf)?;

    let key_enctype = read_u16(buf, "key enctype")?;
    if version == VERSION_3 {
        // v3 stores the enctype twice
        read_u16(buf, "key enctype")?;
    }
    read_octets(buf, "key data")?;

    let auth_time = read_time(buf, "auth time")?
        .ok_or_else(|| Krb5Error::CacheFormat("credential without auth time".into()))?;
    let start_time = read_time(buf, "start time")?;
    let end_time = read_time(buf, "end time")?
        .ok_or_else(|| Krb5Error::CacheFormat("credential without end time".into()))?;
    let renew_till = read_time(buf, "renew till")?;

    let is_skey = read_u8(buf, "is_skey")? != 0;
    let ticket_flags = read_u32(buf, "ticket flags")?;

    skip_tagged_list(buf, "addresses")?;
    skip_tagged_list(buf, "authdata")?;

    let ticket = read_octets(buf, "ticket")?;
    read_octets(buf, "second ticket")?;

    Ok(CachedCredential {
        client,
        server,
        key_enctype,
        auth_time,
        start_time,
        end_time,
        renew_till,
        is_skey,
        ticket_flags,
        ticket,
    })
}

/// Cache writer used by unit tests to produce fixtures
#[cfg(test)]
pub(crate) mod fixtures {
    use bytes::BufMut;

    pub struct Entry<'a> {
        pub server: (&'a str, &'a [&'a str]),
        pub end_time: u32,
    }

    fn put_octets(out: &mut Vec<u8>, data: &[u8]) {
        out.put_u32(data.len() as u32);
        out.put_slice(data);
    }

    fn put_principal(out: &mut Vec<u8>, realm: &str, components: &[&str]) {
        out.put_u32(1);
        out.put_u32(components.len() as u32);
        put_octets(out, realm.as_bytes());
        for c in components {
            put_octets(out, c.as_bytes());
        }
    }

    /// Encode a v4 cache for `user@realm` with the given entries
    pub fn encode(user: &str, realm: &str, entries: &[Entry<'_>]) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u16(0x0504);
        // header: one kdc-offset tag (tag 1, 8 bytes)
        out.put_u16(12);
        out.put_u16(1);
        out.put_u16(8);
        out.put_u64(0);
        put_principal(&mut out, realm, &[user]);
        for entry in entries {
            put_principal(&mut out, realm, &[user]);
            put_principal(&mut out, entry.server.0, entry.server.1);
            out.put_u16(18);
            put_octets(&mut out, &[0u8; 32]);
            out.put_u32(1_700_000_000);
            out.put_u32(1_700_000_000);
            out.put_u32(entry.end_time);
            out.put_u32(0);
            out.put_u8(0);
            out.put_u32(0x4081_0000);
            out.put_u32(0);
            out.put_u32(0);
            put_octets(&mut out, b"opaque-ticket");
            put_octets(&mut out, b"");
        }
        out
    }
}
