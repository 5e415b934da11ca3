//! Realm configuration (`krb5.conf`) loading
//!
//! Understands the profile syntax used by MIT and Heimdal: `[section]` headers,
//! `key = value` relations and `key = { ... }` groups. Only the sections the
//! broker consults are kept (`libdefaults`, `realms`, `domain_realm`); other
//! sections are parsed for well-formedness and dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Krb5Error;

/// Settings for a single realm from the `[realms]` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealmEntry {
    pub kdc: Vec<String>,
    pub admin_server: Vec<String>,
    pub kpasswd_server: Vec<String>,
    pub default_domain: Option<String>,
    /// Any other relation, in declaration order per key
    pub other: BTreeMap<String, Vec<String>>,
}

impl RealmEntry {
    fn insert(&mut self, key: &str, value: String) {
        match key {
            "kdc" => self.kdc.push(value),
            "admin_server" => self.admin_server.push(value),
            "kpasswd_server" => self.kpasswd_server.push(value),
            "default_domain" => self.default_domain = Some(value),
            _ => self.other.entry(key.to_string()).or_default().push(value),
        }
    }
}

/// Parsed realm configuration
#[derive(Debug, Clone, Default)]
pub struct Krb5Config {
    source: Option<PathBuf>,
    pub libdefaults: BTreeMap<String, String>,
    pub realms: BTreeMap<String, RealmEntry>,
    pub domain_realm: BTreeMap<String, String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    LibDefaults,
    Realms,
    DomainRealm,
    Ignored,
}

impl Krb5Config {
    /// Load and parse a configuration file
    pub async fn load(path: &Path) -> Result<Self, Krb5Error> {
        let text = tokio::fs::read_to_string(path).await.map_err(|source| Krb5Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&text)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration text
    pub fn parse(text: &str) -> Result<Self, Krb5Error> {
        let mut config = Self::default();
        let mut section = Section::None;
        // Open groups as (relation name, line opened). Depth 1 inside [realms] is the realm name.
        let mut groups: Vec<(String, usize)> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with("include ") || line.starts_with("includedir ") {
                debug!(line = line_no, "skipping krb5.conf include directive");
                continue;
            }

            if line.starts_with('[') {
                if !groups.is_empty() {
                    return Err(parse_error(line_no, "section header inside an open group"));
                }
                let name = line
                    .strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                    .ok_or_else(|| parse_error(line_no, "malformed section header"))?;
                section = match name.trim() {
                    "libdefaults" => Section::LibDefaults,
                    "realms" => Section::Realms,
                    "domain_realm" => Section::DomainRealm,
                    _ => Section::Ignored,
                };
                continue;
            }

            if line == "}" {
                if groups.pop().is_none() {
                    return Err(parse_error(line_no, "unbalanced '}'"));
                }
                continue;
            }

            if section == Section::None {
                return Err(parse_error(line_no, "relation outside of a section"));
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| parse_error(line_no, "expected 'key = value'"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(parse_error(line_no, "empty relation name"));
            }
            let value = value.trim();

            if value == "{" {
                if section == Section::Realms && groups.is_empty() {
                    config.realms.entry(key.to_string()).or_default();
                }
                groups.push((key.to_string(), line_no));
                continue;
            }

            // A trailing '*' marks the relation final; it has no meaning once parsed.
            let value = value.trim_end_matches('*').trim().to_string();

            match (section, groups.len()) {
                (Section::LibDefaults, 0) => {
                    config.libdefaults.insert(key.to_string(), value);
                }
                (Section::Realms, 1) => {
                    let realm = &groups[0].0;
                    if let Some(entry) = config.realms.get_mut(realm) {
                        entry.insert(key, value);
                    }
                }
                (Section::DomainRealm, 0) => {
                    config.domain_realm.insert(key.to_string(), value);
                }
                (Section::Realms, 0) => {
                    return Err(parse_error(line_no, "realm relations must be grouped"));
                }
                _ => {}
            }
        }

        if let Some((name, opened)) = groups.pop() {
            return Err(parse_error(
                opened,
                &format!("group '{}' is never closed", name),
            ));
        }

        Ok(config)
    }

    /// Path this configuration was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn default_realm(&self) -> Option<&str> {
        self.libdefaults
            .get("default_realm")
            .map(String::as_str)
            .filter(|r| !r.is_empty())
    }

    /// Whether KDCs may be located through DNS SRV records
    pub fn dns_lookup_kdc(&self) -> bool {
        self.libdefaults
            .get("dns_lookup_kdc")
            .or_else(|| self.libdefaults.get("dns_fallback"))
            .map(|v| parse_bool(v))
            .unwrap_or(false)
    }

    /// KDC addresses configured for a realm
    pub fn kdcs(&self, realm: &str) -> &[String] {
        self.realms
            .get(realm)
            .map(|r| r.kdc.as_slice())
            .unwrap_or(&[])
    }

    /// A realm is reachable when it has a KDC or DNS lookup is enabled
    pub fn can_locate_kdc(&self, realm: &str) -> bool {
        !self.kdcs(realm).is_empty() || self.dns_lookup_kdc()
    }
}

fn parse_error(line: usize, message: &str) -> Krb5Error {
    Krb5Error::ConfigParse {
        line,
        message: message.to_string(),
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "y" | "yes" | "true" | "t" | "1" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# site configuration
[libdefaults]
    default_realm = EXAMPLE.ORG
    dns_lookup_kdc = false
    default_tkt_enctypes = aes256-cts-hmac-sha1-96 aes128-cts-hmac-sha1-96

[realms]
    EXAMPLE.ORG = {
        kdc = kdc1.example.org
        kdc = kdc2.example.org:88
        admin_server = kadmin.example.org
        default_domain = example.org
        auth_to_local_names = {
            alice = alice_local
        }
        v4_name_convert = weird
    }
    EMPTY.ORG = {
    }

[domain_realm]
    .example.org = EXAMPLE.ORG

[logging]
    default = FILE:/var/log/krb5libs.log
"#;

    #[test]
    fn test_parse_sample() {
        let config = Krb5Config::parse(SAMPLE).unwrap();

        assert_eq!(config.default_realm(), Some("EXAMPLE.ORG"));
        assert!(!config.dns_lookup_kdc());
        assert_eq!(
            config.kdcs("EXAMPLE.ORG"),
            &["kdc1.example.org".to_string(), "kdc2.example.org:88".to_string()]
        );

        let realm = &config.realms["EXAMPLE.ORG"];
        assert_eq!(realm.admin_server, vec!["kadmin.example.org".to_string()]);
        assert_eq!(realm.default_domain.as_deref(), Some("example.org"));
        assert_eq!(realm.other["v4_name_convert"], vec!["weird".to_string()]);
        assert!(!realm.other.contains_key("alice"));
        assert!(!realm.other.contains_key("auth_to_local_names"));

        assert!(config.realms["EMPTY.ORG"].kdc.is_empty());
        assert_eq!(config.domain_realm[".example.org"], "EXAMPLE.ORG");
        assert!(config.source().is_none());
    }

    #[test]
    fn test_locate_kdc() {
        let config = Krb5Config::parse(SAMPLE).unwrap();
        assert!(config.can_locate_kdc("EXAMPLE.ORG"));
        assert!(!config.can_locate_kdc("EMPTY.ORG"));
        assert!(!config.can_locate_kdc("UNKNOWN.ORG"));

        let dns = Krb5Config::parse("[libdefaults]\n dns_lookup_kdc = yes\n").unwrap();
        assert!(dns.can_locate_kdc("UNKNOWN.ORG"));
    }

    #[test]
    fn test_unclosed_group_is_an_error() {
        let err = Krb5Config::parse("[realms]\nA.ORG = {\n kdc = a\n").unwrap_err();
        match err {
            Krb5Error::ConfigParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_relation_outside_section() {
        assert!(Krb5Config::parse("default_realm = A.ORG\n").is_err());
        assert!(Krb5Config::parse("[libdefaults]\njust some words\n").is_err());
        assert!(Krb5Config::parse("[realms]\n}\n").is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = Krb5Config::load(Path::new("/nonexistent/krb5.conf")).await.unwrap_err();
        assert!(matches!(err, Krb5Error::Io { .. }));
    }

    #[tokio::test]
    async fn test_load_records_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("krb5.conf");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Krb5Config::load(&path).await.unwrap();
        assert_eq!(config.source(), Some(path.as_path()));
    }
}
