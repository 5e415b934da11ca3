//! Configuration for datagate
//!
//! CLI arguments and environment variable handling using clap. Everything the
//! request path needs is turned into explicit values (`BrokerConfig`,
//! `AttributeSchema`, `StoreTarget`) at startup and handed to the components
//! that use them.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::auth::BrokerConfig;
use crate::ingest::StoreTarget;
use crate::schema::AttributeSchema;

/// datagate - ticket authenticated data registration gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "datagate")]
#[command(about = "Authenticates callers with Kerberos tickets and registers their data records")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8300")]
    pub listen: SocketAddr,

    /// Kerberos configuration
    #[command(flatten)]
    pub krb5: Krb5Args,

    /// Comma-separated attributes every record must carry
    #[arg(long, env = "MANDATORY_ATTRS", default_value = "path,experiment,processing,tier")]
    pub mandatory_attrs: String,

    /// Comma-separated second set of attributes every record must carry
    #[arg(long, env = "ADJUSTABLE_ATTRS", default_value = "")]
    pub adjustable_attrs: String,

    /// JSON schema file ({"mandatory": [...], "adjustable": [...]}); overrides the lists above
    #[arg(long, env = "SCHEMA_FILE")]
    pub schema_file: Option<PathBuf>,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name for record metadata
    #[arg(long, env = "MONGODB_DB", default_value = "datagate")]
    pub mongodb_db: String,

    /// MongoDB collection for record metadata
    #[arg(long, env = "MONGODB_COLLECTION", default_value = "records")]
    pub mongodb_collection: String,

    /// Secret used to seal session cookies. Without it cookies are not verified.
    #[arg(long, env = "SESSION_SECRET")]
    pub session_secret: Option<String>,

    /// Session lifetime in seconds
    #[arg(long, env = "SESSION_MAX_AGE", default_value = "86400")]
    pub session_max_age: u64,

    /// Mark session cookies Secure (only sent over HTTPS)
    #[arg(long, env = "SECURE_COOKIES", default_value = "false")]
    pub secure_cookies: bool,

    /// Maximum accepted request body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

/// Kerberos configuration
#[derive(Parser, Debug, Clone)]
pub struct Krb5Args {
    /// Realm configuration file
    #[arg(long, env = "KRB5_CONF", default_value = "/etc/krb5.conf")]
    pub krb5_conf: PathBuf,

    /// Realm for password logins (defaults to krb5.conf default_realm)
    #[arg(long, env = "REALM")]
    pub realm: Option<String>,

    /// kinit binary used for password logins
    #[arg(long, env = "KINIT_PATH", default_value = "kinit")]
    pub kinit_path: PathBuf,

    /// Directory where uploaded tickets are spooled
    #[arg(long, env = "TICKET_DIR", default_value = "/tmp")]
    pub ticket_dir: PathBuf,
}

impl Args {
    /// Build the attribute schema (file wins over the attribute lists)
    pub fn schema(&self) -> crate::Result<AttributeSchema> {
        match &self.schema_file {
            Some(path) => AttributeSchema::load(path),
            None => Ok(AttributeSchema::new(
                split_list(&self.mandatory_attrs),
                split_list(&self.adjustable_attrs),
            )),
        }
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            krb5_conf: self.krb5.krb5_conf.clone(),
            realm: self.krb5.realm.clone().filter(|r| !r.is_empty()),
            ticket_dir: self.krb5.ticket_dir.clone(),
        }
    }

    pub fn store_target(&self) -> StoreTarget {
        StoreTarget {
            db: self.mongodb_db.clone(),
            collection: self.mongodb_collection.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.mongodb_db.is_empty() || self.mongodb_collection.is_empty() {
            return Err("MONGODB_DB and MONGODB_COLLECTION must not be empty".to_string());
        }

        if self.session_max_age == 0 {
            return Err("SESSION_MAX_AGE must be positive".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be positive".to_string());
        }

        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(format!("LOG_FORMAT must be 'text' or 'json', got '{}'", self.log_format));
        }

        Ok(())
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
