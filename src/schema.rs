//! Attribute schema and record validation
//!
//! The schema holds two independently required key sets. Both are loaded once
//! at startup and shared read-only between requests.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::record::Record;
use crate::types::GatewayError;

/// Required record attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AttributeSchema {
    #[serde(default, alias = "MandatoryAttrs")]
    mandatory: BTreeSet<String>,
    #[serde(default, alias = "AdjustableAttrs")]
    adjustable: BTreeSet<String>,
}

/// Schema validation failures.
///
/// `keys` is every attribute of the record, `matched` the subset found in the
/// schema set, `missing` what the record lacks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error(
        "List of records keys does not have all mandatory attributes\n\
         List of records keys: {keys:?}\n\
         List of mandatory attrs: {matched:?}\n\
         Missing mandatory attrs: {missing:?}"
    )]
    MissingMandatoryAttrs {
        keys: Vec<String>,
        matched: Vec<String>,
        missing: Vec<String>,
    },

    #[error(
        "List of records keys does not have all adjustable attributes\n\
         List of records keys: {keys:?}\n\
         List of adjustable attrs: {matched:?}\n\
         Missing adjustable attrs: {missing:?}"
    )]
    MissingAdjustableAttrs {
        keys: Vec<String>,
        matched: Vec<String>,
        missing: Vec<String>,
    },
}

impl AttributeSchema {
    /// Build a schema from attribute names. Blank names are dropped.
    pub fn new<M, A>(mandatory: M, adjustable: A) -> Self
    where
        M: IntoIterator,
        M::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        Self {
            mandatory: clean(mandatory),
            adjustable: clean(adjustable),
        }
    }

    /// Load a schema from a JSON file:
    /// `{"mandatory": [...], "adjustable": [...]}`
    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("unable to read schema {}: {}", path.display(), e))
        })?;
        let raw: AttributeSchema = serde_json::from_str(&text).map_err(|e| {
            GatewayError::Config(format!("invalid schema {}: {}", path.display(), e))
        })?;
        Ok(Self::new(raw.mandatory, raw.adjustable))
    }

    pub fn mandatory(&self) -> &BTreeSet<String> {
        &self.mandatory
    }

    pub fn adjustable(&self) -> &BTreeSet<String> {
        &self.adjustable
    }

    /// Check that a record carries every mandatory and every adjustable attribute.
    ///
    /// Record keys are unique, so comparing the size of the matched subset with
    /// the size of the schema set is the same as checking set inclusion.
    pub fn validate(&self, record: &Record) -> Result<(), SchemaError> {
        let keys: Vec<String> = record.keys().map(str::to_string).collect();

        // Keys come out of the record sorted, so both subsets are sorted too.
        let m_keys: Vec<String> = keys
            .iter()
            .filter(|k| self.mandatory.contains(*k))
            .cloned()
            .collect();
        let a_keys: Vec<String> = keys
            .iter()
            .filter(|k| self.adjustable.contains(*k))
            .cloned()
            .collect();

        if m_keys.len() != self.mandatory.len() {
            return Err(SchemaError::MissingMandatoryAttrs {
                missing: missing(&self.mandatory, record),
                keys,
                matched: m_keys,
            });
        }
        if a_keys.len() != self.adjustable.len() {
            return Err(SchemaError::MissingAdjustableAttrs {
                missing: missing(&self.adjustable, record),
                keys,
                matched: a_keys,
            });
        }
        Ok(())
    }
}

fn clean<I>(names: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| n.as_ref().trim().to_string())
        .filter(|n| !n.is_empty())
        .collect()
}

fn missing(required: &BTreeSet<String>, record: &Record) -> Vec<String> {
    required
        .iter()
        .filter(|k| !record.contains_key(k))
        .cloned()
        .collect()
}
