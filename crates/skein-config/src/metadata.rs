//! Free-form key/value metadata advertised to discovery.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Ordered string map accepted either as a table or as `key=value,...` text.
///
/// The text form lets the map travel through a single environment variable
/// or command-line flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Returns the underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl From<BTreeMap<String, String>> for Metadata {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl From<Metadata> for BTreeMap<String, String> {
    fn from(metadata: Metadata) -> Self {
        metadata.0
    }
}

impl FromStr for Metadata {
    type Err = MetadataParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut map = BTreeMap::new();
        for entry in input.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let Some((raw_key, value)) = entry.split_once('=') else {
                return Err(MetadataParseError::MissingValue(entry.to_owned()));
            };
            let key = raw_key.trim();
            if key.is_empty() {
                return Err(MetadataParseError::MissingKey(entry.to_owned()));
            }
            map.insert(key.to_owned(), value.trim().to_owned());
        }
        Ok(Self(map))
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut separator = "";
        for (key, value) in &self.0 {
            write!(formatter, "{separator}{key}={value}")?;
            separator = ",";
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MetadataRepr {
    Table(BTreeMap<String, String>),
    Text(String),
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match MetadataRepr::deserialize(deserializer)? {
            MetadataRepr::Table(map) => Ok(Self(map)),
            MetadataRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Errors raised while parsing `key=value` metadata text.
#[derive(Debug, Error)]
pub enum MetadataParseError {
    /// The entry had no `=`.
    #[error("metadata entry '{0}' is missing the assignment '='")]
    MissingValue(String),
    /// The entry had an empty key.
    #[error("metadata entry '{0}' has an empty key")]
    MissingKey(String),
}
