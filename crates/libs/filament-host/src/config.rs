use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::HostError;

#[derive(Debug, Deserialize)]
pub struct HostConfig {
    pub node: NodeSection,
    #[serde(default)]
    pub trust: Vec<TrustEntry>,
    #[serde(default)]
    pub cipher: Option<CipherSection>,
}

#[derive(Debug, Deserialize)]
pub struct NodeSection {
    pub id: String,
    #[serde(default)]
    pub isolated: bool,
}

/// One row of the sender classification table.
#[derive(Debug, Deserialize)]
pub struct TrustEntry {
    pub id: String,
    pub class: String,
}

#[derive(Debug, Deserialize)]
pub struct CipherSection {
    pub name: String,
    #[serde(default)]
    pub key_hex: Option<String>,
}

impl HostConfig {
    pub fn from_toml(input: &str) -> Result<Self, HostError> {
        toml::from_str(input).map_err(|err| HostError::Config(err.to_string()))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, HostError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }
}
