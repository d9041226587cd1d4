//! TOML configuration: backend client settings and the NF type catalog.
//!
//! ```toml
//! [backend]
//! timeout_ms = 5000
//! retry_on_timeout = true
//!
//! [types.firewall]
//! description = "Stateful packet filter"
//!
//! [[types.firewall.attributes]]
//! name = "max_conns"
//! kind = "integer"
//! min = 1
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::address::{is_valid_attr_key, is_valid_type_name};
use crate::backend::ClientSettings;
use crate::catalog::{Access, AttrKind, AttrSpec, COMMON_ATTRIBUTES, NfTypeSpec, TypeCatalog};

/// Embedded default configuration.
pub const DEFAULT_CONFIG: &str = include_str!("../../../assets/defaults/nfio.toml");

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid type {nf_type}: {reason}")]
    InvalidType { nf_type: String, reason: String },

    #[error("no NF types declared")]
    Empty,
}

impl ConfigError {
    fn invalid(nf_type: &str, reason: impl Into<String>) -> Self {
        Self::InvalidType {
            nf_type: nf_type.to_string(),
            reason: reason.into(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct NfioConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub types: BTreeMap<String, TypeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub retry_on_timeout: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_on_timeout: true,
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeConfig {
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindName {
    Text,
    Integer,
    Boolean,
    Enum,
    Record,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    pub kind: KindName,
    #[serde(default = "default_access")]
    pub access: Access,
    pub min: Option<i64>,
    pub max: Option<i64>,
    #[serde(default)]
    pub values: Vec<String>,
}

fn default_access() -> Access {
    Access::ReadWrite
}

impl NfioConfig {
    /// The built-in configuration (firewall, proxy, ids).
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::parse(DEFAULT_CONFIG)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            timeout: Duration::from_millis(self.backend.timeout_ms),
            retry_on_timeout: self.backend.retry_on_timeout,
        }
    }

    /// Validate the declared types and build the catalog.
    pub fn catalog(&self) -> Result<TypeCatalog, ConfigError> {
        if self.types.is_empty() {
            return Err(ConfigError::Empty);
        }
        let types = self
            .types
            .iter()
            .map(|(name, cfg)| build_type(name, cfg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TypeCatalog::new(types))
    }
}

fn build_type(name: &str, cfg: &TypeConfig) -> Result<NfTypeSpec, ConfigError> {
    if !is_valid_type_name(name) {
        return Err(ConfigError::invalid(name, "type names are [a-z][a-z0-9_-]*"));
    }

    let mut seen = HashSet::new();
    let mut spec = NfTypeSpec::new(name);
    spec.description = cfg.description.clone();

    for attr in &cfg.attributes {
        if !is_valid_attr_key(&attr.name) {
            return Err(ConfigError::invalid(
                name,
                format!("attribute name {:?} is not [a-z][a-z0-9_]*", attr.name),
            ));
        }
        if COMMON_ATTRIBUTES.contains(&attr.name.as_str()) {
            return Err(ConfigError::invalid(
                name,
                format!("attribute {} shadows a common attribute", attr.name),
            ));
        }
        if !seen.insert(attr.name.as_str()) {
            return Err(ConfigError::invalid(
                name,
                format!("attribute {} declared twice", attr.name),
            ));
        }

        let kind = match attr.kind {
            KindName::Text => AttrKind::Text,
            KindName::Boolean => AttrKind::Boolean,
            KindName::Record => AttrKind::Record,
            KindName::Integer => {
                match (attr.min, attr.max) {
                    (Some(lo), Some(hi)) if lo > hi => {
                        return Err(ConfigError::invalid(
                            name,
                            format!("attribute {}: min {lo} exceeds max {hi}", attr.name),
                        ));
                    }
                    _ => {}
                }
                AttrKind::Integer {
                    min: attr.min,
                    max: attr.max,
                }
            }
            KindName::Enum => {
                if attr.values.is_empty() {
                    return Err(ConfigError::invalid(
                        name,
                        format!("enum attribute {} declares no values", attr.name),
                    ));
                }
                AttrKind::Enum(attr.values.clone())
            }
        };
        spec.extensions.push(AttrSpec::new(&attr.name, kind, attr.access));
    }

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_catalog() {
        let config = NfioConfig::builtin().unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.names(), vec!["firewall", "ids", "proxy"]);

        let fw = catalog.get("firewall").unwrap();
        assert_eq!(
            fw.attr("max_conns").unwrap().kind,
            AttrKind::Integer {
                min: Some(1),
                max: Some(1_000_000)
            }
        );
        let alerts = catalog.get("ids").unwrap().attr("alerts").unwrap();
        assert_eq!(alerts.access, Access::ReadOnly);

        let settings = config.client_settings();
        assert_eq!(settings.timeout, Duration::from_millis(5000));
        assert!(settings.retry_on_timeout);
    }

    #[test]
    fn test_backend_defaults() {
        let config = NfioConfig::parse("[types.router]\n").unwrap();
        assert_eq!(config.backend.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(config.backend.retry_on_timeout);
        let catalog = config.catalog().unwrap();
        assert!(catalog.get("router").unwrap().extensions.is_empty());
    }

    #[test]
    fn test_rejects_shadowing_common_attribute() {
        let config = NfioConfig::parse(
            r#"
            [[types.router.attributes]]
            name = "status"
            kind = "text"
            "#,
        )
        .unwrap();
        assert!(matches!(config.catalog(), Err(ConfigError::InvalidType { .. })));
    }

    #[test]
    fn test_rejects_duplicates_and_empty_enums() {
        let dup = NfioConfig::parse(
            r#"
            [[types.router.attributes]]
            name = "mtu"
            kind = "integer"
            [[types.router.attributes]]
            name = "mtu"
            kind = "text"
            "#,
        )
        .unwrap();
        assert!(dup.catalog().is_err());

        let empty_enum = NfioConfig::parse(
            r#"
            [[types.router.attributes]]
            name = "mode"
            kind = "enum"
            "#,
        )
        .unwrap();
        assert!(empty_enum.catalog().is_err());
    }

    #[test]
    fn test_rejects_bad_type_name() {
        let config = NfioConfig::parse("[types.Router]\n").unwrap();
        assert!(config.catalog().is_err());
        assert!(matches!(
            NfioConfig::parse("").unwrap().catalog(),
            Err(ConfigError::Empty)
        ));
    }

    #[test]
    fn test_unknown_kind_is_parse_error() {
        let err = NfioConfig::parse(
            r#"
            [[types.router.attributes]]
            name = "mtu"
            kind = "float"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\ntimeout_ms = 250\n\n[types.nat]\n").unwrap();

        let config = NfioConfig::from_file(file.path()).unwrap();
        assert_eq!(config.client_settings().timeout, Duration::from_millis(250));
        assert_eq!(config.catalog().unwrap().names(), vec!["nat"]);

        assert!(matches!(
            NfioConfig::from_file("/nonexistent/nfio.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
