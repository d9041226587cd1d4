//! Resource address resolution.
//!
//! Maps a mount-relative path onto the fixed two-root namespace:
//!
//! ```text
//! /
//! ├── nf-types/                       TypeCatalog
//! │   └── <type>/                     InstanceCollection(type)
//! │       ├── .schema                 NfType(type)
//! │       └── <name>/                 Instance(type, name)
//! │           └── <attr>              InstanceAttribute(type, name, attr)
//! └── chns/                           ChannelCollection
//!     └── <name>/                     Channel(name)
//!         └── <attr>                  ChannelAttribute(name, attr)
//! ```
//!
//! Resolution is purely syntactic. An unknown type or instance name resolves
//! fine; whether it exists is a question for the catalog or the backend.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use nfio_types::InstanceKey;

use crate::error::{NfError, NfResult};

/// First path segment of the NF type tree.
pub const TYPES_ROOT: &str = "nf-types";

/// First path segment of the channel tree.
pub const CHANNELS_ROOT: &str = "chns";

/// Per-type schema file inside an instance collection.
pub const SCHEMA_FILE: &str = ".schema";

static TYPE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]{0,63}$").expect("static regex"));

static INSTANCE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$").expect("static regex"));

static ATTR_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,63}$").expect("static regex"));

static CHANNEL_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:+-]{0,255}$").expect("static regex"));

pub fn is_valid_type_name(s: &str) -> bool {
    TYPE_NAME.is_match(s)
}

pub fn is_valid_instance_name(s: &str) -> bool {
    INSTANCE_NAME.is_match(s)
}

pub fn is_valid_attr_key(s: &str) -> bool {
    ATTR_KEY.is_match(s)
}

pub fn is_valid_channel_segment(s: &str) -> bool {
    CHANNEL_SEGMENT.is_match(s)
}

/// Typed identity of a path within the synthetic namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceAddress {
    Root,
    TypeCatalog,
    /// Catalog entry of one NF type (its `.schema` file).
    NfType(String),
    InstanceCollection(String),
    Instance(InstanceKey),
    InstanceAttribute(InstanceKey, String),
    ChannelCollection,
    /// A channel by backend name, or a channel request by endpoint pair.
    Channel(String),
    ChannelAttribute(String, String),
}

impl ResourceAddress {
    pub fn instance(nf_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Instance(InstanceKey::new(nf_type, name))
    }

    pub fn attribute(
        nf_type: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::InstanceAttribute(InstanceKey::new(nf_type, name), key.into())
    }

    /// True for addresses that present as directories.
    pub fn is_directory(&self) -> bool {
        matches!(
            self,
            ResourceAddress::Root
                | ResourceAddress::TypeCatalog
                | ResourceAddress::InstanceCollection(_)
                | ResourceAddress::Instance(_)
                | ResourceAddress::ChannelCollection
                | ResourceAddress::Channel(_)
        )
    }

    /// The instance an address belongs to, if any.
    pub fn instance_key(&self) -> Option<&InstanceKey> {
        match self {
            ResourceAddress::Instance(key) | ResourceAddress::InstanceAttribute(key, _) => {
                Some(key)
            }
            _ => None,
        }
    }

    /// Render the address back to its mount-relative path.
    pub fn path(&self) -> String {
        match self {
            ResourceAddress::Root => String::new(),
            ResourceAddress::TypeCatalog => TYPES_ROOT.to_string(),
            ResourceAddress::NfType(t) => format!("{TYPES_ROOT}/{t}/{SCHEMA_FILE}"),
            ResourceAddress::InstanceCollection(t) => format!("{TYPES_ROOT}/{t}"),
            ResourceAddress::Instance(key) => {
                format!("{TYPES_ROOT}/{}/{}", key.nf_type, key.name)
            }
            ResourceAddress::InstanceAttribute(key, attr) => {
                format!("{TYPES_ROOT}/{}/{}/{attr}", key.nf_type, key.name)
            }
            ResourceAddress::ChannelCollection => CHANNELS_ROOT.to_string(),
            ResourceAddress::Channel(name) => format!("{CHANNELS_ROOT}/{name}"),
            ResourceAddress::ChannelAttribute(name, attr) => {
                format!("{CHANNELS_ROOT}/{name}/{attr}")
            }
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path())
    }
}

/// Resolve a mount-relative path to a resource address.
///
/// Leading, trailing and repeated slashes are ignored. `.` and `..` are not
/// part of the grammar and fail with `NotFound` like any other mismatch.
pub fn resolve(path: &str) -> NfResult<ResourceAddress> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let not_found = || NfError::not_found(path.to_string());

    let address = match segments.as_slice() {
        [] => ResourceAddress::Root,

        [TYPES_ROOT] => ResourceAddress::TypeCatalog,
        [TYPES_ROOT, t] if is_valid_type_name(t) => {
            ResourceAddress::InstanceCollection(t.to_string())
        }
        [TYPES_ROOT, t, SCHEMA_FILE] if is_valid_type_name(t) => {
            ResourceAddress::NfType(t.to_string())
        }
        [TYPES_ROOT, t, n] if is_valid_type_name(t) && is_valid_instance_name(n) => {
            ResourceAddress::instance(*t, *n)
        }
        [TYPES_ROOT, t, n, k]
            if is_valid_type_name(t) && is_valid_instance_name(n) && is_valid_attr_key(k) =>
        {
            ResourceAddress::attribute(*t, *n, *k)
        }

        [CHANNELS_ROOT] => ResourceAddress::ChannelCollection,
        [CHANNELS_ROOT, c] if is_valid_channel_segment(c) => {
            ResourceAddress::Channel(c.to_string())
        }
        [CHANNELS_ROOT, c, k] if is_valid_channel_segment(c) && is_valid_attr_key(k) => {
            ResourceAddress::ChannelAttribute(c.to_string(), k.to_string())
        }

        _ => return Err(not_found()),
    };

    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots() {
        assert_eq!(resolve("").unwrap(), ResourceAddress::Root);
        assert_eq!(resolve("/").unwrap(), ResourceAddress::Root);
        assert_eq!(resolve("nf-types").unwrap(), ResourceAddress::TypeCatalog);
        assert_eq!(resolve("/chns/").unwrap(), ResourceAddress::ChannelCollection);
    }

    #[test]
    fn test_type_tree() {
        assert_eq!(
            resolve("nf-types/fw").unwrap(),
            ResourceAddress::InstanceCollection("fw".into())
        );
        assert_eq!(
            resolve("/nf-types/fw/fw1").unwrap(),
            ResourceAddress::instance("fw", "fw1")
        );
        assert_eq!(
            resolve("nf-types/fw/fw1/status").unwrap(),
            ResourceAddress::attribute("fw", "fw1", "status")
        );
        assert_eq!(
            resolve("nf-types/fw/.schema").unwrap(),
            ResourceAddress::NfType("fw".into())
        );
    }

    #[test]
    fn test_unknown_type_is_still_valid() {
        // Existence is a backend question.
        assert!(resolve("nf-types/nonexistent/x1").is_ok());
    }

    #[test]
    fn test_channel_tree() {
        assert_eq!(
            resolve("chns/fw:fw1+proxy:p1").unwrap(),
            ResourceAddress::Channel("fw:fw1+proxy:p1".into())
        );
        assert_eq!(
            resolve("chns/ch-0001/state").unwrap(),
            ResourceAddress::ChannelAttribute("ch-0001".into(), "state".into())
        );
    }

    #[test]
    fn test_grammar_mismatches() {
        for path in [
            "etc",
            "nf-types/FW",
            "nf-types/fw/.hidden",
            "nf-types/fw/fw1/status/extra",
            "nf-types/fw/fw1/Status",
            "nf-types/fw/..",
            "chns/a/b/c",
            "chns/.x",
        ] {
            assert!(
                matches!(resolve(path), Err(NfError::NotFound(_))),
                "{path} should not resolve"
            );
        }
    }

    #[test]
    fn test_path_round_trip() {
        for path in [
            "nf-types",
            "nf-types/fw",
            "nf-types/fw/.schema",
            "nf-types/fw/fw1",
            "nf-types/fw/fw1/config",
            "chns",
            "chns/ch-1",
            "chns/ch-1/src",
        ] {
            assert_eq!(resolve(path).unwrap().path(), path);
        }
    }

    #[test]
    fn test_directory_classes() {
        assert!(resolve("nf-types/fw/fw1").unwrap().is_directory());
        assert!(!resolve("nf-types/fw/fw1/status").unwrap().is_directory());
        assert!(!resolve("nf-types/fw/.schema").unwrap().is_directory());
        assert_eq!(
            resolve("nf-types/fw/fw1/ip").unwrap().instance_key(),
            Some(&InstanceKey::new("fw", "fw1"))
        );
    }
}
