//! NF type catalog and attribute schemas.
//!
//! Types are declared by configuration and are read-only to the kernel: it
//! lists and validates against them, it never creates or deletes them.
//!
//! Every type shares the common attribute set below. A type may declare
//! extension attributes on top; the backend may additionally report
//! per-instance extension keys, which are treated as read-write text.
//!
//! | name     | kind    | access     |
//! |----------|---------|------------|
//! | `status` | status  | read-only  |
//! | `config` | record  | read-write |
//! | `action` | action  | write-only |
//! | `id`     | text    | read-only  |
//! | `ip`     | text    | read-only  |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared value kind of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrKind {
    Text,
    /// Signed integer, optionally range-checked.
    Integer { min: Option<i64>, max: Option<i64> },
    Boolean,
    /// Backend-reported run status.
    Status,
    /// Control verb.
    Action,
    /// One of a declared set of symbols.
    Enum(Vec<String>),
    /// `key=value` lines.
    Record,
}

impl AttrKind {
    pub fn name(&self) -> &'static str {
        match self {
            AttrKind::Text => "text",
            AttrKind::Integer { .. } => "integer",
            AttrKind::Boolean => "boolean",
            AttrKind::Status => "status",
            AttrKind::Action => "action",
            AttrKind::Enum(_) => "enum",
            AttrKind::Record => "record",
        }
    }
}

/// Who may read or write an attribute through the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::ReadOnly => "read-only",
            Access::ReadWrite => "read-write",
            Access::WriteOnly => "write-only",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema entry for one attribute file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSpec {
    pub name: String,
    pub kind: AttrKind,
    pub access: Access,
}

impl AttrSpec {
    pub fn new(name: impl Into<String>, kind: AttrKind, access: Access) -> Self {
        Self {
            name: name.into(),
            kind,
            access,
        }
    }

    /// Spec for an extension key the backend reported but the catalog does not declare.
    pub fn backend_extension(name: impl Into<String>) -> Self {
        Self::new(name, AttrKind::Text, Access::ReadWrite)
    }

    pub fn readable(&self) -> bool {
        matches!(self.access, Access::ReadOnly | Access::ReadWrite)
    }

    pub fn writable(&self) -> bool {
        matches!(self.access, Access::ReadWrite | Access::WriteOnly)
    }

    /// Unix permission bits presented to the transport.
    pub fn perm(&self) -> u32 {
        match self.access {
            Access::ReadOnly => 0o444,
            Access::ReadWrite => 0o644,
            Access::WriteOnly => 0o200,
        }
    }

    /// One line of the `.schema` file.
    pub fn schema_line(&self) -> String {
        match &self.kind {
            AttrKind::Integer { min, max } => {
                let lo = min.map(|v| v.to_string()).unwrap_or_default();
                let hi = max.map(|v| v.to_string()).unwrap_or_default();
                format!("{} integer[{lo}..{hi}] {}", self.name, self.access)
            }
            AttrKind::Enum(values) => {
                format!("{} enum[{}] {}", self.name, values.join("|"), self.access)
            }
            kind => format!("{} {} {}", self.name, kind.name(), self.access),
        }
    }
}

/// Names of the attributes every NF type carries.
pub const COMMON_ATTRIBUTES: &[&str] = &["status", "config", "action", "id", "ip"];

/// The common attribute set, in listing order.
pub fn common_attributes() -> Vec<AttrSpec> {
    vec![
        AttrSpec::new("status", AttrKind::Status, Access::ReadOnly),
        AttrSpec::new("config", AttrKind::Record, Access::ReadWrite),
        AttrSpec::new("action", AttrKind::Action, Access::WriteOnly),
        AttrSpec::new("id", AttrKind::Text, Access::ReadOnly),
        AttrSpec::new("ip", AttrKind::Text, Access::ReadOnly),
    ]
}

/// A declared NF type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfTypeSpec {
    pub name: String,
    pub description: Option<String>,
    /// Type-specific attributes beyond the common set.
    pub extensions: Vec<AttrSpec>,
}

impl NfTypeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            extensions: Vec::new(),
        }
    }

    pub fn with_extension(mut self, spec: AttrSpec) -> Self {
        self.extensions.push(spec);
        self
    }

    /// Full schema: common attributes followed by extensions.
    pub fn schema(&self) -> Vec<AttrSpec> {
        let mut all = common_attributes();
        all.extend(self.extensions.iter().cloned());
        all
    }

    /// Look up one attribute of this type's schema.
    pub fn attr(&self, key: &str) -> Option<AttrSpec> {
        self.schema().into_iter().find(|a| a.name == key)
    }

    /// Content of the type's `.schema` file.
    pub fn render_schema(&self) -> String {
        let mut out = String::new();
        for spec in self.schema() {
            out.push_str(&spec.schema_line());
            out.push('\n');
        }
        out
    }
}

/// The set of declared NF types, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: Vec<NfTypeSpec>,
}

impl TypeCatalog {
    /// Build a catalog. Types are sorted by name for a stable listing.
    pub fn new(mut types: Vec<NfTypeSpec>) -> Self {
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Self { types }
    }

    pub fn get(&self, name: &str) -> Option<&NfTypeSpec> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.types.iter().map(|t| t.name.clone()).collect()
    }

    pub fn types(&self) -> &[NfTypeSpec] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firewall() -> NfTypeSpec {
        NfTypeSpec::new("firewall").with_extension(AttrSpec::new(
            "max_conns",
            AttrKind::Integer {
                min: Some(1),
                max: Some(65535),
            },
            Access::ReadWrite,
        ))
    }

    #[test]
    fn test_schema_includes_common_then_extensions() {
        let names: Vec<_> = firewall().schema().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["status", "config", "action", "id", "ip", "max_conns"]);
    }

    #[test]
    fn test_access_predicates() {
        let fw = firewall();
        let status = fw.attr("status").unwrap();
        assert!(status.readable());
        assert!(!status.writable());
        assert_eq!(status.perm(), 0o444);

        let action = fw.attr("action").unwrap();
        assert!(!action.readable());
        assert!(action.writable());
        assert_eq!(action.perm(), 0o200);

        assert!(fw.attr("nope").is_none());
    }

    #[test]
    fn test_render_schema() {
        let rendered = firewall().render_schema();
        assert!(rendered.starts_with("status status read-only\n"));
        assert!(rendered.contains("max_conns integer[1..65535] read-write\n"));
    }

    #[test]
    fn test_catalog_sorted() {
        let catalog = TypeCatalog::new(vec![NfTypeSpec::new("proxy"), NfTypeSpec::new("ids")]);
        assert_eq!(catalog.names(), vec!["ids", "proxy"]);
        assert!(catalog.contains("proxy"));
        assert!(!catalog.contains("fw"));
    }
}
