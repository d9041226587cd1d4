//! Typed attribute values.
//!
//! Every attribute file is backed by exactly one `AttrValue`. The canonical
//! text form produced by [`AttrValue::encode`] is deterministic: the same
//! value always yields the same bytes. Decoding depends on the attribute's
//! declared kind and lives with the schema in the kernel.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::{Action, InstanceStatus};

/// Structured `key=value` record. Sorted, so its encoding is stable.
pub type Record = BTreeMap<String, String>;

/// Value of one instance attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Status(InstanceStatus),
    Action(Action),
    /// One of a declared set of symbols.
    Enum(String),
    Record(Record),
}

impl AttrValue {
    /// Short name of the value's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::Text(_) => "text",
            AttrValue::Integer(_) => "integer",
            AttrValue::Boolean(_) => "boolean",
            AttrValue::Status(_) => "status",
            AttrValue::Action(_) => "action",
            AttrValue::Enum(_) => "enum",
            AttrValue::Record(_) => "record",
        }
    }

    /// Canonical text encoding.
    ///
    /// Scalars carry no trailing newline. Records are one `key=value` line
    /// per entry, each newline-terminated, in key order.
    pub fn encode(&self) -> String {
        match self {
            AttrValue::Text(s) | AttrValue::Enum(s) => s.clone(),
            AttrValue::Integer(n) => n.to_string(),
            AttrValue::Boolean(b) => b.to_string(),
            AttrValue::Status(s) => s.as_str().to_string(),
            AttrValue::Action(a) => a.as_str().to_string(),
            AttrValue::Record(map) => {
                let mut out = String::new();
                for (k, v) in map {
                    out.push_str(k);
                    out.push('=');
                    out.push_str(v);
                    out.push('\n');
                }
                out
            }
        }
    }

    pub fn as_status(&self) -> Option<InstanceStatus> {
        match self {
            AttrValue::Status(s) => Some(*s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(AttrValue::Status(InstanceStatus::Running).encode(), "Running");
        assert_eq!(AttrValue::Integer(-7).encode(), "-7");
        assert_eq!(AttrValue::Boolean(true).encode(), "true");
        assert_eq!(AttrValue::Action(Action::Unpause).encode(), "unpause");
    }

    #[test]
    fn test_encode_record_is_sorted() {
        let mut rec = Record::new();
        rec.insert("zone".into(), "dmz".into());
        rec.insert("mode".into(), "strict".into());
        assert_eq!(AttrValue::Record(rec).encode(), "mode=strict\nzone=dmz\n");
    }

    #[test]
    fn test_empty_record_encodes_empty() {
        assert_eq!(AttrValue::Record(Record::new()).encode(), "");
    }
}
