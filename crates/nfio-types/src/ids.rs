//! Identifiers for NF instances and channels.
//!
//! `InstanceKey` is the caller-facing identity (the path components under
//! `nf-types/`). `InstanceId` and `ChannelName` are opaque strings handed out
//! by the orchestration backend; the kernel never invents or parses them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between the type and the instance name of one endpoint.
pub const ENDPOINT_SEPARATOR: char = ':';

/// Separator between the two endpoints of a channel request.
pub const PAIR_SEPARATOR: char = '+';

/// Identity of an NF instance: its type plus its name.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct InstanceKey {
    pub nf_type: String,
    pub name: String,
}

impl InstanceKey {
    pub fn new(nf_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            nf_type: nf_type.into(),
            name: name.into(),
        }
    }

    /// Endpoint form used inside channel requests (`type:name`).
    pub fn endpoint(&self) -> String {
        format!("{}{}{}", self.nf_type, ENDPOINT_SEPARATOR, self.name)
    }

    /// Parse the `type:name` endpoint form.
    pub fn parse_endpoint(s: &str) -> Option<Self> {
        let (nf_type, name) = s.split_once(ENDPOINT_SEPARATOR)?;
        if nf_type.is_empty() || name.is_empty() || name.contains(ENDPOINT_SEPARATOR) {
            return None;
        }
        Some(Self::new(nf_type, name))
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.nf_type, self.name)
    }
}

impl fmt::Debug for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceKey({}/{})", self.nf_type, self.name)
    }
}

// ── Opaque backend identifiers ──────────────────────────────────────────────

macro_rules! impl_opaque_id {
    ($T:ident, $name:literal) => {
        impl $T {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }
    };
}

/// Backend-assigned instance identifier.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

/// Backend-assigned channel identifier. Doubles as the directory name under `chns/`.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl_opaque_id!(InstanceId, "InstanceId");
impl_opaque_id!(ChannelName, "ChannelName");

// ── Channel endpoints ───────────────────────────────────────────────────────

/// A caller's request to link `source` to `destination`.
///
/// Written as `srcType:srcName+dstType:dstName`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub source: InstanceKey,
    pub destination: InstanceKey,
}

impl ChannelRequest {
    pub fn new(source: InstanceKey, destination: InstanceKey) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Parse `srcType:srcName+dstType:dstName`.
    pub fn parse(s: &str) -> Option<Self> {
        let (a, b) = s.split_once(PAIR_SEPARATOR)?;
        if b.contains(PAIR_SEPARATOR) {
            return None;
        }
        Some(Self::new(
            InstanceKey::parse_endpoint(a)?,
            InstanceKey::parse_endpoint(b)?,
        ))
    }

    /// True when both endpoints name the same instance.
    pub fn is_loop(&self) -> bool {
        self.source == self.destination
    }

    /// The unordered pair this request would occupy.
    pub fn pair(&self) -> PairKey {
        PairKey::new(self.source.clone(), self.destination.clone())
    }
}

impl fmt::Display for ChannelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.source.endpoint(),
            PAIR_SEPARATOR,
            self.destination.endpoint()
        )
    }
}

/// Unordered pair of instances. `lo <= hi` always holds.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PairKey {
    lo: InstanceKey,
    hi: InstanceKey,
}

impl PairKey {
    pub fn new(a: InstanceKey, b: InstanceKey) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    pub fn lo(&self) -> &InstanceKey {
        &self.lo
    }

    pub fn hi(&self) -> &InstanceKey {
        &self.hi
    }

    pub fn contains(&self, key: &InstanceKey) -> bool {
        &self.lo == key || &self.hi == key
    }

    /// Canonical request form, identical for both orderings of the pair.
    pub fn canonical(&self) -> String {
        format!("{}{}{}", self.lo.endpoint(), PAIR_SEPARATOR, self.hi.endpoint())
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let req = ChannelRequest::parse("fw:fw1+proxy:p1").unwrap();
        assert_eq!(req.source, InstanceKey::new("fw", "fw1"));
        assert_eq!(req.destination, InstanceKey::new("proxy", "p1"));
        assert_eq!(req.to_string(), "fw:fw1+proxy:p1");
    }

    #[test]
    fn test_parse_request_rejects_malformed() {
        assert!(ChannelRequest::parse("fw1+p1").is_none());
        assert!(ChannelRequest::parse("fw:fw1").is_none());
        assert!(ChannelRequest::parse("fw:+proxy:p1").is_none());
        assert!(ChannelRequest::parse("fw:a+proxy:b+ids:c").is_none());
        assert!(ChannelRequest::parse("fw:a:b+proxy:c").is_none());
    }

    #[test]
    fn test_pair_key_is_unordered() {
        let a = InstanceKey::new("fw", "fw1");
        let b = InstanceKey::new("proxy", "p1");
        let ab = PairKey::new(a.clone(), b.clone());
        let ba = PairKey::new(b.clone(), a.clone());
        assert_eq!(ab, ba);
        assert_eq!(ab.canonical(), ba.canonical());
        assert!(ab.contains(&a));
        assert!(ab.contains(&b));
        assert!(!ab.contains(&InstanceKey::new("ids", "i1")));
    }

    #[test]
    fn test_loop_request() {
        let req = ChannelRequest::parse("fw:fw1+fw:fw1").unwrap();
        assert!(req.is_loop());
    }
}
