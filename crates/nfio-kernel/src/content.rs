//! Attribute file content: typed values to bytes and back.
//!
//! Reads fetch the value from the backend on every call and return its
//! canonical encoding. Writes decode the bytes against the attribute's
//! declared kind before anything is sent, so a malformed value never reaches
//! the backend.
//!
//! A write replaces the whole value. Offset 0 starts a new value; an offset
//! equal to the current length appends to it (`>>` in a shell). Any other
//! offset is `NotSupported`.

use std::sync::Arc;

use tracing::debug;

use nfio_types::{Action, AttrValue, InstanceId, InstanceKey, InstanceStatus, Record};

use crate::backend::BackendClient;
use crate::catalog::{AttrKind, AttrSpec, NfTypeSpec, TypeCatalog};
use crate::error::{NfError, NfResult};
use crate::registry::InstanceRegistry;

// ============================================================================
// Decoding
// ============================================================================

fn utf8(bytes: &[u8]) -> NfResult<&str> {
    std::str::from_utf8(bytes).map_err(|_| NfError::validation("value is not valid UTF-8"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Parse `key=value` lines. Blank lines and `#` comments are skipped; a
/// repeated key keeps its last value.
pub fn parse_record(text: &str) -> NfResult<Record> {
    let mut record = Record::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(NfError::validation(format!(
                "line {}: expected key=value",
                lineno + 1
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(NfError::validation(format!("line {}: empty key", lineno + 1)));
        }
        record.insert(key.to_string(), value.trim().to_string());
    }
    Ok(record)
}

/// Decode written bytes into a value of `kind`.
///
/// Scalars ignore trailing whitespace, so `echo 42 > file` writes `42`.
pub fn decode(kind: &AttrKind, bytes: &[u8]) -> NfResult<AttrValue> {
    let text = utf8(bytes)?;
    let s = text.trim_end();
    match kind {
        AttrKind::Record => parse_record(text).map(AttrValue::Record),
        AttrKind::Text => Ok(AttrValue::Text(s.to_string())),
        AttrKind::Integer { min, max } => {
            let n: i64 = s
                .trim_start()
                .parse()
                .map_err(|_| NfError::validation(format!("{s:?} is not an integer")))?;
            if let Some(lo) = min.filter(|lo| n < *lo) {
                return Err(NfError::validation(format!("{n} is below the minimum {lo}")));
            }
            if let Some(hi) = max.filter(|hi| n > *hi) {
                return Err(NfError::validation(format!("{n} is above the maximum {hi}")));
            }
            Ok(AttrValue::Integer(n))
        }
        AttrKind::Boolean => parse_bool(s)
            .map(AttrValue::Boolean)
            .ok_or_else(|| NfError::validation(format!("{s:?} is not a boolean"))),
        AttrKind::Status => InstanceStatus::from_str(s)
            .map(AttrValue::Status)
            .ok_or_else(|| NfError::validation(format!("{s:?} is not a status"))),
        AttrKind::Action => Action::from_str(s).map(AttrValue::Action).ok_or_else(|| {
            NfError::validation(format!(
                "{s:?} is not an action (start, stop, restart, pause, unpause)"
            ))
        }),
        AttrKind::Enum(values) => {
            if values.iter().any(|v| v == s) {
                Ok(AttrValue::Enum(s.to_string()))
            } else {
                Err(NfError::validation(format!(
                    "{s:?} is not one of {}",
                    values.join(", ")
                )))
            }
        }
    }
}

/// Canonical bytes of a value.
pub fn encode(value: &AttrValue) -> Vec<u8> {
    value.encode().into_bytes()
}

/// Slice `data` the way a positional read does.
pub fn window(data: &[u8], offset: u64, size: u32) -> Vec<u8> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
    let end = start.saturating_add(size as usize).min(data.len());
    data[start..end].to_vec()
}

// ============================================================================
// Engine
// ============================================================================

/// An attribute resolved to its schema and its instance's backend id.
#[derive(Debug, Clone)]
pub struct BoundAttribute {
    pub key: InstanceKey,
    pub id: InstanceId,
    pub spec: AttrSpec,
}

pub struct ContentEngine {
    catalog: Arc<TypeCatalog>,
    backend: BackendClient,
    registry: Arc<InstanceRegistry>,
}

impl ContentEngine {
    pub fn new(
        catalog: Arc<TypeCatalog>,
        backend: BackendClient,
        registry: Arc<InstanceRegistry>,
    ) -> Self {
        Self {
            catalog,
            backend,
            registry,
        }
    }

    fn type_spec(&self, nf_type: &str) -> NfResult<&NfTypeSpec> {
        self.catalog
            .get(nf_type)
            .ok_or_else(|| NfError::not_found(format!("NF type {nf_type}")))
    }

    /// Resolve `attr` of instance `key`.
    ///
    /// Uses the registry's id when the attribute is in the type schema and
    /// the instance is known; otherwise asks the backend, which also
    /// supplies the instance's extension keys.
    pub async fn bind(&self, key: &InstanceKey, attr: &str) -> NfResult<BoundAttribute> {
        let type_spec = self.type_spec(&key.nf_type)?;
        let declared = type_spec.attr(attr);

        if let (Some(spec), Some(id)) = (&declared, self.registry.id(key)) {
            return Ok(BoundAttribute {
                key: key.clone(),
                id,
                spec: spec.clone(),
            });
        }

        let instance = self
            .registry
            .lookup(&self.backend, key)
            .await?
            .ok_or_else(|| NfError::not_found(key.to_string()))?;
        let spec = match declared {
            Some(spec) => spec,
            None if instance.extension_keys.iter().any(|k| k == attr) => {
                AttrSpec::backend_extension(attr)
            }
            None => return Err(NfError::not_found(format!("{key}/{attr}"))),
        };
        Ok(BoundAttribute {
            key: key.clone(),
            id: instance.id,
            spec,
        })
    }

    /// Current encoded content of a readable attribute.
    pub async fn read(&self, bound: &BoundAttribute) -> NfResult<Vec<u8>> {
        if !bound.spec.readable() {
            return Err(NfError::not_permitted(format!(
                "{}/{} is write-only",
                bound.key, bound.spec.name
            )));
        }
        let value = self.backend.get_attr(&bound.id, &bound.spec.name).await?;
        Ok(encode(&value))
    }

    /// Size reported for an attribute file.
    ///
    /// Write-only attributes are empty. A value the backend refuses to
    /// produce right now (e.g. `ip` of a stopped instance) also reads as
    /// empty here, so the file stays visible.
    pub async fn size(&self, bound: &BoundAttribute) -> NfResult<u64> {
        if !bound.spec.readable() {
            return Ok(0);
        }
        match self.read(bound).await {
            Ok(bytes) => Ok(bytes.len() as u64),
            Err(NfError::BackendRejected(reason)) => {
                debug!(attr = %bound.spec.name, reason = %reason, "attribute unavailable");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Write `data` at `offset`. Returns the number of bytes accepted.
    pub async fn write(&self, bound: &BoundAttribute, offset: u64, data: &[u8]) -> NfResult<u32> {
        if !bound.spec.writable() {
            return Err(NfError::not_permitted(format!(
                "{}/{} is read-only",
                bound.key, bound.spec.name
            )));
        }

        let payload = if offset == 0 {
            data.to_vec()
        } else {
            if !bound.spec.readable() {
                return Err(NfError::not_supported(format!(
                    "write at offset {offset} to a write-only attribute"
                )));
            }
            let mut current = self.read(bound).await?;
            if offset != current.len() as u64 {
                return Err(NfError::not_supported(format!(
                    "write at offset {offset}; only 0 or {} (append) are accepted",
                    current.len()
                )));
            }
            current.extend_from_slice(data);
            current
        };

        let value = decode(&bound.spec.kind, &payload)?;
        debug!(instance = %bound.key, attr = %bound.spec.name, kind = value.kind_name(), "set attribute");
        self.backend
            .set_attr(&bound.id, &bound.spec.name, value)
            .await?;
        u32::try_from(data.len()).map_err(|_| NfError::not_supported("write larger than 4 GiB"))
    }

    /// Truncate to zero is the first half of a whole-value replacement and
    /// needs no backend call. Any other size is `NotSupported`.
    pub fn truncate(&self, bound: &BoundAttribute, size: u64) -> NfResult<()> {
        if !bound.spec.writable() {
            return Err(NfError::not_permitted(format!(
                "{}/{} is read-only",
                bound.key, bound.spec.name
            )));
        }
        if size != 0 {
            return Err(NfError::not_supported(format!("truncate to {size}")));
        }
        Ok(())
    }

    /// Content of `nf-types/<type>/.schema`.
    pub fn schema(&self, nf_type: &str) -> NfResult<Vec<u8>> {
        Ok(self.type_spec(nf_type)?.render_schema().into_bytes())
    }
}
