//! Length-prefixed key encoding for LMDB storage.
//!
//! All keys are encoded as: [len1][bytes1][len2][bytes2]...
//! - No delimiters, no escaping, any bytes allowed
//! - A prefix of parts is a byte prefix of the key, so prefix scans work
//! - Parts are at most 255 bytes

use crate::constants::MAX_KEY_PART_LEN;
use crate::error::{PermError, Result};
use crate::types::{MetadataObjId, PermKind};

/// Build a length-prefixed key from parts
///
/// # Example
/// ```
/// let key = tablegate::keys::build_key(&["default", "articles"]).unwrap();
/// assert_eq!(key, b"\x07default\x08articles");
/// ```
pub fn build_key(parts: &[&str]) -> Result<Vec<u8>> {
    let total_len: usize = parts.iter().map(|p| 1 + p.len()).sum();
    let mut key = Vec::with_capacity(total_len);
    for part in parts {
        if part.len() > MAX_KEY_PART_LEN {
            return Err(PermError::ValidationFailed(format!(
                "name longer than {MAX_KEY_PART_LEN} bytes: {part:?}"
            )));
        }
        key.push(part.len() as u8);
        key.extend_from_slice(part.as_bytes());
    }
    Ok(key)
}

/// Parse a length-prefixed key into parts; `None` on truncated or non-UTF-8 input
pub fn parse_key(bytes: &[u8]) -> Option<Vec<&str>> {
    let mut parts = Vec::with_capacity(4);
    let mut i = 0;
    while i < bytes.len() {
        let len = bytes[i] as usize;
        let part = bytes.get(i + 1..i + 1 + len)?;
        parts.push(std::str::from_utf8(part).ok()?);
        i += 1 + len;
    }
    Some(parts)
}

// ============================================================================
// Permission keys (4-part: source, table, kind, role)
// ============================================================================

#[inline]
pub fn perm_key(id: &MetadataObjId) -> Result<Vec<u8>> {
    build_key(&[&id.source, &id.table, id.kind.as_str(), &id.role])
}

/// Prefix covering every permission of one table
#[inline]
pub fn table_prefix(source: &str, table: &str) -> Result<Vec<u8>> {
    build_key(&[source, table])
}

/// Prefix covering every permission of one source
#[inline]
pub fn source_prefix(source: &str) -> Result<Vec<u8>> {
    build_key(&[source])
}

/// Decode a permission key back into its object id
pub fn parse_perm_key(bytes: &[u8]) -> Option<MetadataObjId> {
    match parse_key(bytes)?.as_slice() {
        [source, table, kind, role] => Some(MetadataObjId::new(source, table, role, PermKind::parse(kind)?)),
        _ => None,
    }
}
