
use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Persisted record of the last successful sync of one document.
///
/// `file_ids` is the sole source of truth for what must be deleted from the
/// remote index before new chunks are uploaded. Records are overwritten
/// whole after a successful reconcile, never merged or partially updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Fingerprint of the rendered document text at last sync
    pub hash: String,
    /// Source-side modification timestamp at last sync
    pub updated_at: DateTime<Utc>,
    /// Identifiers of the chunks currently indexed for this document
    #[serde(default)]
    pub file_ids: Vec<String>,
}

/// Durable mapping from document id to its sync record.
///
/// A `BTreeMap` keeps the serialized JSON stable across runs, which makes
/// the persisted blob diffable.
pub type SyncState = BTreeMap<String, SyncRecord>;

/// Outcome of comparing a document's fingerprint against the sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    New,
    Changed,
    Unchanged,
}

/// Deterministic fingerprint of a document's rendered text.
///
/// SHA-256 over the exact bytes, hex encoded. Stable across runs and
/// platforms; collisions are not a practical concern.
#[inline]
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Classify a document against its previous sync record, if any.
#[inline]
pub fn classify(record: Option<&SyncRecord>, content_hash: &str) -> Change {
    match record {
        None => Change::New,
        Some(record) if record.hash == content_hash => Change::Unchanged,
        Some(_) => Change::Changed,
    }
}
