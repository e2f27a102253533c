//! Entity module: self-identifying crawled records
//!
//! Every crawled row becomes a [`Record`]: an ordered field map plus an
//! identity rule. The identity is resolved in this order:
//!
//! 1. an explicit `id` field
//! 2. the record's preferred source (a site-native field, or a composite of fields)
//! 3. a SHA-256 content hash over the sorted non-null fields
//!
//! The same input always yields the same id, so identities are stable across runs.

mod job;
mod record;
mod value;

pub use job::JobEntity;
pub use record::{IdentityRule, Record};
pub use value::FieldValue;

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

/// Name of the identity field on every record
pub const ID_FIELD: &str = "id";

/// Ordered field map of a record
///
/// Insertion order is kept because output column order follows it.
pub type Fields = IndexMap<String, FieldValue>;

/// Errors raised by entity operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EntityError {
    #[error("Record has no id, no preferred source field and no non-null fields to hash")]
    MissingIdentity,

    #[error("Identity is already set to '{current}', refusing to overwrite with '{attempted}'")]
    IdentityLocked { current: String, attempted: String },

    #[error("Invalid record: {0}")]
    Invalid(String),
}

/// Result type for entity operations
pub type EntityResult<T> = Result<T, EntityError>;

/// Capability shared by every record type a spider can produce
///
/// Implementors expose their backing [`Record`]; all identity and field
/// access goes through it so the id overwrite rule cannot be bypassed.
pub trait Entity {
    /// Borrows the backing record
    fn record(&self) -> &Record;

    /// Mutably borrows the backing record
    fn record_mut(&mut self) -> &mut Record;

    /// Returns the stable identity, deriving it if no id is stored yet
    fn get_id(&self) -> EntityResult<String> {
        self.record().get_id()
    }

    /// Derives an identity from the preferred source or the content hash
    fn generate_id(&self) -> EntityResult<String> {
        self.record().generate_id()
    }

    /// Derives and stores the identity if absent, then returns it
    fn ensure_id(&mut self) -> EntityResult<String> {
        self.record_mut().ensure_id()
    }

    /// Returns a point-in-time snapshot of the fields
    fn to_dict(&self) -> Fields {
        self.record().fields().clone()
    }

    /// Reads a field
    fn get(&self, key: &str) -> Option<&FieldValue> {
        self.record().get(key)
    }

    /// Writes a field; fails if it would change an already-set id
    fn set(&mut self, key: &str, value: FieldValue) -> EntityResult<()> {
        self.record_mut().set(key, value)
    }

    /// Merges fields, overwriting existing keys but never a set id
    fn update(&mut self, fields: Fields) {
        self.record_mut().update(fields)
    }
}

/// Hashes a string with SHA-256 and returns the lowercase hex digest
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the content hash of a field set
///
/// Null fields and the `excluded` keys are ignored; the remaining pairs are
/// sorted by key and serialized as canonical JSON before hashing, so key
/// order in the input never affects the result. Returns None when nothing is
/// left to hash.
pub fn content_hash<'a, I>(fields: I, excluded: &[String]) -> Option<String>
where
    I: IntoIterator<Item = (&'a String, &'a FieldValue)>,
{
    let sorted: BTreeMap<&str, &FieldValue> = fields
        .into_iter()
        .filter(|(key, value)| !value.is_null() && !excluded.iter().any(|e| e == *key))
        .map(|(key, value)| (key.as_str(), value))
        .collect();

    if sorted.is_empty() {
        return None;
    }

    let canonical = serde_json::to_string(&sorted).ok()?;
    Some(sha256_hex(&canonical))
}
