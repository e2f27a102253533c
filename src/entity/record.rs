//! Generic record backing every entity type

use crate::entity::{
    content_hash, sha256_hex, Entity, EntityError, EntityResult, FieldValue, Fields, ID_FIELD,
};
use std::fmt;
use std::hash::{Hash, Hasher};

/// How a record derives its identity when no explicit id is stored
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityRule {
    /// Content hash over all non-null fields
    #[default]
    ContentHash,

    /// Value of a single site-native field (e.g. a job code)
    Field(String),

    /// SHA-256 of the named fields joined with `_`; all must be non-empty
    Composite(Vec<String>),
}

/// An ordered, self-identifying field map
///
/// Equality and hashing are identity-based: two records are equal iff they
/// resolve to the same id.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Fields,
    rule: IdentityRule,
    hash_excluded: Vec<String>,
}

impl Record {
    /// Creates an empty record using the content-hash identity rule
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing field map
    pub fn from_fields(fields: Fields) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Sets the identity rule used when no explicit id is present
    pub fn with_identity_rule(mut self, rule: IdentityRule) -> Self {
        self.rule = rule;
        self
    }

    /// Excludes a field from the content hash (e.g. a crawl timestamp)
    pub fn exclude_from_hash(mut self, field: impl Into<String>) -> Self {
        self.hash_excluded.push(field.into());
        self
    }

    /// Returns the identity rule
    pub fn identity_rule(&self) -> &IdentityRule {
        &self.rule
    }

    /// Returns the stored id, if set and non-null
    pub fn id(&self) -> Option<String> {
        self.fields.get(ID_FIELD).and_then(FieldValue::as_key)
    }

    /// Borrows the fields
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Consumes the record, returning its fields
    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Reads a field
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Returns true if the field exists and is non-null
    pub fn has(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(|v| !v.is_null())
    }

    /// Writes a field
    ///
    /// Writing `id` is allowed while no id is set, or when the value is the
    /// same as the current one.
    pub fn set(&mut self, key: &str, value: FieldValue) -> EntityResult<()> {
        if key == ID_FIELD {
            if let (Some(current), attempted) = (self.id(), value.as_key()) {
                if attempted.as_deref() != Some(current.as_str()) {
                    return Err(EntityError::IdentityLocked {
                        current,
                        attempted: attempted.unwrap_or_default(),
                    });
                }
            }
        }

        self.fields.insert(key.to_string(), value);
        Ok(())
    }

    /// Merges fields, overwriting existing keys
    ///
    /// An `id` entry is ignored once the record has an id.
    pub fn update(&mut self, fields: Fields) {
        for (key, value) in fields {
            if let Err(e) = self.set(&key, value) {
                tracing::debug!("Ignoring id update: {}", e);
            }
        }
    }

    /// Returns the stored id or derives one
    pub fn get_id(&self) -> EntityResult<String> {
        match self.id() {
            Some(id) => Ok(id),
            None => self.generate_id(),
        }
    }

    /// Derives an identity from the preferred source, falling back to the content hash
    pub fn generate_id(&self) -> EntityResult<String> {
        if let Some(id) = self.preferred_id() {
            return Ok(id);
        }

        let mut excluded = self.hash_excluded.clone();
        excluded.push(ID_FIELD.to_string());

        content_hash(&self.fields, &excluded).ok_or(EntityError::MissingIdentity)
    }

    /// Stores the derived identity if none is present, then returns it
    pub fn ensure_id(&mut self) -> EntityResult<String> {
        if let Some(id) = self.id() {
            return Ok(id);
        }

        let id = self.generate_id()?;
        self.fields
            .insert(ID_FIELD.to_string(), FieldValue::Text(id.clone()));
        Ok(id)
    }

    fn preferred_id(&self) -> Option<String> {
        match &self.rule {
            IdentityRule::ContentHash => None,
            IdentityRule::Field(field) => self.fields.get(field).and_then(FieldValue::as_key),
            IdentityRule::Composite(parts) => {
                let values: Option<Vec<String>> = parts
                    .iter()
                    .map(|p| {
                        self.fields
                            .get(p)
                            .and_then(FieldValue::as_key)
                            .filter(|v| !v.is_empty())
                    })
                    .collect();
                values.map(|v| sha256_hex(&v.join("_")))
            }
        }
    }
}

impl Entity for Record {
    fn record(&self) -> &Record {
        self
    }

    fn record_mut(&mut self) -> &mut Record {
        self
    }
}

impl From<Fields> for Record {
    fn from(fields: Fields) -> Self {
        Self::from_fields(fields)
    }
}

/// Records without an identity only equal records with the same fields
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        match (self.get_id().ok(), other.get_id().ok()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.fields == other.fields,
            _ => false,
        }
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.get_id() {
            Ok(id) => id.hash(state),
            // Field maps compare without regard to order
            Err(_) => self.fields.len().hash(state),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={:?}", k, v.to_string()))
            .collect();
        write!(f, "Record({})", attrs.join(", "))
    }
}
