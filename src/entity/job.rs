//! Job posting entity
//!
//! A typed view over a [`Record`] with the columns every job board spider
//! fills in. Unknown site fields are kept after the known ones.

use crate::entity::{Entity, FieldValue, Fields, IdentityRule, Record, ID_FIELD};
use chrono::Utc;
use std::fmt;

const KNOWN_FIELDS: [&str; 11] = [
    ID_FIELD,
    "title",
    "company",
    "description",
    "salary",
    "location",
    "tags",
    "url",
    "publish_time",
    "crawl_time",
    "source",
];

/// Site spellings accepted for known fields
const ALIASES: [(&str, &str); 2] = [("jobId", ID_FIELD), ("publishTime", "publish_time")];

const DEFAULT_SOURCE: &str = "unknown";

/// A remote job posting
///
/// Identity: the explicit id (site job code), else a hash of
/// `"{title}_{company}"`, else the content hash. `crawl_time` never takes part
/// in the content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobEntity {
    record: Record,
}

impl JobEntity {
    /// Creates an empty job stamped with the current crawl time
    pub fn new() -> Self {
        Self::from_fields(Fields::new())
    }

    /// Builds a job from raw fields, applying aliases and defaults
    pub fn from_fields(raw: Fields) -> Self {
        let mut fields = Fields::new();
        for name in KNOWN_FIELDS {
            fields.insert(name.to_string(), FieldValue::Null);
        }

        for (key, value) in raw {
            let key = ALIASES
                .iter()
                .find(|(alias, _)| *alias == key)
                .map(|(_, canonical)| canonical.to_string())
                .unwrap_or(key);
            fields.insert(key, value);
        }

        if fields.get("crawl_time").map_or(true, FieldValue::is_null) {
            fields.insert(
                "crawl_time".to_string(),
                FieldValue::Text(Utc::now().to_rfc3339()),
            );
        }
        if fields.get("source").map_or(true, FieldValue::is_null) {
            fields.insert("source".to_string(), DEFAULT_SOURCE.into());
        }

        let record = Record::from_fields(fields)
            .with_identity_rule(IdentityRule::Composite(vec![
                "title".to_string(),
                "company".to_string(),
            ]))
            .exclude_from_hash("crawl_time");

        Self { record }
    }

    /// Returns the site job id, if one is stored
    pub fn job_id(&self) -> Option<String> {
        self.record.id()
    }

    pub fn title(&self) -> Option<String> {
        self.text("title")
    }

    pub fn company(&self) -> Option<String> {
        self.text("company")
    }

    pub fn description(&self) -> Option<String> {
        self.text("description")
    }

    pub fn salary(&self) -> Option<String> {
        self.text("salary")
    }

    pub fn location(&self) -> Option<String> {
        self.text("location")
    }

    pub fn tags(&self) -> Option<String> {
        self.text("tags")
    }

    pub fn url(&self) -> Option<String> {
        self.text("url")
    }

    pub fn publish_time(&self) -> Option<String> {
        self.text("publish_time")
    }

    pub fn crawl_time(&self) -> Option<String> {
        self.text("crawl_time")
    }

    pub fn source(&self) -> String {
        self.text("source")
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string())
    }

    /// Sets the data source name
    pub fn set_source(&mut self, source: &str) {
        if let Err(e) = self.record.set("source", source.into()) {
            tracing::debug!("Ignoring source update: {}", e);
        }
    }

    fn text(&self, key: &str) -> Option<String> {
        self.record.get(key).and_then(FieldValue::as_key)
    }
}

impl Default for JobEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for JobEntity {
    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

impl From<JobEntity> for Record {
    fn from(job: JobEntity) -> Self {
        job.record
    }
}

impl fmt::Display for JobEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JobEntity(title='{}', company='{}', source='{}')",
            self.title().unwrap_or_default(),
            self.company().unwrap_or_default(),
            self.source()
        )
    }
}
