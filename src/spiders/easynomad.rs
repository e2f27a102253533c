//! EasyNomad (easynomad.cn) remote job listings
//!
//! The list endpoint returns `{"data": [...]}` pages of 100 postings; paging
//! goes by the `page` query parameter until a page comes back empty.

use crate::entity::{EntityResult, FieldValue, Fields, JobEntity};
use crate::spider::{ParseError, RawResponse, Spider};
use serde_json::Value;
use url::Url;

/// First page of the listing
pub const EASYNOMAD_LIST_URL: &str =
    "https://easynomad.cn/api/posts/list?limit=100&page=1&jobCategory=&contractType=";

/// Value of the `source` column for this site
pub const EASYNOMAD_SOURCE: &str = "easynomad.cn";

/// Site field -> job field
const FIELD_MAP: [(&str, &str); 8] = [
    ("jobCode", "id"),
    ("jobTitle", "title"),
    ("company", "company"),
    ("descContent", "description"),
    ("salary", "salary"),
    ("jobType", "tags"),
    ("url", "url"),
    ("jobPublishTime", "publish_time"),
];

const SITE_HEADERS: [(&str, &str); 9] = [
    ("Accept", "*/*"),
    (
        "Accept-Language",
        "zh-CN,zh;q=0.9,en;q=0.8,en-GB;q=0.7,en-US;q=0.6",
    ),
    ("Cache-Control", "no-cache"),
    ("Pragma", "no-cache"),
    ("Referer", "https://easynomad.cn/"),
    ("Sec-Fetch-Dest", "empty"),
    ("Sec-Fetch-Mode", "cors"),
    ("Sec-Fetch-Site", "same-origin"),
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36",
    ),
];

/// Spider for the EasyNomad job list API
#[derive(Debug, Clone)]
pub struct EasyNomadSpider {
    start_url: String,
}

impl EasyNomadSpider {
    /// Creates a spider for the public listing
    pub fn new() -> Self {
        Self {
            start_url: EASYNOMAD_LIST_URL.to_string(),
        }
    }

    /// Creates a spider starting at another URL (a mirror or a test server)
    pub fn with_start_url(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
        }
    }

    /// Returns the `data` array of a page; null counts as empty
    fn items(response: &RawResponse) -> Result<Vec<Value>, ParseError> {
        let body: Value = response.json()?;
        match body.get("data") {
            None => Err(ParseError::MissingField {
                url: response.url.clone(),
                field: "data".to_string(),
            }),
            Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(other) => Err(ParseError::Malformed {
                url: response.url.clone(),
                message: format!("'data' is not an array: {}", other),
            }),
        }
    }
}

impl Default for EasyNomadSpider {
    fn default() -> Self {
        Self::new()
    }
}

impl Spider for EasyNomadSpider {
    type Entity = JobEntity;

    fn name(&self) -> &str {
        "easynomad"
    }

    fn start_url(&self) -> String {
        self.start_url.clone()
    }

    fn default_headers(&self) -> Vec<(String, String)> {
        SITE_HEADERS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse_page(&self, response: &RawResponse) -> Result<Vec<Fields>, ParseError> {
        let items = Self::items(response)?;

        let mut rows = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let Value::Object(item) = item else {
                return Err(ParseError::Malformed {
                    url: response.url.clone(),
                    message: format!("item {} is not an object", index),
                });
            };

            let mut row = Fields::new();
            for (site_field, field) in FIELD_MAP {
                let value = item
                    .get(site_field)
                    .cloned()
                    .map(FieldValue::from_json)
                    .unwrap_or_default();
                row.insert(field.to_string(), value);
            }
            row.insert("source".to_string(), EASYNOMAD_SOURCE.into());
            rows.push(row);
        }

        Ok(rows)
    }

    fn next_page(&self, response: &RawResponse) -> Option<String> {
        let items = Self::items(response).ok()?;
        if items.is_empty() {
            return None;
        }

        let mut url = Url::parse(&response.url).ok()?;
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        match pairs.iter_mut().find(|(k, _)| k == "page") {
            Some((_, page)) => {
                let current: u64 = page.parse().ok()?;
                *page = (current + 1).to_string();
            }
            None => pairs.push(("page".to_string(), "2".to_string())),
        }

        url.query_pairs_mut().clear().extend_pairs(pairs);
        Some(url.to_string())
    }

    fn create_entity(&self, fields: Fields) -> EntityResult<JobEntity> {
        let mut job = JobEntity::from_fields(fields);
        if job.source() != EASYNOMAD_SOURCE {
            job.set_source(EASYNOMAD_SOURCE);
        }
        Ok(job)
    }
}
