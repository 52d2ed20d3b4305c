//! Untyped record projection of an indicator
//!
//! The record is a flat JSON object used for generic transport:
//!
//! | field | type |
//! |---|---|
//! | `id`, `title`, `body`, `link`, `source`, `sourceId` | string |
//! | `score` | integer |
//! | `createdDate`, `accessedDate` | timestamp string |
//! | `references`, `tags` | list of strings |
//! | `mentions` | object of topic name to list of matched strings |
//!
//! RFC3339 with sub-second precision is the canonical timestamp format.
//! The legacy fixed-width format is only used when a caller asks for it.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::Indicator;

/// An untyped key/value projection of an indicator
pub type Record = Map<String, Value>;

const LEGACY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Timestamp formats a record may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// `2021-12-13T20:17:36.602452Z`
    #[default]
    Rfc3339,
    /// `2021-10-02 21:32:59.100`, always UTC, millisecond precision
    Legacy,
}

impl DateFormat {
    pub fn format(&self, date: &DateTime<Utc>) -> String {
        match self {
            DateFormat::Rfc3339 => date.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            DateFormat::Legacy => date.format(LEGACY_FORMAT).to_string(),
        }
    }

    pub fn parse(&self, value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        match self {
            DateFormat::Rfc3339 => {
                DateTime::parse_from_rfc3339(value).map(|date| date.with_timezone(&Utc))
            }
            DateFormat::Legacy => {
                NaiveDateTime::parse_from_str(value, LEGACY_FORMAT).map(|date| date.and_utc())
            }
        }
    }
}

impl Indicator {
    /// Project into an untyped record with RFC3339 timestamps
    pub fn to_record(&self) -> Record {
        self.to_record_with(DateFormat::Rfc3339)
    }

    pub fn to_record_with(&self, format: DateFormat) -> Record {
        let mut mentions: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for mention in &self.mentions {
            mentions
                .entry(mention.topic_name.as_str())
                .or_default()
                .push(mention.mention.as_str());
        }

        let mut record = Record::new();
        record.insert("id".into(), Value::from(self.id.as_str()));
        record.insert("title".into(), Value::from(self.title.as_str()));
        record.insert("body".into(), Value::from(self.body.as_str()));
        record.insert("score".into(), Value::from(self.score));
        record.insert("createdDate".into(), Value::from(format.format(&self.created_date)));
        record.insert("accessedDate".into(), Value::from(format.format(&self.accessed_date)));
        record.insert("link".into(), Value::from(self.link.as_str()));
        record.insert("source".into(), Value::from(self.source.as_str()));
        record.insert("sourceId".into(), Value::from(self.source_id.as_str()));
        record.insert("references".into(), Value::from(self.references.clone()));
        record.insert(
            "mentions".into(),
            Value::Object(
                mentions
                    .into_iter()
                    .map(|(topic, found)| (topic.to_string(), Value::from(found)))
                    .collect(),
            ),
        );
        record.insert("tags".into(), Value::from(self.tags.clone()));
        record
    }
}

/// Schema a record must satisfy before it becomes an indicator
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IndicatorRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(deserialize_with = "deserialize_score")]
    pub score: i64,
    pub created_date: String,
    pub accessed_date: String,
    pub link: String,
    pub source: String,
    pub source_id: String,
    pub references: Vec<String>,
    #[serde(default)]
    pub mentions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Accepts integers and integral floats; generic JSON decoders often hand
/// every number over as a float. `i64::MAX as f64` is 2^63, one past the
/// largest score, so the upper bound is exclusive.
fn deserialize_score<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(score) = number.as_i64() {
        return Ok(score);
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(f as i64)
        }
        _ => Err(de::Error::custom(format!("score is not an integer: {number}"))),
    }
}
