//! The indicator aggregate
//!
//! An indicator is a tracked document (post, article, advisory) with:
//! - Identity and content fields
//! - An externally assigned score
//! - Deduplicated sets of mentions, tags and references
//!
//! Mutators never fail on duplicates; they leave the set unchanged instead.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{Mention, Topic};

/// Errors from indicator reconstruction and collection access
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndicatorError {
    #[error("Malformed indicator record: {0}")]
    MalformedRecord(String),

    #[error("Indicator collection empty")]
    EmptyCollection,
}

/// A tracked security-relevant document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    /// Unique identifier, assigned once at creation
    pub(crate) id: String,
    pub title: String,
    pub body: String,
    /// Relevance score assigned by the ingesting source
    pub score: i64,
    pub created_date: DateTime<Utc>,
    /// Last time an ingestion process revisited the document
    pub accessed_date: DateTime<Utc>,
    pub link: String,
    /// Name of the originating system (e.g. "reddit")
    pub source: String,
    /// The originating system's native identifier
    pub source_id: String,
    pub(crate) references: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) mentions: Vec<Mention>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) tags: Vec<String>,
}

impl Indicator {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mentions(&self) -> &[Mention] {
        &self.mentions
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Record a mention unless an equal one (case-insensitive) is present.
    /// Returns whether the mention was new.
    pub fn add_mention(&mut self, mention: Mention) -> bool {
        if self.mentions.contains(&mention) {
            return false;
        }
        self.mentions.push(mention);
        true
    }

    /// Add a tag unless it is already present (exact match)
    pub fn add_tag(&mut self, tag: &str) -> bool {
        push_unique(&mut self.tags, tag)
    }

    /// Add a reference unless it is already present (exact match)
    pub fn add_reference(&mut self, reference: &str) -> bool {
        push_unique(&mut self.references, reference)
    }

    /// Whether the mention set holds an equal mention
    pub fn has_mention(&self, mention: &Mention) -> bool {
        self.mentions.contains(mention)
    }

    /// Mentions recorded for one topic, in insertion order
    pub fn mentions_of<'a>(&'a self, topic_name: &'a str) -> impl Iterator<Item = &'a Mention> {
        self.mentions.iter().filter(move |m| m.is_topic(topic_name))
    }

    /// Run a topic over the title and body and fold its matches in.
    /// Returns the number of mentions that were new to this indicator.
    pub fn scan(&mut self, topic: &dyn Topic) -> usize {
        let mut found = topic.mentions(&self.title);
        found.extend(topic.mentions(&self.body));

        found
            .into_iter()
            .map(|m| self.add_mention(m))
            .filter(|added| *added)
            .count()
    }
}

fn push_unique(items: &mut Vec<String>, value: &str) -> bool {
    if items.iter().any(|existing| existing == value) {
        return false;
    }
    items.push(value.to_string());
    true
}

impl PartialEq for Indicator {
    fn eq(&self, other: &Self) -> bool {
        // Mentions compare as a set: the grouped record form does not keep
        // the interleaving of mentions across topics.
        let same_mentions = self.mentions.len() == other.mentions.len()
            && self.mentions.iter().all(|m| other.mentions.contains(m));

        self.id == other.id
            && self.title == other.title
            && self.body == other.body
            && self.score == other.score
            && self.created_date == other.created_date
            && self.accessed_date == other.accessed_date
            && self.link == other.link
            && self.source == other.source
            && self.source_id == other.source_id
            && self.references == other.references
            && self.tags == other.tags
            && same_mentions
    }
}

impl Eq for Indicator {}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} ({})",
            self.created_date.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.id,
            self.title,
            self.score
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IndicatorFactory, RegexTopic};

    fn indicator() -> Indicator {
        IndicatorFactory::new("reddit").new_indicator()
    }

    #[test]
    fn test_add_mention_dedup() {
        let mut ind = indicator();
        assert!(ind.add_mention(Mention::new("cve", "CVE-2021-44228")));
        assert!(!ind.add_mention(Mention::new("CVE", "cve-2021-44228")));
        assert!(ind.add_mention(Mention::new("cve", "CVE-2021-44229")));

        assert_eq!(ind.mentions().len(), 2);
        // first spelling wins
        assert_eq!(ind.mentions()[0].mention, "CVE-2021-44228");
    }

    #[test]
    fn test_tags_are_case_sensitive() {
        let mut ind = indicator();
        ind.add_tag("log4j");
        ind.add_tag("log4j");
        ind.add_tag("Log4j");
        assert_eq!(ind.tags(), &["log4j".to_string(), "Log4j".to_string()]);
    }

    #[test]
    fn test_add_reference_keeps_order() {
        let mut ind = indicator();
        ind.add_reference("https://b.example");
        ind.add_reference("https://a.example");
        ind.add_reference("https://b.example");
        assert_eq!(
            ind.references(),
            &["https://b.example".to_string(), "https://a.example".to_string()]
        );
    }

    #[test]
    fn test_scan_folds_duplicates() {
        let topic = RegexTopic::new("cve", r"(?i)cve-\d+-\d+").unwrap();
        let mut ind = indicator();
        ind.title = "Logpresso CVE-2021-44228-Scanner".to_string();
        ind.body = "See CVE-2021-44228 and cve-2021-44229 twice CVE-2021-44228".to_string();

        assert_eq!(ind.scan(&topic), 2);
        assert_eq!(ind.mentions().len(), 2);

        // rescanning records nothing new
        assert_eq!(ind.scan(&topic), 0);
    }

    #[test]
    fn test_mentions_of() {
        let mut ind = indicator();
        ind.add_mention(Mention::new("cve", "CVE-2021-44228"));
        ind.add_mention(Mention::new("mitre", "T1190"));
        ind.add_mention(Mention::new("cve", "CVE-2021-45046"));

        let cves: Vec<&str> = ind.mentions_of("CVE").map(|m| m.mention.as_str()).collect();
        assert_eq!(cves, vec!["CVE-2021-44228", "CVE-2021-45046"]);
    }

    #[test]
    fn test_equality_ignores_mention_order() {
        let mut a = indicator();
        a.add_mention(Mention::new("cve", "CVE-2021-44228"));
        a.add_mention(Mention::new("mitre", "T1190"));

        let mut b = a.clone();
        b.mentions.reverse();
        assert_eq!(a, b);

        b.add_mention(Mention::new("cve", "CVE-2021-45046"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_survives_mutation() {
        let mut ind = indicator();
        let id = ind.id().to_string();
        assert!(!id.is_empty());

        ind.title = "Updated".to_string();
        ind.add_tag("log4j");
        ind.add_mention(Mention::new("cve", "CVE-2021-44228"));
        assert_eq!(ind.id(), id);
    }

    #[test]
    fn test_display() {
        let mut ind = indicator();
        ind.title = "Log4Shell".to_string();
        ind.score = 1484;
        let line = ind.to_string();
        assert!(line.starts_with('['));
        assert!(line.contains(&ind.id));
        assert!(line.ends_with("Log4Shell (1484)"));
    }

    #[test]
    fn test_serde_document_shape() {
        let mut ind = indicator();
        ind.add_mention(Mention::new("cve", "CVE-2021-44228"));

        let doc = serde_json::to_value(&ind).unwrap();
        assert_eq!(doc["mentions"][0]["topicName"], "cve");
        assert_eq!(doc["sourceId"], "");
        assert!(doc.get("tags").is_none());

        let back: Indicator = serde_json::from_value(doc).unwrap();
        assert_eq!(back, ind);
    }
}
