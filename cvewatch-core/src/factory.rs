//! Construction and reconstruction of indicators

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::record::IndicatorRecord;
use crate::{DateFormat, Indicator, IndicatorCollection, IndicatorError, Mention, Record};

/// Builds indicators stamped with a default source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorFactory {
    source: String,
}

impl IndicatorFactory {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// A fresh indicator with a new id, the factory's source, empty sets,
    /// and both dates set to now
    pub fn new_indicator(&self) -> Indicator {
        let now = Utc::now();
        Indicator {
            id: Uuid::new_v4().to_string(),
            title: String::new(),
            body: String::new(),
            score: 0,
            created_date: now,
            accessed_date: now,
            link: String::new(),
            source: self.source.clone(),
            source_id: String::new(),
            references: Vec::new(),
            mentions: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn new_indicator_collection(&self) -> IndicatorCollection {
        IndicatorCollection::new()
    }

    /// Rebuild an indicator from a record carrying RFC3339 timestamps
    pub fn from_record(&self, record: Record) -> Result<Indicator, IndicatorError> {
        self.from_record_with(record, DateFormat::Rfc3339)
    }

    /// Rebuild an indicator from a record whose timestamps use `format`
    pub fn from_record_with(
        &self,
        record: Record,
        format: DateFormat,
    ) -> Result<Indicator, IndicatorError> {
        let parsed = IndicatorRecord::deserialize(serde_json::Value::Object(record))
            .map_err(|e| IndicatorError::MalformedRecord(e.to_string()))?;

        let created_date = format.parse(&parsed.created_date).map_err(|e| {
            IndicatorError::MalformedRecord(format!(
                "createdDate {:?}: {}",
                parsed.created_date, e
            ))
        })?;
        let accessed_date = format.parse(&parsed.accessed_date).map_err(|e| {
            IndicatorError::MalformedRecord(format!(
                "accessedDate {:?}: {}",
                parsed.accessed_date, e
            ))
        })?;

        let mut indicator = Indicator {
            id: parsed.id,
            title: parsed.title,
            body: parsed.body,
            score: parsed.score,
            created_date,
            accessed_date,
            link: parsed.link,
            source: parsed.source,
            source_id: parsed.source_id,
            references: Vec::new(),
            mentions: Vec::new(),
            tags: Vec::new(),
        };

        // Fold through the mutators so a corrupt record cannot smuggle in
        // duplicates.
        for reference in &parsed.references {
            indicator.add_reference(reference);
        }
        for (topic, found) in parsed.mentions {
            for mention in found {
                indicator.add_mention(Mention::new(topic.as_str(), mention));
            }
        }
        for tag in &parsed.tags {
            indicator.add_tag(tag);
        }

        Ok(indicator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    fn log4j_indicator() -> Indicator {
        let factory = IndicatorFactory::new("reddit");
        let mut indicator = factory.new_indicator();
        indicator.title = "Logpresso CVE-2021-44228-Scanner (Log4j Vulnerability)".to_string();
        indicator.score = 1;
        indicator.created_date = DateFormat::Rfc3339.parse("2021-12-13T20:16:57Z").unwrap();
        indicator.accessed_date = DateFormat::Rfc3339
            .parse("2021-12-13T20:17:36.602452Z")
            .unwrap();
        indicator.link = "https://reddit.com/r/sysadmin/comments/rfoz5d/logpresso_cve202144228scanner_log4j_vulnerability/".to_string();
        indicator.source_id = "t3_rfoz5d".to_string();
        indicator.add_reference("https://www.reddit.com/r/sysadmin/comments/rfoz5d/logpresso_cve202144228scanner_log4j_vulnerability/");
        indicator.add_reference("https://github.com/logpresso/CVE-2021-44228-Scanner/releases/download/v1.2.3/logpresso-log4j2-scan-1.2.3.jar");
        indicator.add_mention(Mention::new("cve", "CVE-2021-44228"));
        for tag in ["cve-2021-44228", "scanner", "log4j"] {
            indicator.add_tag(tag);
        }
        indicator
    }

    #[test]
    fn test_new_indicator() {
        let factory = IndicatorFactory::new("reddit");
        let a = factory.new_indicator();
        let b = factory.new_indicator();

        assert_ne!(a.id, b.id);
        assert_eq!(a.source, "reddit");
        assert!(a.mentions().is_empty());
        assert!(a.tags().is_empty());
        assert!(a.references().is_empty());
        assert!(factory.new_indicator_collection().is_empty());
    }

    #[test]
    fn test_record_round_trip() {
        let original = log4j_indicator();
        let record = original.to_record();

        assert_eq!(record["createdDate"], "2021-12-13T20:16:57Z");
        assert_eq!(record["accessedDate"], "2021-12-13T20:17:36.602452Z");
        assert_eq!(record["mentions"], json!({"cve": ["CVE-2021-44228"]}));

        let rebuilt = IndicatorFactory::default().from_record(record).unwrap();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_legacy_record() {
        let legacy = record(json!({
            "id": "1",
            "title": "Test post",
            "body": "",
            "score": 1484,
            "createdDate": "2021-10-02 21:32:59.100",
            "accessedDate": "2021-10-02 21:33:05.100",
            "link": "https://reddit.com/r/netsec/testing",
            "source": "Reddit",
            "sourceId": "qwfy433",
            "references": ["https://reddit.com/r/netsec/reference"]
        }));

        let factory = IndicatorFactory::default();
        assert!(matches!(
            factory.from_record(legacy.clone()),
            Err(IndicatorError::MalformedRecord(_))
        ));

        let indicator = factory.from_record_with(legacy, DateFormat::Legacy).unwrap();
        assert_eq!(indicator.score, 1484);
        assert_eq!(indicator.source_id, "qwfy433");
        assert_eq!(indicator.references().len(), 1);
        assert!(indicator.tags().is_empty());
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let mut broken = log4j_indicator().to_record();
        broken.remove("link");

        let err = IndicatorFactory::default().from_record(broken).unwrap_err();
        assert!(matches!(err, IndicatorError::MalformedRecord(ref msg) if msg.contains("link")));
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let mut broken = log4j_indicator().to_record();
        broken.insert("references".into(), json!("not-a-list"));
        assert!(matches!(
            IndicatorFactory::default().from_record(broken),
            Err(IndicatorError::MalformedRecord(_))
        ));

        let mut broken = log4j_indicator().to_record();
        broken.insert("mentions".into(), json!([{"topicName": "cve", "mention": "x"}]));
        assert!(matches!(
            IndicatorFactory::default().from_record(broken),
            Err(IndicatorError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_duplicates_in_record_are_folded() {
        let mut dirty = log4j_indicator().to_record();
        dirty.insert("tags".into(), json!(["log4j", "log4j"]));
        dirty.insert(
            "mentions".into(),
            json!({"cve": ["CVE-2021-44228", "cve-2021-44228"]}),
        );

        let indicator = IndicatorFactory::default().from_record(dirty).unwrap();
        assert_eq!(indicator.tags().len(), 1);
        assert_eq!(indicator.mentions().len(), 1);
    }
}
