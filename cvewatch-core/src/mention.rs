//! Mentions of a topic found in indicator text

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A single occurrence of a topic's pattern in a piece of text.
///
/// Equality and hashing ignore case on both the topic name and the matched
/// text, so `CVE-2021-44228` and `cve-2021-44228` under topic `cve` are the
/// same mention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    /// Name of the topic that matched
    pub topic_name: String,
    /// Literal matched text, case preserved as found
    pub mention: String,
}

impl Mention {
    pub fn new(topic_name: impl Into<String>, mention: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            mention: mention.into(),
        }
    }

    /// Whether this mention belongs to the named topic (case-insensitive)
    pub fn is_topic(&self, topic_name: &str) -> bool {
        fold_eq(&self.topic_name, topic_name)
    }
}

fn fold_eq(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

fn fold_hash<H: Hasher>(s: &str, state: &mut H) {
    for c in s.chars().flat_map(char::to_lowercase) {
        c.hash(state);
    }
    // field separator
    0xffu8.hash(state);
}

impl PartialEq for Mention {
    fn eq(&self, other: &Self) -> bool {
        fold_eq(&self.topic_name, &other.topic_name) && fold_eq(&self.mention, &other.mention)
    }
}

impl Eq for Mention {}

impl Hash for Mention {
    fn hash<H: Hasher>(&self, state: &mut H) {
        fold_hash(&self.topic_name, state);
        fold_hash(&self.mention, state);
    }
}
