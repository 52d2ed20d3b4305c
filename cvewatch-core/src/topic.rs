//! Topics of interest and the matchers that find them in text
//!
//! A topic turns free text into [`Mention`]s. The regex variant compiles its
//! pattern once at construction and is stateless afterwards, so a single
//! instance can be shared across threads.

use regex::Regex;
use thiserror::Error;

use crate::Mention;

/// Errors from topic construction
#[derive(Debug, Error)]
pub enum TopicError {
    #[error("Invalid pattern for topic {name}: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// A named matcher that detects mentions of interest
pub trait Topic: Send + Sync {
    /// Topic name, recorded on every mention it produces
    fn name(&self) -> &str;

    /// All matches in `text`, left to right, duplicates included.
    /// Recomputed on every call.
    fn mentions(&self, text: &str) -> Vec<Mention>;

    /// Whether `text` mentions this topic at least once
    fn mentioned(&self, text: &str) -> bool {
        !self.mentions(text).is_empty()
    }
}

/// Topic backed by a compiled regular expression
#[derive(Debug, Clone)]
pub struct RegexTopic {
    name: String,
    regex: Regex,
}

impl RegexTopic {
    pub fn new(name: &str, pattern: &str) -> Result<Self, TopicError> {
        let regex = Regex::new(pattern).map_err(|source| TopicError::InvalidPattern {
            name: name.to_string(),
            source,
        })?;

        Ok(Self {
            name: name.to_string(),
            regex,
        })
    }

    /// Source pattern the topic was compiled from
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

impl Topic for RegexTopic {
    fn name(&self) -> &str {
        &self.name
    }

    fn mentions(&self, text: &str) -> Vec<Mention> {
        self.regex
            .find_iter(text)
            .map(|m| Mention::new(self.name.as_str(), m.as_str()))
            .collect()
    }
}
