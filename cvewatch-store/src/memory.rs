//! In-memory indicator repository
//!
//! A single reader/writer lock guards the whole collection: `add` takes it
//! exclusively, lookups share it. Lookups are linear scans, so this is a
//! process-local cache rather than a high-throughput store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use cvewatch_core::{Indicator, IndicatorCollection, Mention};

use crate::{IndicatorRepository, RepositoryError};

/// Repository backed by an in-process collection
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    collection: Arc<RwLock<IndicatorCollection>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored indicators
    pub fn len(&self) -> usize {
        self.collection.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.read().is_empty()
    }
}

#[async_trait]
impl IndicatorRepository for MemoryRepository {
    async fn add(&self, indicator: Indicator) -> Result<(), RepositoryError> {
        let mut collection = self.collection.write();
        if collection.iter().any(|existing| existing.id() == indicator.id()) {
            return Err(RepositoryError::AlreadyExists(indicator.id().to_string()));
        }
        debug!("Storing indicator {} in memory", indicator.id());
        collection.append(indicator);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Indicator, RepositoryError> {
        self.collection
            .read()
            .iter()
            .find(|indicator| indicator.id() == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn get_by_link(&self, link: &str) -> Result<Option<Indicator>, RepositoryError> {
        // newest creation date, equal dates broken by the larger id
        Ok(self
            .collection
            .read()
            .iter()
            .filter(|indicator| indicator.link == link)
            .max_by(|a, b| (a.created_date, a.id()).cmp(&(b.created_date, b.id())))
            .cloned())
    }

    async fn get_by_mention(
        &self,
        mention: &Mention,
    ) -> Result<IndicatorCollection, RepositoryError> {
        Ok(self
            .collection
            .read()
            .iter()
            .filter(|indicator| indicator.has_mention(mention))
            .cloned()
            .collect())
    }
}
