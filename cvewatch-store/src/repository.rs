//! Storage-agnostic indicator repository
//!
//! Every adapter must behave the same for `add`, `get_by_id` and
//! `get_by_link` given the same inputs.

use async_trait::async_trait;
use cvewatch_core::{Indicator, IndicatorCollection, IndicatorError, Mention};
use std::sync::Arc;
use thiserror::Error;

use crate::{MemoryRepository, SearchConfig, SearchRepository};

/// Errors surfaced by repository adapters
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("The indicator was not found: {0}")]
    NotFound(String),

    #[error("The indicator already exists: {0}")]
    AlreadyExists(String),

    #[error("Malformed indicator record: {0}")]
    MalformedRecord(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },
}

impl From<reqwest::Error> for RepositoryError {
    fn from(e: reqwest::Error) -> Self {
        RepositoryError::BackendUnavailable(e.to_string())
    }
}

impl From<IndicatorError> for RepositoryError {
    fn from(e: IndicatorError) -> Self {
        match e {
            IndicatorError::MalformedRecord(msg) => RepositoryError::MalformedRecord(msg),
            IndicatorError::EmptyCollection => {
                RepositoryError::NotFound("empty collection".to_string())
            }
        }
    }
}

/// Persistence port for indicators
#[async_trait]
pub trait IndicatorRepository: Send + Sync {
    /// Persist a new indicator; fails with `AlreadyExists` on an id collision
    async fn add(&self, indicator: Indicator) -> Result<(), RepositoryError>;

    /// Fetch by id; fails with `NotFound`
    async fn get_by_id(&self, id: &str) -> Result<Indicator, RepositoryError>;

    /// Most recently added indicator with exactly this link, if any
    async fn get_by_link(&self, link: &str) -> Result<Option<Indicator>, RepositoryError>;

    /// All indicators holding an equal mention
    async fn get_by_mention(
        &self,
        mention: &Mention,
    ) -> Result<IndicatorCollection, RepositoryError>;
}

/// Thread-safe reference to a repository
pub type SharedRepository = Arc<dyn IndicatorRepository>;

/// Storage backend selection
#[derive(Debug, Clone, Default)]
pub enum StorageBackend {
    /// Process-local store, lost on exit
    #[default]
    Memory,
    /// Remote search index
    Search(SearchConfig),
}

/// Create a shared repository for the chosen backend.
///
/// For the search backend this verifies the index is reachable.
pub async fn create_repository(
    backend: &StorageBackend,
) -> Result<SharedRepository, RepositoryError> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryRepository::new())),
        StorageBackend::Search(config) => {
            Ok(Arc::new(SearchRepository::connect(config.clone()).await?))
        }
    }
}
