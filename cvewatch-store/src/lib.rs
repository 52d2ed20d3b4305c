//! cvewatch Store
//!
//! Indicator persistence behind a single repository port:
//! - In-memory adapter (process-local, lock-guarded)
//! - Search index adapter (Elasticsearch-compatible REST)

pub mod repository;
pub mod memory;
pub mod search;

pub use repository::*;
pub use memory::*;
pub use search::{index_mapping, SearchConfig, SearchRepository};
