//! cvewatch Core - Indicator aggregate and topic matching
//!
//! This crate provides the domain model:
//! - Topics that turn free text into mentions
//! - The indicator aggregate with deduplicating mutators
//! - Indicator collections with score statistics
//! - The factory and the untyped record projection

pub mod mention;
pub mod topic;
pub mod indicator;
pub mod collection;
pub mod factory;
pub mod record;

pub use mention::*;
pub use topic::*;
pub use indicator::*;
pub use collection::*;
pub use factory::*;
pub use record::{DateFormat, Record};

/// Name of the built-in CVE topic
pub const CVE_TOPIC: &str = "cve";

/// Pattern of the built-in CVE topic
pub const CVE_PATTERN: &str = r"(?i)cve-\d+-\d+";
