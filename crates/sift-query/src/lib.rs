//! Sift Query - Query pipeline orchestration
//!
//! This crate implements the query-processing core:
//! - `QueryProcessor`: the staged pipeline from raw text to `QueryResult`,
//!   with a capacity gate, fingerprint caching, per-source fan-out, and
//!   apology results instead of boundary errors
//! - `CacheWarmer`: popularity tracking and proactive cache warming
//! - `TemplateSynthesizer`: the default deterministic response template
//!
//! Parsing and optimization are rule-based; all external capabilities come
//! in through the collaborator traits.

pub mod optimize;
pub mod parse;
pub mod processor;
pub mod synth;
pub mod warmer;

pub use optimize::QueryOptimizer;
pub use parse::{normalize_text, QueryParser};
pub use processor::{
    merge_hits, position_weighted_confidence, ProcessorHealth, QueryProcessor, QueryStatus,
    UsageEvent,
};
pub use synth::{TemplateSynthesizer, INTERNAL_ERROR_RESPONSE, NO_RESULTS_RESPONSE};
pub use warmer::{CacheWarmer, PatternStat, UsageStat, WarmQueryPipeline};
