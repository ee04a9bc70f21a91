//! Response synthesis
//!
//! The default synthesizer is a deterministic template over the ranked
//! sources; LLM-backed implementations plug in behind the same trait.

use async_trait::async_trait;
use sift_core::{Result, SourceRef, Synthesizer};

/// Apology used when no hits survived ranking
pub const NO_RESULTS_RESPONSE: &str =
    "I couldn't find any relevant information for that query. \
     Try rephrasing it or using broader terms.";

/// Apology used when the pipeline itself failed
pub const INTERNAL_ERROR_RESPONSE: &str =
    "Something went wrong while processing your query. Please try again in a moment.";

/// Deterministic template synthesizer
pub struct TemplateSynthesizer;

#[async_trait]
impl Synthesizer for TemplateSynthesizer {
    async fn synthesize(&self, _query_text: &str, sources: &[SourceRef]) -> Result<String> {
        let Some(top) = sources.first() else {
            return Ok(NO_RESULTS_RESPONSE.to_string());
        };

        if sources.len() == 1 {
            return Ok(format!("Based on \"{}\": {}", top.title, top.excerpt));
        }

        Ok(format!(
            "Drawing on {} sources, the most relevant is \"{}\": {} \
             Further detail is available in the remaining {} sources.",
            sources.len(),
            top.title,
            top.excerpt,
            sources.len() - 1
        ))
    }
}
