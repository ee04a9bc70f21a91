//! Post-ranking factors and diversity re-ranking
//!
//! Metadata and recency boosts nudge the fused score without dominating it:
//! the metadata boost contributes a tenth of its value, recency a twentieth.
//! Final scores stay clamped to [0, 1].

use chrono::{DateTime, Utc};
use sift_core::SearchHit;

/// Title match contribution
const TITLE_BOOST: f32 = 0.3;

/// Category or tag match contribution
const CATEGORY_TAG_BOOST: f32 = 0.2;

/// Ceiling for the combined metadata boost
const METADATA_BOOST_CAP: f32 = 0.5;

/// Share of the metadata boost applied to the final score
const METADATA_CONTRIBUTION: f32 = 0.1;

/// Share of the recency boost applied to the final score
const RECENCY_CONTRIBUTION: f32 = 0.05;

/// Recency window; older content gets no boost
const RECENCY_WINDOW_DAYS: f32 = 30.0;

/// Maximum recency boost for brand-new content
const RECENCY_MAX: f32 = 0.2;

/// Apply metadata and recency factors to a hit's final score
pub fn apply_post_ranking(hit: &mut SearchHit, query_lower: &str, now: DateTime<Utc>) {
    let metadata = metadata_boost(hit, query_lower);
    let recency = recency_boost(hit, now);

    hit.ranking_factors.metadata = metadata;
    hit.ranking_factors.recency = recency;

    hit.final_score =
        (hit.final_score + metadata * METADATA_CONTRIBUTION + recency * RECENCY_CONTRIBUTION)
            .clamp(0.0, 1.0);
}

/// Boost from query appearing in title, category, or tags, capped at 0.5
fn metadata_boost(hit: &SearchHit, query_lower: &str) -> f32 {
    if query_lower.is_empty() {
        return 0.0;
    }

    let mut boost = 0.0;

    if let Some(title) = hit.title() {
        if title.to_lowercase().contains(query_lower) {
            boost += TITLE_BOOST;
        }
    }

    let category_match = hit
        .category()
        .map(|c| c.to_lowercase().contains(query_lower))
        .unwrap_or(false);

    let tag_match = hit
        .metadata
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str())
                .any(|t| t.to_lowercase().contains(query_lower))
        })
        .unwrap_or(false);

    if category_match || tag_match {
        boost += CATEGORY_TAG_BOOST;
    }

    boost.min(METADATA_BOOST_CAP)
}

/// Boost for recently modified content, linear over a 30-day window
fn recency_boost(hit: &SearchHit, now: DateTime<Utc>) -> f32 {
    let stamp = hit
        .metadata
        .get("modified_at")
        .or_else(|| hit.metadata.get("created_at"))
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok());

    let Some(stamp) = stamp else {
        return 0.0;
    };

    let days_old = (now - stamp.with_timezone(&Utc)).num_seconds() as f32 / 86_400.0;
    if days_old < 0.0 || days_old > RECENCY_WINDOW_DAYS {
        return 0.0;
    }

    (RECENCY_WINDOW_DAYS - days_old) / RECENCY_WINDOW_DAYS * RECENCY_MAX
}

/// Greedy diversity selection over (source, category)
///
/// Rank one is always kept. Each subsequent candidate is accepted only if it
/// shares neither source nor category with every already-selected hit; once
/// `top_k` is filled or the diverse pool runs dry, remaining slots are filled
/// from the leftovers by score.
pub fn diversity_rerank(hits: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    if top_k == 0 {
        return Vec::new();
    }
    if hits.len() <= 1 {
        return hits;
    }

    let mut selected: Vec<SearchHit> = Vec::with_capacity(top_k);
    let mut remaining: Vec<SearchHit> = Vec::new();

    for hit in hits {
        if selected.is_empty() {
            selected.push(hit);
            continue;
        }
        if selected.len() >= top_k {
            remaining.push(hit);
            continue;
        }

        let clashes = selected.iter().any(|s| {
            s.source_id() == hit.source_id() && s.category() == hit.category()
        });
        if clashes {
            remaining.push(hit);
        } else {
            selected.push(hit);
        }
    }

    // Fill leftover slots by score
    for hit in remaining {
        if selected.len() >= top_k {
            break;
        }
        selected.push(hit);
    }

    selected
}
