//! Candidate gathering: bounded keyword search against the geo provider,
//! dedup, and volume caps.

use anyhow::Result;

use sidetrip_core::{Candidate, DEFAULT_KEYWORDS, GeoPoint};

use crate::provider::GeoProvider;

/// Stop collecting once this many raw hits have accumulated.
pub const MAX_RAW_CANDIDATES: usize = 45;
/// Pages requested per keyword.
pub const MAX_PAGES_PER_KEYWORD: u32 = 2;
/// Unique candidates handed to the scorer.
pub const MAX_UNIQUE_CANDIDATES: usize = 18;

/// Hits per page we expect from the provider; a short page ends pagination
/// for that keyword.
const PAGE_SIZE: usize = 15;

#[derive(Debug, Clone)]
pub struct GatherOutcome {
    pub candidates: Vec<Candidate>,
    /// True when the intent-keyword search found nothing and the generic
    /// keyword list was used instead. The scorer must then drop the intent
    /// keywords, or the keyword pre-filter would empty the list again.
    pub used_generic_fallback: bool,
}

async fn collect_raw<G: GeoProvider + ?Sized>(
    geo: &G,
    origin: GeoPoint,
    keywords: &[String],
    radius_m: f64,
    city: Option<&str>,
) -> Result<Vec<Candidate>> {
    let mut raw: Vec<Candidate> = Vec::new();

    'keywords: for keyword in keywords {
        for page in 1..=MAX_PAGES_PER_KEYWORD {
            let hits = geo.search_nearby(origin, keyword, radius_m, page, city).await?;
            let short_page = hits.len() < PAGE_SIZE;

            for hit in hits {
                raw.push(Candidate {
                    id: Candidate::dedup_key(hit.location, &hit.name),
                    name: hit.name,
                    category: hit.category,
                    address: hit.address,
                    location: hit.location,
                    distance_meters: hit.distance_meters,
                    one_way_min: 0,
                    play_min: 0,
                    weight: 0.0,
                    match_hits: 0,
                    affinity: 0.0,
                });
                if raw.len() >= MAX_RAW_CANDIDATES {
                    break 'keywords;
                }
            }

            if short_page {
                break;
            }
        }
    }

    Ok(raw)
}

fn dedup_and_cap(raw: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    let mut unique: Vec<Candidate> = Vec::new();
    for c in raw {
        if seen.insert(c.id.clone()) {
            unique.push(c);
            if unique.len() >= MAX_UNIQUE_CANDIDATES {
                break;
            }
        }
    }
    unique
}

/// Gather candidates for the resolved keywords. A completely empty
/// intent-keyword result triggers one retry against the generic default
/// list: returning *something* outranks strict intent purity when nothing
/// at all was found.
pub async fn gather_candidates<G: GeoProvider + ?Sized>(
    geo: &G,
    origin: GeoPoint,
    intent_keywords: &[String],
    radius_m: f64,
    city: Option<&str>,
) -> Result<GatherOutcome> {
    let default_keywords: Vec<String> = DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect();

    if !intent_keywords.is_empty() {
        let raw = collect_raw(geo, origin, intent_keywords, radius_m, city).await?;
        if !raw.is_empty() {
            return Ok(GatherOutcome {
                candidates: dedup_and_cap(raw),
                used_generic_fallback: false,
            });
        }
        log::debug!("intent keywords {intent_keywords:?} found nothing, retrying generic list");
    }

    let raw = collect_raw(geo, origin, &default_keywords, radius_m, city).await?;
    Ok(GatherOutcome {
        candidates: dedup_and_cap(raw),
        used_generic_fallback: !intent_keywords.is_empty(),
    })
}
