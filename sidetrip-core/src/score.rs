//! Candidate scoring: cheap pre-routing estimates and the composite weight.
//!
//! Everything here works from data already in hand (provider distance or
//! haversine); real routing happens later and only for the final pick.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geo::{self, GeoPoint, TravelMode};
use crate::intent::{IntentProfile, PrimaryIntent};

/// A place under consideration, alive for one request only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Dedup key: location + name.
    pub id: String,
    pub name: String,
    /// Raw type string from the provider.
    pub category: String,
    pub address: String,
    pub location: GeoPoint,
    pub distance_meters: Option<f64>,
    #[serde(default)]
    pub one_way_min: i64,
    #[serde(default)]
    pub play_min: i64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub match_hits: usize,
    #[serde(default)]
    pub affinity: f64,
}

impl Candidate {
    pub fn dedup_key(location: GeoPoint, name: &str) -> String {
        format!("{:.6},{:.6}|{}", location.lng, location.lat, name.trim())
    }
}

/// Composite-weight parameters; strong intent de-emphasizes distance and
/// lets affinity dominate.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub closeness: f64,
    pub novelty: f64,
    pub keyword: f64,
    pub affinity_gain: f64,
    pub affinity_floor: f64,
    pub affinity_ceil: f64,
}

impl ScoreWeights {
    pub fn for_intent(intent: &IntentProfile) -> Self {
        if intent.is_strong() {
            Self {
                closeness: 0.4,
                novelty: 0.2,
                keyword: 0.2,
                affinity_gain: 0.8,
                affinity_floor: 0.35,
                affinity_ceil: 1.8,
            }
        } else {
            Self {
                closeness: 0.55,
                novelty: 0.25,
                keyword: 0.2,
                affinity_gain: 0.45,
                affinity_floor: 0.6,
                affinity_ceil: 1.45,
            }
        }
    }
}

/// Per-request scoring inputs.
#[derive(Debug, Clone)]
pub struct ScoreContext<'a> {
    pub origin: GeoPoint,
    pub mode: TravelMode,
    pub available_minutes: i64,
    pub intent: &'a IntentProfile,
}

fn normalize(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<String>()
}

/// Coarse bucket for a candidate. The provider category string is
/// authoritative; the name is only a fallback (place names borrow terms
/// from their surroundings, e.g. a hotpot shop named after a park).
fn candidate_bucket(name: &str, category: &str) -> Option<PrimaryIntent> {
    bucket_of(&normalize(category)).or_else(|| bucket_of(&normalize(name)))
}

fn bucket_of(text: &str) -> Option<PrimaryIntent> {
    let any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if any(&["温泉", "洗浴", "足疗", "按摩", "spa"]) {
        Some(PrimaryIntent::Spa)
    } else if any(&["电影", "影院", "影城"]) {
        Some(PrimaryIntent::Movie)
    } else if any(&["博物馆", "美术馆", "书店", "图书馆", "科技馆", "展览"]) {
        Some(PrimaryIntent::Culture)
    } else if any(&["公园", "风景", "绿地", "植物园", "江滩", "湿地"]) {
        Some(PrimaryIntent::Park)
    } else if any(&["购物", "商场", "百货", "超市", "商业街"]) {
        Some(PrimaryIntent::Shopping)
    } else if any(&["餐饮", "美食", "餐厅", "咖啡", "火锅", "烧烤", "小吃", "甜品", "奶茶", "茶馆"]) {
        Some(PrimaryIntent::Food)
    } else {
        None
    }
}

/// Signed category fit in [-1, 1]. Park and food actively repel each other:
/// naive keyword matching lets food venues leak into park-intent results via
/// shared address terms, so the cross penalty is steep.
pub fn category_affinity(intent: PrimaryIntent, name: &str, category: &str) -> f64 {
    if intent == PrimaryIntent::Other {
        return 0.0;
    }
    let Some(bucket) = candidate_bucket(name, category) else {
        return 0.0;
    };
    if bucket == intent {
        return 1.0;
    }
    match (intent, bucket) {
        (PrimaryIntent::Park, PrimaryIntent::Food) | (PrimaryIntent::Food, PrimaryIntent::Park) => {
            -0.85
        }
        // Cinemas usually live inside malls.
        (PrimaryIntent::Movie, PrimaryIntent::Shopping)
        | (PrimaryIntent::Shopping, PrimaryIntent::Movie) => 0.2,
        _ => -0.4,
    }
}

/// Fraction of intent keywords found (case/space-normalized substring) in
/// name + address + category, plus the absolute hit count.
pub fn keyword_match(keywords: &[String], name: &str, address: &str, category: &str) -> (f64, usize) {
    if keywords.is_empty() {
        return (0.0, 0);
    }
    let haystack = format!("{}{}{}", normalize(name), normalize(address), normalize(category));
    let hits = keywords
        .iter()
        .map(|k| normalize(k))
        .filter(|k| !k.is_empty() && haystack.contains(k.as_str()))
        .count();
    (hits as f64 / keywords.len() as f64, hits)
}

/// Score every candidate in place, then apply the hard keyword pre-filter
/// and the intent-purity pass. Survivors come back sorted by weight
/// descending, capped at `max_ranked`.
pub fn score_and_rank(
    mut candidates: Vec<Candidate>,
    ctx: &ScoreContext,
    rng: &mut impl Rng,
    max_ranked: usize,
) -> Vec<Candidate> {
    let weights = ScoreWeights::for_intent(ctx.intent);
    let ideal = geo::ideal_one_way_minutes(ctx.available_minutes);
    let speed = ctx.mode.meters_per_minute();
    let has_keywords = !ctx.intent.keywords.is_empty();

    for c in candidates.iter_mut() {
        let dist = c
            .distance_meters
            .unwrap_or_else(|| geo::haversine_distance_meters(ctx.origin, c.location));
        c.distance_meters = Some(dist);
        c.one_way_min = ((dist / speed).round() as i64).max(1);
        c.play_min = ctx.available_minutes - 2 * c.one_way_min;

        let closeness = 1.0 - ((c.one_way_min as f64 - ideal).abs() / ideal).min(1.0);
        let novelty = rng.gen_range(0.7..1.3);
        let (match_score, hits) =
            keyword_match(&ctx.intent.keywords, &c.name, &c.address, &c.category);
        c.match_hits = hits;
        c.affinity = category_affinity(ctx.intent.primary, &c.name, &c.category);

        let affinity_factor = (1.0 + c.affinity * weights.affinity_gain)
            .clamp(weights.affinity_floor, weights.affinity_ceil);
        c.weight = (weights.closeness * closeness
            + weights.novelty * novelty
            + weights.keyword * match_score)
            * 100.0
            * affinity_factor;
    }

    // No keyword match at all means not a candidate, regardless of score.
    if has_keywords {
        candidates.retain(|c| c.match_hits > 0);
    }

    // Purity pass: a strongly on-intent neighbor proves good matches exist,
    // so weakly opposed outliers can be dropped without risking emptiness.
    if ctx.intent.is_strong() && candidates.iter().any(|c| c.affinity >= 0.7) {
        candidates.retain(|c| c.affinity >= -0.2);
    }

    candidates.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(max_ranked);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::resolve_rule_intent;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cand(name: &str, category: &str, address: &str, dist: f64) -> Candidate {
        let location = GeoPoint::new(112.9 + dist / 1_000_000.0, 28.2);
        Candidate {
            id: Candidate::dedup_key(location, name),
            name: name.to_string(),
            category: category.to_string(),
            address: address.to_string(),
            location,
            distance_meters: Some(dist),
            one_way_min: 0,
            play_min: 0,
            weight: 0.0,
            match_hits: 0,
            affinity: 0.0,
        }
    }

    fn ctx<'a>(intent: &'a IntentProfile) -> ScoreContext<'a> {
        ScoreContext {
            origin: GeoPoint::new(112.9, 28.2),
            mode: TravelMode::Walk,
            available_minutes: 180,
            intent,
        }
    }

    #[test]
    fn test_estimates_and_budget_identity() {
        let intent = resolve_rule_intent("", None);
        let cands = vec![cand("岳麓山公园", "风景名胜;公园", "麓山路", 1700.0)];
        let mut rng = StdRng::seed_from_u64(7);
        let ranked = score_and_rank(cands, &ctx(&intent), &mut rng, 10);
        let c = &ranked[0];
        assert_eq!(c.one_way_min, 20); // 1700 / 85
        assert_eq!(c.play_min, 180 - 40);
    }

    #[test]
    fn test_one_way_floor_is_one_minute() {
        let intent = resolve_rule_intent("", None);
        let cands = vec![cand("楼下便利店", "购物服务", "本小区", 10.0)];
        let mut rng = StdRng::seed_from_u64(7);
        let ranked = score_and_rank(cands, &ctx(&intent), &mut rng, 10);
        assert_eq!(ranked[0].one_way_min, 1);
    }

    #[test]
    fn test_hard_prefilter_discards_zero_hit_candidates() {
        let intent = resolve_rule_intent("想喝咖啡", None);
        assert!(!intent.keywords.is_empty());
        let cands = vec![
            cand("瑞幸咖啡", "餐饮服务;咖啡厅", "解放西路", 900.0),
            cand("建设银行", "金融保险", "解放西路", 400.0),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        let ranked = score_and_rank(cands, &ctx(&intent), &mut rng, 10);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].name.contains("咖啡"));
        assert!(ranked[0].match_hits > 0);
    }

    #[test]
    fn test_no_keywords_means_no_prefilter() {
        let intent = resolve_rule_intent("", None);
        let cands = vec![cand("建设银行", "金融保险", "解放西路", 400.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let ranked = score_and_rank(cands, &ctx(&intent), &mut rng, 10);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_park_intent_repels_food_venues() {
        let intent = resolve_rule_intent("想去公园散步", None);
        // The hotpot place matches "公园" via its address.
        let cands = vec![
            cand("烈士公园", "风景名胜;公园", "东风路", 1600.0),
            cand("公园口火锅店", "餐饮服务;火锅", "公园东路", 1500.0),
        ];
        let mut rng = StdRng::seed_from_u64(3);
        let ranked = score_and_rank(cands, &ctx(&intent), &mut rng, 10);
        // Strong park intent + a full-affinity park candidate: the food
        // outlier (affinity -0.85 < -0.2) is dropped by the purity pass.
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "烈士公园");
        assert!((ranked[0].affinity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_purity_pass_inactive_without_high_affinity_anchor() {
        let intent = resolve_rule_intent("想去公园散步", None);
        let cands = vec![cand("公园口火锅店", "餐饮服务;火锅", "公园东路", 1500.0)];
        let mut rng = StdRng::seed_from_u64(3);
        let ranked = score_and_rank(cands, &ctx(&intent), &mut rng, 10);
        // No on-intent anchor exists, so the opposed candidate survives.
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_affinity_matrix() {
        assert_eq!(category_affinity(PrimaryIntent::Park, "烈士公园", "公园"), 1.0);
        assert_eq!(
            category_affinity(PrimaryIntent::Park, "老王火锅", "餐饮服务;火锅"),
            -0.85
        );
        assert_eq!(
            category_affinity(PrimaryIntent::Food, "烈士公园", "风景名胜;公园"),
            -0.85
        );
        assert_eq!(
            category_affinity(PrimaryIntent::Movie, "万达广场", "购物服务;商场"),
            0.2
        );
        assert_eq!(category_affinity(PrimaryIntent::Other, "任意", "任意"), 0.0);
        assert_eq!(category_affinity(PrimaryIntent::Spa, "无类别", ""), 0.0);
    }

    #[test]
    fn test_ranking_is_deterministic_under_fixed_seed() {
        let intent = resolve_rule_intent("想喝咖啡", None);
        let mk = || {
            vec![
                cand("瑞幸咖啡", "餐饮服务;咖啡厅", "解放西路", 900.0),
                cand("星巴克咖啡", "餐饮服务;咖啡厅", "五一大道", 1400.0),
                cand("Manner咖啡", "餐饮服务;咖啡厅", "黄兴路", 2100.0),
            ]
        };
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a = score_and_rank(mk(), &ctx(&intent), &mut rng_a, 10);
        let b = score_and_rank(mk(), &ctx(&intent), &mut rng_b, 10);
        let names: Vec<_> = a.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, b.iter().map(|c| c.name.clone()).collect::<Vec<_>>());
        assert!(a.windows(2).all(|w| w[0].weight >= w[1].weight));
    }

    #[test]
    fn test_rank_cap() {
        let intent = resolve_rule_intent("", None);
        let cands: Vec<_> = (0..18)
            .map(|i| cand(&format!("地点{i}"), "生活服务", "某路", 500.0 + i as f64 * 90.0))
            .collect();
        let mut rng = StdRng::seed_from_u64(9);
        let ranked = score_and_rank(cands, &ctx(&intent), &mut rng, 10);
        assert_eq!(ranked.len(), 10);
    }
}
