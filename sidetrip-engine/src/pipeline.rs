//! The recommendation pipeline: validate, resolve intent, gather, score,
//! relax, finalize the budget with real routing, enrich, reply.

use anyhow::{Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use sidetrip_core::{
    Candidate, ChainResult, FilterState, GeoPoint, IntentProfile, IntentSource, ModelIntent,
    ScoreContext, TimeWindow, TravelMode, merge_model_intent, resolve_rule_intent, run_filter_chain,
    score_and_rank, suggested_min_stay_minutes, suggested_search_radius_meters,
};

use crate::enrich::{Clock, EnrichmentInput, EnrichmentService, MonotonicClock, TextSource};
use crate::gather::{MAX_UNIQUE_CANDIDATES, gather_candidates};
use crate::provider::{GeoProvider, NarrativeProvider};
use crate::quest_api::{self, VerifyReply, VerifyRequest};

/// City scope applied when the request does not set one. An explicit empty
/// string disables city scoping entirely.
pub const DEFAULT_CITY: &str = "长沙";

/// Ranked survivors kept after the filter chain.
const MAX_FINAL_RANKED: usize = 10;
/// Disclosed alternates after the top pick.
const MAX_ALTERNATES: usize = 3;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendRequest {
    pub origin: GeoPoint,
    pub mode: TravelMode,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub min_stay_min: Option<i64>,
    #[serde(default = "default_true")]
    pub allow_relax: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripResult {
    pub name: String,
    pub category: String,
    pub address: String,
    pub location: GeoPoint,
    pub go_min: i64,
    pub back_min: i64,
    pub play_min: i64,
    pub polyline: String,
    pub reasons: Vec<String>,
    pub guide: Vec<String>,
    pub source: TextSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendReply {
    pub ok: bool,
    pub empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<RecommendRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentProfile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relax_notes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TripResult>,
}

impl RecommendReply {
    /// Structurally valid input, but no feasible round trip: a successful
    /// reply, not an error.
    fn empty_outcome(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            empty: true,
            message: Some(message.into()),
            city: None,
            input: None,
            intent: None,
            relax_notes: Vec::new(),
            candidates: Vec::new(),
            report_markdown: None,
            result: None,
        }
    }
}

pub struct Recommender<G, N, C = MonotonicClock> {
    geo: G,
    enrichment: EnrichmentService<N, C>,
    use_model_intent: bool,
    novelty_seed: Option<u64>,
}

impl<G, N, C> Recommender<G, N, C>
where
    G: GeoProvider,
    N: NarrativeProvider,
    C: Clock,
{
    pub fn new(geo: G, enrichment: EnrichmentService<N, C>) -> Self {
        Self {
            geo,
            enrichment,
            use_model_intent: false,
            novelty_seed: None,
        }
    }

    /// Ask the narrative provider to refine intent classification. The rule
    /// pass stays the safety net either way.
    pub fn with_model_intent(mut self, enabled: bool) -> Self {
        self.use_model_intent = enabled;
        self
    }

    /// Fix the novelty RNG seed. Tests use this to assert exact ordering.
    pub fn with_novelty_seed(mut self, seed: u64) -> Self {
        self.novelty_seed = Some(seed);
        self
    }

    pub async fn recommend(&self, req: &RecommendRequest) -> Result<RecommendReply> {
        // Validation rejects before any external call.
        if !req.origin.is_valid() {
            bail!("invalid origin coordinates: {:?}", req.origin);
        }
        let window = TimeWindow::parse(&req.start_time, &req.end_time)?;
        let avail = window.safe_minutes();

        let mood = req.mood.as_deref().unwrap_or("");
        let mut intent = resolve_rule_intent(mood, req.categories.as_deref());
        if self.use_model_intent && intent.source == IntentSource::Rule && !mood.trim().is_empty() {
            if let Some(model) = self.model_intent_guess(mood).await {
                intent = merge_model_intent(&intent, &model);
            }
        }

        let city = match &req.city {
            Some(c) => c.clone(),
            None => DEFAULT_CITY.to_string(),
        };
        let city_scope = if city.is_empty() { None } else { Some(city.as_str()) };

        let radius = suggested_search_radius_meters(req.mode, avail);
        let outcome =
            gather_candidates(&self.geo, req.origin, &intent.keywords, radius, city_scope).await?;
        if outcome.candidates.is_empty() {
            return Ok(RecommendReply::empty_outcome(
                "附近没有找到合适的候选地点，建议放宽时间窗或更换出行方式",
            ));
        }

        // After a generic fallback the intent keywords matched nothing, so
        // they must not drive the keyword pre-filter.
        let mut scoring_intent = intent.clone();
        if outcome.used_generic_fallback {
            scoring_intent.keywords.clear();
        }

        let min_stay = req
            .min_stay_min
            .unwrap_or_else(|| suggested_min_stay_minutes(&scoring_intent, avail));

        let mut rng = match self.novelty_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let ctx = ScoreContext {
            origin: req.origin,
            mode: req.mode,
            available_minutes: avail,
            intent: &scoring_intent,
        };
        let scored = score_and_rank(outcome.candidates, &ctx, &mut rng, MAX_UNIQUE_CANDIDATES);
        if scored.is_empty() {
            return Ok(RecommendReply::empty_outcome(
                "附近没有与偏好匹配的地点，建议换个说法或放宽条件",
            ));
        }

        let mut state = FilterState::new(
            min_stay,
            !scoring_intent.keywords.is_empty(),
            req.allow_relax,
        );
        let (mut survivors, mut notes) = match run_filter_chain(&scored, &mut state) {
            ChainResult::Kept { survivors, notes } => (survivors, notes),
            ChainResult::Exhausted => {
                return Ok(RecommendReply::empty_outcome(
                    "时间窗太紧，无法完成任何往返行程",
                ));
            }
        };
        survivors.truncate(MAX_FINAL_RANKED);

        let destination = survivors[0].clone();
        let alternates: Vec<Candidate> =
            survivors.iter().skip(1).take(MAX_ALTERNATES).cloned().collect();

        // Routing is expensive and rate-limited: exactly one candidate gets
        // real routes, both legs in flight together.
        let (go_leg, back_leg) = tokio::join!(
            self.geo.route(req.mode, req.origin, destination.location),
            self.geo.route(req.mode, destination.location, req.origin),
        );
        let go_leg = go_leg?;
        let back_leg = back_leg?;

        let go_min = leg_minutes(go_leg.duration_seconds);
        let back_min = leg_minutes(back_leg.duration_seconds);
        let play_min = avail - go_min - back_min;
        if play_min < 0 {
            // The cheap estimate materially disagreed with real routing.
            // Treated as transient; no second candidate, to bound latency.
            log::warn!(
                "negative dwell after routing: avail={avail} go={go_min} back={back_min}"
            );
            return Ok(RecommendReply::empty_outcome(
                "路线规划结果与预估偏差较大，请稍后重试",
            ));
        }
        if play_min < state.min_stay_minutes {
            notes.push(format!(
                "实际可停留时间约 {play_min} 分钟，低于期望的 {} 分钟，建议延长时间窗或更换出行方式",
                state.min_stay_minutes
            ));
        }

        let enrich_input = EnrichmentInput::from_plan(
            &intent,
            req.mode,
            &city,
            &destination,
            go_min,
            back_min,
            play_min,
            &alternates,
        );
        let text = self.enrichment.enrich(&enrich_input).await;

        let reasons = build_reasons(&destination, &scoring_intent);
        Ok(RecommendReply {
            ok: true,
            empty: false,
            message: None,
            city: Some(city),
            input: Some(req.clone()),
            intent: Some(intent),
            relax_notes: notes,
            candidates: alternates,
            report_markdown: Some(text.report_markdown),
            result: Some(TripResult {
                name: destination.name.clone(),
                category: destination.category.clone(),
                address: destination.address.clone(),
                location: destination.location,
                go_min,
                back_min,
                play_min,
                polyline: go_leg.polyline,
                reasons,
                guide: text.guide,
                source: text.source,
            }),
        })
    }

    async fn model_intent_guess(&self, mood: &str) -> Option<ModelIntent> {
        const SYSTEM: &str = "你是一个意图分类器。根据用户的出行偏好文本，输出严格的 JSON：\
{\"primary\": \"park|food|shopping|culture|movie|spa|other\", \"confidence\": 0.0, \
\"keywords\": [\"...\"]}。keywords 为适合地图搜索的地点类型词，最多 4 个。不要输出其它内容。";
        let cache_key = format!("intent:{mood}");
        let payload = self
            .enrichment
            .guarded_completion(&cache_key, SYSTEM, mood, |p| {
                serde_json::from_str::<ModelIntent>(p).is_ok()
            })
            .await?;
        serde_json::from_str(&payload).ok()
    }

    pub fn verify_arrival(&self, req: &VerifyRequest) -> VerifyReply {
        quest_api::verify(req)
    }
}

/// Seconds to whole minutes with a floor of one.
fn leg_minutes(duration_seconds: i64) -> i64 {
    ((duration_seconds as f64 / 60.0).round() as i64).max(1)
}

/// Human-readable reasons the top pick won, disclosed with the plan.
fn build_reasons(destination: &Candidate, intent: &IntentProfile) -> Vec<String> {
    let mut reasons = vec![format!("单程约 {} 分钟，往返都在时间窗内", destination.one_way_min)];
    if destination.match_hits > 0 {
        reasons.push(format!("命中 {} 个偏好关键词", destination.match_hits));
    }
    if destination.affinity >= 0.7 {
        reasons.push(format!("类别与「{}」偏好高度契合", intent.primary.as_str()));
    } else if destination.affinity <= -0.2 {
        reasons.push("类别与偏好不完全一致，但综合评分最高".to_string());
    }
    reasons.push(format!("综合评分 {:.0}", destination.weight));
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leg_minutes_rounds_with_floor() {
        assert_eq!(leg_minutes(0), 1);
        assert_eq!(leg_minutes(29), 1);
        assert_eq!(leg_minutes(90), 2);
        assert_eq!(leg_minutes(754), 13);
    }

    #[test]
    fn test_request_defaults() {
        let req: RecommendRequest = serde_json::from_str(
            r#"{"origin":{"lng":112.9,"lat":28.2},"mode":"walk","startTime":"09:00","endTime":"12:00"}"#,
        )
        .unwrap();
        assert!(req.allow_relax);
        assert!(req.city.is_none());
        assert!(req.mood.is_none());
        assert!(req.min_stay_min.is_none());
    }

    #[test]
    fn test_empty_reply_serialization_shape() {
        let reply = RecommendReply::empty_outcome("时间窗太紧");
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["empty"], true);
        assert!(json.get("result").is_none());
        assert!(json.get("relaxNotes").is_none());
    }
}
