//! sidetrip-core: pure domain logic for the destination recommender.
//!
//! Everything in this crate is synchronous and deterministic (the one
//! random input, the novelty draw, is injected by the caller). Network
//! providers and orchestration live in `sidetrip-engine`.

pub mod geo;
pub mod intent;
pub mod quest;
pub mod relax;
pub mod score;
pub mod window;

pub use geo::{
    GeoPoint, TravelMode, haversine_distance_meters, ideal_one_way_minutes,
    suggested_search_radius_meters,
};
pub use intent::{
    DEFAULT_KEYWORDS, IntentProfile, IntentSource, ModelIntent, PrimaryIntent, heuristic_keywords,
    infer_intent_primary, merge_model_intent, resolve_rule_intent, suggested_min_stay_minutes,
};
pub use quest::{
    ArrivalCheck, QuestTheme, SAFETY_NOTES, VERIFICATION_RADIUS_M, quest_eligible, quest_tasks,
    quest_theme, verify_arrival,
};
pub use relax::{ChainResult, FilterState, run_filter_chain};
pub use score::{Candidate, ScoreContext, ScoreWeights, category_affinity, score_and_rank};
pub use window::{TimeWindow, minutes_between, parse_hhmm};
