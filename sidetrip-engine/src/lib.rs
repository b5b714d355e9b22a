//! sidetrip-engine: async pipeline and external collaborators for the
//! destination recommender. Domain math lives in `sidetrip-core`; this
//! crate owns the provider seams, the gather/finalize/enrich orchestration,
//! and the wire contracts.

pub mod amap;
pub mod enrich;
pub mod gather;
pub mod llm;
pub mod pipeline;
pub mod provider;
pub mod quest_api;

pub use amap::AmapClient;
pub use enrich::{
    Clock, EnrichmentInput, EnrichmentService, EnrichmentText, MonotonicClock, TextSource,
};
pub use gather::{GatherOutcome, gather_candidates};
pub use llm::OpenAiClient;
pub use pipeline::{DEFAULT_CITY, RecommendReply, RecommendRequest, Recommender, TripResult};
pub use provider::{GeoProvider, NarrativeError, NarrativeProvider, PlaceHit, RouteLeg};
pub use quest_api::{QuestEgg, QuestReply, QuestRequest, VerifyReply, VerifyRequest};
