//! External collaborator seams: geospatial search/routing and narrative
//! text generation. The pipeline only ever talks to these traits.

use async_trait::async_trait;

use sidetrip_core::{GeoPoint, TravelMode};

/// One nearby-place search hit as the provider reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceHit {
    pub name: String,
    pub category: String,
    pub address: String,
    pub location: GeoPoint,
    /// Provider-reported distance from the search origin, when available.
    pub distance_meters: Option<f64>,
}

/// One routed leg between two points.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteLeg {
    pub duration_seconds: i64,
    /// Encoded path geometry, provider format.
    pub polyline: String,
}

/// Nearby search + routing. Failures here are fatal to a request; there is
/// no per-call retry.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Up to one page of places near `origin` matching `keyword`, sorted by
    /// distance. Pages are 1-based. An empty `city` scope means no scoping.
    async fn search_nearby(
        &self,
        origin: GeoPoint,
        keyword: &str,
        radius_m: f64,
        page: u32,
        city: Option<&str>,
    ) -> anyhow::Result<Vec<PlaceHit>>;

    async fn route(
        &self,
        mode: TravelMode,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> anyhow::Result<RouteLeg>;
}

/// Narrative provider failure, split so the enrichment layer can retry
/// rate limits and nothing else.
#[derive(Debug)]
pub enum NarrativeError {
    RateLimited,
    Failed(String),
}

impl std::fmt::Display for NarrativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NarrativeError::RateLimited => write!(f, "narrative provider rate limited"),
            NarrativeError::Failed(msg) => write!(f, "narrative provider failed: {msg}"),
        }
    }
}

impl std::error::Error for NarrativeError {}

/// Best-effort text generation. Every caller must hold a deterministic
/// fallback; an error from here is never surfaced outward.
#[async_trait]
pub trait NarrativeProvider: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, NarrativeError>;
}
