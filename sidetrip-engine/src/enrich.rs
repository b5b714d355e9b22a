//! Narrative enrichment with a mandatory deterministic fallback.
//!
//! The service owns the process-wide TTL cache and the single-slot
//! serialization queue; both exist only as politeness toward a rate-limited
//! external provider, never for correctness. It is constructed once at
//! startup and passed by reference, so tests can inject a fake clock and a
//! fake provider.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use sidetrip_core::{Candidate, IntentProfile, TravelMode};

use crate::provider::{NarrativeError, NarrativeProvider};

/// Identical inputs reuse a provider result for this long.
pub const CACHE_TTL: Duration = Duration::from_secs(600);

/// Extra attempts after a rate-limit response.
const RATE_LIMIT_RETRIES: u32 = 2;
const BACKOFF_BASE: Duration = Duration::from_millis(600);

/// Injectable time source so TTL tests need no sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Which path produced the returned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSource {
    Rule,
    Model,
}

/// Structured trip facts handed to the narrative layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentInput {
    pub intent: IntentProfile,
    pub mode: TravelMode,
    pub city: String,
    pub destination_name: String,
    pub destination_category: String,
    pub destination_address: String,
    pub go_min: i64,
    pub back_min: i64,
    pub play_min: i64,
    pub alternates: Vec<String>,
}

impl EnrichmentInput {
    pub fn from_plan(
        intent: &IntentProfile,
        mode: TravelMode,
        city: &str,
        destination: &Candidate,
        go_min: i64,
        back_min: i64,
        play_min: i64,
        alternates: &[Candidate],
    ) -> Self {
        Self {
            intent: intent.clone(),
            mode,
            city: city.to_string(),
            destination_name: destination.name.clone(),
            destination_category: destination.category.clone(),
            destination_address: destination.address.clone(),
            go_min,
            back_min,
            play_min,
            alternates: alternates.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

/// Report + short guide, with the path that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentText {
    pub report_markdown: String,
    pub guide: Vec<String>,
    pub source: TextSource,
}

/// Strict shape expected back from the provider.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportShape {
    report_markdown: String,
    guide: Vec<String>,
}

pub struct EnrichmentService<N, C = MonotonicClock> {
    provider: Option<N>,
    clock: C,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, String)>>,
    slot: tokio::sync::Mutex<()>,
}

impl<N: NarrativeProvider> EnrichmentService<N, MonotonicClock> {
    /// `provider = None` means no credential is configured: every call
    /// returns the deterministic fallback.
    pub fn new(provider: Option<N>) -> Self {
        Self::with_clock(provider, MonotonicClock)
    }
}

impl<N: NarrativeProvider, C: Clock> EnrichmentService<N, C> {
    pub fn with_clock(provider: Option<N>, clock: C) -> Self {
        Self {
            provider,
            clock,
            ttl: CACHE_TTL,
            cache: Mutex::new(HashMap::new()),
            slot: tokio::sync::Mutex::new(()),
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    fn cache_get(&self, key: &str) -> Option<String> {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        // TTL eviction happens on read.
        if let Some((stored_at, _)) = cache.get(key) {
            if self.clock.now().duration_since(*stored_at) >= self.ttl {
                cache.remove(key);
                return None;
            }
        }
        cache.get(key).map(|(_, v)| v.clone())
    }

    fn cache_put(&self, key: String, value: String) {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.insert(key, (self.clock.now(), value));
    }

    /// Guarded provider call: cache, process-wide serialization, bounded
    /// rate-limit backoff, caller-supplied validation. `None` means the
    /// caller should use its fallback.
    pub async fn guarded_completion(
        &self,
        cache_key: &str,
        system: &str,
        user: &str,
        valid: impl Fn(&str) -> bool,
    ) -> Option<String> {
        let provider = self.provider.as_ref()?;

        if let Some(hit) = self.cache_get(cache_key) {
            return Some(hit);
        }

        // One in-flight narrative call per process; later requests wait for
        // the current one to finish, success or failure.
        let _slot = self.slot.lock().await;

        // A queued request may find the answer cached by the one ahead.
        if let Some(hit) = self.cache_get(cache_key) {
            return Some(hit);
        }

        let mut attempt = 0;
        loop {
            match provider.complete(system, user).await {
                Ok(text) => {
                    let payload = extract_json(&text);
                    if valid(&payload) {
                        self.cache_put(cache_key.to_string(), payload.clone());
                        return Some(payload);
                    }
                    log::warn!("narrative payload failed validation, using fallback");
                    return None;
                }
                Err(NarrativeError::RateLimited) if attempt < RATE_LIMIT_RETRIES => {
                    attempt += 1;
                    let wait = BACKOFF_BASE * 2u32.pow(attempt - 1);
                    log::debug!("narrative rate limited, retry {attempt} in {wait:?}");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    log::warn!("narrative provider unavailable: {e}");
                    return None;
                }
            }
        }
    }

    /// Produce the report + guide for a finalized trip. The deterministic
    /// fallback is always built; the provider may upgrade it.
    pub async fn enrich(&self, input: &EnrichmentInput) -> EnrichmentText {
        let fallback = fallback_text(input);
        if self.provider.is_none() {
            return fallback;
        }

        let Ok(cache_key) = serde_json::to_string(input) else {
            return fallback;
        };
        let user_prompt = build_report_prompt(input);

        let payload = self
            .guarded_completion(&cache_key, REPORT_SYSTEM_PROMPT, &user_prompt, |p| {
                parse_report(p).is_some()
            })
            .await;

        match payload.as_deref().and_then(parse_report) {
            Some(shape) => EnrichmentText {
                report_markdown: shape.report_markdown,
                guide: shape.guide,
                source: TextSource::Model,
            },
            None => fallback,
        }
    }
}

const REPORT_SYSTEM_PROMPT: &str = "你是一个出行助手。根据给出的行程事实，输出严格的 JSON 对象：\
{\"reportMarkdown\": \"...\", \"guide\": [\"...\"]}。reportMarkdown 是一段简短的 Markdown 行程报告，\
guide 是 3 到 6 条简短建议。不要输出 JSON 以外的任何内容。";

fn build_report_prompt(input: &EnrichmentInput) -> String {
    let mut s = format!(
        "目的地：{}（{}，{}）\n出行方式：{}\n去程约 {} 分钟，回程约 {} 分钟，可停留约 {} 分钟\n",
        input.destination_name,
        input.destination_category,
        input.destination_address,
        input.mode.as_str(),
        input.go_min,
        input.back_min,
        input.play_min,
    );
    if !input.city.is_empty() {
        s.push_str(&format!("城市：{}\n", input.city));
    }
    if !input.intent.keywords.is_empty() {
        s.push_str(&format!("用户偏好关键词：{}\n", input.intent.keywords.join("、")));
    }
    if !input.alternates.is_empty() {
        s.push_str(&format!("备选地点：{}\n", input.alternates.join("、")));
    }
    s
}

/// Strict-shape validation: non-empty report plus 3-6 short guide bullets.
fn parse_report(payload: &str) -> Option<ReportShape> {
    let shape: ReportShape = serde_json::from_str(payload).ok()?;
    if shape.report_markdown.trim().is_empty() {
        return None;
    }
    if !(3..=6).contains(&shape.guide.len()) {
        return None;
    }
    if shape.guide.iter().any(|g| g.trim().is_empty() || g.chars().count() > 120) {
        return None;
    }
    Some(shape)
}

/// Pull the first JSON object out of a model reply, stripping code fences.
pub fn extract_json(text: &str) -> String {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    match (inner.find('{'), inner.rfind('}')) {
        (Some(start), Some(end)) if end > start => inner[start..=end].to_string(),
        _ => inner.to_string(),
    }
}

/// Template report + guide used whenever the provider is absent or fails.
pub fn fallback_text(input: &EnrichmentInput) -> EnrichmentText {
    let mut report = format!(
        "## 出行建议：{}\n\n- 类型：{}\n- 地址：{}\n- 去程约 {} 分钟，回程约 {} 分钟\n- 预计可停留 {} 分钟\n",
        input.destination_name,
        if input.destination_category.is_empty() { "未知" } else { &input.destination_category },
        if input.destination_address.is_empty() { "未提供" } else { &input.destination_address },
        input.go_min,
        input.back_min,
        input.play_min,
    );
    if !input.alternates.is_empty() {
        report.push_str(&format!("\n备选：{}\n", input.alternates.join("、")));
    }

    let guide = vec![
        "出发前确认目的地营业或开放时间".to_string(),
        format!("来回路上约需 {} 分钟，注意掌握时间", input.go_min + input.back_min),
        "到预定返回时间请立即返程，不要恋战".to_string(),
        "带上水和手机充电宝".to_string(),
    ];

    EnrichmentText {
        report_markdown: report,
        guide,
        source: TextSource::Rule,
    }
}
