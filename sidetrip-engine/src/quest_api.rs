//! Side-quest endpoints: eligibility + task generation, and arrival
//! verification. Task wording may be upgraded by the narrative provider
//! under the same fallback discipline as trip enrichment, but never in a
//! way that can loosen the safety rules.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use sidetrip_core::{
    GeoPoint, SAFETY_NOTES, TimeWindow, VERIFICATION_RADIUS_M, quest_eligible, quest_tasks,
    verify_arrival,
};

use crate::enrich::{Clock, EnrichmentService};
use crate::provider::NarrativeProvider;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestRequest {
    pub start_time: String,
    pub end_time: String,
    pub destination_name: String,
    #[serde(default)]
    pub destination_category: String,
    pub destination: GeoPoint,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestVerifyInfo {
    pub radius_meter: f64,
    pub dest_location: GeoPoint,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestEgg {
    pub title: String,
    pub story: String,
    pub tasks: Vec<String>,
    pub verify: QuestVerifyInfo,
    pub safety: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestReply {
    pub ok: bool,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub egg: Option<QuestEgg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub user: GeoPoint,
    pub destination: GeoPoint,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReply {
    pub ok: bool,
    pub reached: bool,
    pub distance_meter: f64,
    pub radius_meter: f64,
}

/// Model reply shape for reworded quests.
#[derive(Debug, Deserialize)]
struct QuestShape {
    title: String,
    story: String,
    tasks: Vec<String>,
}

/// Wording the provider must never introduce, checked on top of the shape.
const FORBIDDEN_TASK_TERMS: [&str; 6] = ["攀爬", "翻越", "爬上", "闯入", "陌生人", "私下见面"];

fn parse_quest(payload: &str) -> Option<QuestShape> {
    let shape: QuestShape = serde_json::from_str(payload).ok()?;
    if shape.title.trim().is_empty() || shape.story.trim().is_empty() {
        return None;
    }
    if !(2..=5).contains(&shape.tasks.len()) {
        return None;
    }
    let tasks_ok = shape.tasks.iter().all(|t| {
        let t = t.trim();
        !t.is_empty()
            && t.chars().count() <= 80
            && !FORBIDDEN_TASK_TERMS.iter().any(|f| t.contains(f))
    });
    if !tasks_ok {
        return None;
    }
    Some(shape)
}

fn quest_system_prompt() -> String {
    format!(
        "你是一个出行小游戏设计师。根据目的地信息改写一个\"抵达彩蛋\"任务，输出严格的 JSON：\
{{\"title\": \"...\", \"story\": \"...\", \"tasks\": [\"...\"]}}。tasks 为 2 到 5 条简短任务。\
安全红线（不可违反）：{}。不要输出其它内容。",
        SAFETY_NOTES.join("；")
    )
}

/// Eligibility + task generation. The template egg is always built first;
/// the provider may only reword it.
pub async fn side_quest<N: NarrativeProvider, C: Clock>(
    enrichment: &EnrichmentService<N, C>,
    req: &QuestRequest,
) -> Result<QuestReply> {
    let window = TimeWindow::parse(&req.start_time, &req.end_time)?;
    if !quest_eligible(&window) {
        return Ok(QuestReply {
            ok: true,
            eligible: false,
            message: Some(
                "彩蛋任务仅在 06:00-20:00 的白天时段开放，且时间窗不能跨越午夜".to_string(),
            ),
            egg: None,
        });
    }

    let name = req.destination_name.trim();
    let mut title = format!("抵达挑战：{name}");
    let mut story = format!(
        "传说在{name}藏着一枚彩蛋。到达目的地 {} 米范围内，完成下面的小任务即可点亮它。",
        VERIFICATION_RADIUS_M as i64
    );
    let mut tasks = quest_tasks(name, &req.destination_category);

    if enrichment.has_provider() {
        let cache_key = format!("quest:{name}:{}", req.destination_category);
        let user_prompt = format!(
            "目的地：{name}（{}）\n现有任务：{}",
            req.destination_category,
            tasks.join("；")
        );
        let payload = enrichment
            .guarded_completion(&cache_key, &quest_system_prompt(), &user_prompt, |p| {
                parse_quest(p).is_some()
            })
            .await;
        if let Some(shape) = payload.as_deref().and_then(parse_quest) {
            title = shape.title;
            story = shape.story;
            tasks = shape.tasks;
        }
    }

    Ok(QuestReply {
        ok: true,
        eligible: true,
        message: None,
        egg: Some(QuestEgg {
            title,
            story,
            tasks,
            verify: QuestVerifyInfo {
                radius_meter: VERIFICATION_RADIUS_M,
                dest_location: req.destination,
            },
            safety: SAFETY_NOTES.iter().map(|s| s.to_string()).collect(),
        }),
    })
}

/// Single stateless distance check; the user position is never retained.
pub fn verify(req: &VerifyRequest) -> VerifyReply {
    let check = verify_arrival(req.user, req.destination, VERIFICATION_RADIUS_M);
    VerifyReply {
        ok: true,
        reached: check.reached,
        distance_meter: check.distance_meter,
        radius_meter: check.radius_meter,
    }
}
