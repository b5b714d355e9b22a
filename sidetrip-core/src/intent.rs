//! Intent resolution: free-text preference -> search keywords + primary
//! intent + confidence.
//!
//! Deterministic-first, like task routing: a cheap rule pass is always run
//! and always trusted as the baseline; an optional model pass may refine the
//! classification but can never replace the rule-derived keyword list.

use serde::{Deserialize, Serialize};

/// Maximum number of search keywords carried by a profile.
pub const MAX_KEYWORDS: usize = 6;

/// Raw preference text at or below this many chars is usable as a keyword
/// verbatim when no trigger matched.
const SHORT_TEXT_CHARS: usize = 8;

/// Generic fallback keywords used when a request carries no intent signal at
/// all, or when an intent-keyword search comes back completely empty.
pub const DEFAULT_KEYWORDS: [&str; 11] = [
    "公园", "咖啡厅", "商场", "博物馆", "电影院", "书店", "美食", "景点", "步行街", "图书馆",
    "广场",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryIntent {
    Park,
    Food,
    Shopping,
    Culture,
    Movie,
    Spa,
    Other,
}

impl PrimaryIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimaryIntent::Park => "park",
            PrimaryIntent::Food => "food",
            PrimaryIntent::Shopping => "shopping",
            PrimaryIntent::Culture => "culture",
            PrimaryIntent::Movie => "movie",
            PrimaryIntent::Spa => "spa",
            PrimaryIntent::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentSource {
    Rule,
    Manual,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentProfile {
    pub keywords: Vec<String>,
    pub primary: PrimaryIntent,
    pub confidence: f64,
    pub source: IntentSource,
}

impl IntentProfile {
    /// A classification is "strong" when a trigger actually fired.
    pub fn is_strong(&self) -> bool {
        self.confidence >= 0.7
    }
}

/// A keyword trigger set: if any pattern appears in the text, all tokens are
/// added. Sets are independent and non-exclusive.
struct TriggerSet {
    patterns: &'static [&'static str],
    tokens: &'static [&'static str],
}

const KEYWORD_TRIGGERS: &[TriggerSet] = &[
    TriggerSet {
        patterns: &["温泉", "泡汤", "足疗", "按摩", "spa"],
        tokens: &["温泉", "足疗按摩", "spa"],
    },
    TriggerSet {
        patterns: &["咖啡", "coffee", "拿铁", "美式"],
        tokens: &["咖啡厅", "咖啡"],
    },
    TriggerSet {
        patterns: &["火锅", "烧烤", "烤肉", "串串", "bbq"],
        tokens: &["火锅", "烧烤"],
    },
    TriggerSet {
        patterns: &["甜品", "奶茶", "蛋糕", "甜点"],
        tokens: &["甜品店", "奶茶"],
    },
    TriggerSet {
        patterns: &["吃", "美食", "餐厅", "饿"],
        tokens: &["美食", "餐厅"],
    },
    TriggerSet {
        patterns: &["公园", "散步", "走走", "江边", "河边", "湖", "绿道"],
        tokens: &["公园", "江滩公园"],
    },
    TriggerSet {
        patterns: &["购物", "逛街", "商场", "买点"],
        tokens: &["购物中心", "商场"],
    },
    TriggerSet {
        patterns: &["电影", "影院", "看片"],
        tokens: &["电影院"],
    },
    TriggerSet {
        patterns: &["博物馆", "展览", "美术馆", "书店", "文化"],
        tokens: &["博物馆", "美术馆", "书店"],
    },
];

/// An intent trigger set, checked in priority order; the first hit wins.
struct IntentTrigger {
    intent: PrimaryIntent,
    patterns: &'static [&'static str],
}

// Priority: spa > movie > culture > park > shopping > food.
const INTENT_TRIGGERS: &[IntentTrigger] = &[
    IntentTrigger {
        intent: PrimaryIntent::Spa,
        patterns: &["温泉", "泡汤", "足疗", "按摩", "spa"],
    },
    IntentTrigger {
        intent: PrimaryIntent::Movie,
        patterns: &["电影", "影院", "看片"],
    },
    IntentTrigger {
        intent: PrimaryIntent::Culture,
        patterns: &["博物馆", "展览", "美术馆", "书店", "文化"],
    },
    IntentTrigger {
        intent: PrimaryIntent::Park,
        patterns: &["公园", "散步", "走走", "江边", "河边", "绿道"],
    },
    IntentTrigger {
        intent: PrimaryIntent::Shopping,
        patterns: &["购物", "逛街", "商场"],
    },
    IntentTrigger {
        intent: PrimaryIntent::Food,
        patterns: &[
            "吃", "美食", "餐厅", "饿", "火锅", "烧烤", "烤肉", "咖啡", "coffee", "甜品", "奶茶",
            "蛋糕",
        ],
    },
];

fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<String>()
}

fn push_unique(out: &mut Vec<String>, token: &str) {
    if out.len() < MAX_KEYWORDS && !out.iter().any(|t| t == token) {
        out.push(token.to_string());
    }
}

/// Rule pass: collect keyword tokens from every matching trigger set.
pub fn heuristic_keywords(text: &str) -> Vec<String> {
    let norm = normalize(text);
    let mut out = Vec::new();
    if norm.is_empty() {
        return out;
    }

    for set in KEYWORD_TRIGGERS {
        if set.patterns.iter().any(|p| norm.contains(p)) {
            for token in set.tokens {
                push_unique(&mut out, token);
            }
        }
    }

    // Short unmatched text is likely already a place-type token.
    if out.is_empty() {
        let trimmed = text.trim();
        if !trimmed.is_empty() && trimmed.chars().count() <= SHORT_TEXT_CHARS {
            out.push(trimmed.to_string());
        }
    }

    out
}

/// Classify a single primary intent from text + keywords, priority-ordered.
/// Returns the intent and whether a trigger actually fired.
pub fn infer_intent_primary(text: &str, keywords: &[String]) -> (PrimaryIntent, bool) {
    let mut haystack = normalize(text);
    for k in keywords {
        haystack.push_str(&normalize(k));
    }

    for trig in INTENT_TRIGGERS {
        if trig.patterns.iter().any(|p| haystack.contains(p)) {
            return (trig.intent, true);
        }
    }
    (PrimaryIntent::Other, false)
}

/// Full rule-pass resolution. An explicit category list is authoritative
/// (`source=manual`); otherwise keywords come from the trigger sets.
pub fn resolve_rule_intent(text: &str, categories: Option<&[String]>) -> IntentProfile {
    if let Some(cats) = categories {
        let mut keywords = Vec::new();
        for c in cats {
            let c = c.trim();
            if !c.is_empty() {
                push_unique(&mut keywords, c);
            }
        }
        if !keywords.is_empty() {
            let (primary, strong) = infer_intent_primary(text, &keywords);
            return IntentProfile {
                keywords,
                primary,
                confidence: if strong { 0.8 } else { 0.55 },
                source: IntentSource::Manual,
            };
        }
    }

    let keywords = heuristic_keywords(text);
    let (primary, strong) = infer_intent_primary(text, &keywords);
    IntentProfile {
        keywords,
        primary,
        confidence: if strong { 0.8 } else { 0.55 },
        source: IntentSource::Rule,
    }
}

/// A model-backed classification, produced by an external resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelIntent {
    pub primary: PrimaryIntent,
    pub confidence: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Asymmetric trust between the rule pass and a model classification.
///
/// The model wins only when its own confidence is at least 0.7 AND it does
/// not contradict a strong rule classification while below 0.85. Keywords
/// are always the rule tokens enriched (never replaced) by the model's.
pub fn merge_model_intent(rule: &IntentProfile, model: &ModelIntent) -> IntentProfile {
    let contradicts_strong_rule = rule.is_strong() && model.primary != rule.primary;
    let trust_model =
        model.confidence >= 0.7 && !(contradicts_strong_rule && model.confidence < 0.85);

    let mut keywords = rule.keywords.clone();
    for k in &model.keywords {
        let k = k.trim();
        if !k.is_empty() {
            push_unique(&mut keywords, k);
        }
    }

    if trust_model {
        IntentProfile {
            keywords,
            primary: model.primary,
            confidence: model.confidence.clamp(0.0, 1.0),
            source: IntentSource::Model,
        }
    } else {
        IntentProfile { keywords, ..rule.clone() }
    }
}

/// Dwell-time default keyed by intent signals, clamped so at least 10
/// minutes of margin remain below the available window.
pub fn suggested_min_stay_minutes(profile: &IntentProfile, available_minutes: i64) -> i64 {
    let has = |needle: &str| {
        profile
            .keywords
            .iter()
            .any(|k| normalize(k).contains(needle))
    };

    let base = if has("温泉") || profile.primary == PrimaryIntent::Spa {
        120
    } else if has("电影") || profile.primary == PrimaryIntent::Movie {
        120
    } else if has("火锅") || has("烧烤") {
        60
    } else if has("咖啡") || has("甜品") || has("奶茶") {
        45
    } else if has("购物") || has("商场") || profile.primary == PrimaryIntent::Shopping {
        90
    } else if has("公园") || has("江滩") || profile.primary == PrimaryIntent::Park {
        30
    } else if has("博物馆") || has("美术馆") || profile.primary == PrimaryIntent::Culture {
        60
    } else {
        30
    };

    base.min((available_minutes - 10).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coffee_mood_resolves_to_food() {
        let p = resolve_rule_intent("想喝咖啡", None);
        assert!(p.keywords.iter().any(|k| k.contains("咖啡")));
        assert_eq!(p.primary, PrimaryIntent::Food);
        assert!(p.is_strong());
        assert_eq!(p.source, IntentSource::Rule);
        assert_eq!(suggested_min_stay_minutes(&p, 180), 45);
    }

    #[test]
    fn test_park_walk_mood() {
        let p = resolve_rule_intent("想去公园散步", None);
        assert_eq!(p.primary, PrimaryIntent::Park);
        assert!(p.keywords.iter().any(|k| k == "公园"));
        assert_eq!(suggested_min_stay_minutes(&p, 180), 30);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let a = resolve_rule_intent("想喝咖啡再逛逛书店", None);
        let b = resolve_rule_intent("想喝咖啡再逛逛书店", None);
        assert_eq!(a, b);
        // Multiple non-exclusive trigger sets contribute tokens.
        assert!(a.keywords.iter().any(|k| k.contains("咖啡")));
        assert!(a.keywords.iter().any(|k| k == "书店"));
    }

    #[test]
    fn test_priority_spa_beats_food() {
        // Both spa and food terms present; spa has higher priority.
        let p = resolve_rule_intent("泡温泉然后吃点东西", None);
        assert_eq!(p.primary, PrimaryIntent::Spa);
        assert_eq!(suggested_min_stay_minutes(&p, 300), 120);
    }

    #[test]
    fn test_short_unmatched_text_becomes_keyword() {
        let p = resolve_rule_intent("钓鱼", None);
        assert_eq!(p.keywords, vec!["钓鱼".to_string()]);
        assert_eq!(p.primary, PrimaryIntent::Other);
        assert!(!p.is_strong());
        assert!((p.confidence - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_long_unmatched_text_yields_no_keywords() {
        let p = resolve_rule_intent("今天天气不错但是不知道要干什么好呢", None);
        assert!(p.keywords.is_empty());
        assert_eq!(p.primary, PrimaryIntent::Other);
    }

    #[test]
    fn test_explicit_categories_are_authoritative() {
        let cats = vec!["攀岩馆".to_string(), "健身房".to_string()];
        let p = resolve_rule_intent("随便", Some(&cats));
        assert_eq!(p.source, IntentSource::Manual);
        assert_eq!(p.keywords, cats);
    }

    #[test]
    fn test_keyword_cap() {
        let p = resolve_rule_intent("咖啡 火锅 甜品 公园 电影 博物馆 温泉 商场", None);
        assert!(p.keywords.len() <= MAX_KEYWORDS);
    }

    #[test]
    fn test_model_trusted_when_confident_and_unopposed() {
        let rule = resolve_rule_intent("找个地方坐坐发发呆", None); // weak, Other
        let model = ModelIntent {
            primary: PrimaryIntent::Park,
            confidence: 0.72,
            keywords: vec!["公园".to_string()],
        };
        let merged = merge_model_intent(&rule, &model);
        assert_eq!(merged.primary, PrimaryIntent::Park);
        assert_eq!(merged.source, IntentSource::Model);
        assert!(merged.keywords.iter().any(|k| k == "公园"));
    }

    #[test]
    fn test_model_rejected_against_strong_rule_below_085() {
        let rule = resolve_rule_intent("想喝咖啡", None); // strong Food
        let model = ModelIntent {
            primary: PrimaryIntent::Shopping,
            confidence: 0.8,
            keywords: vec!["商场".to_string()],
        };
        let merged = merge_model_intent(&rule, &model);
        assert_eq!(merged.primary, PrimaryIntent::Food);
        assert_eq!(merged.source, IntentSource::Rule);
        // Keywords are still enriched even when the classification is kept.
        assert!(merged.keywords.iter().any(|k| k == "商场"));
        assert!(merged.keywords.iter().any(|k| k.contains("咖啡")));
    }

    #[test]
    fn test_model_overrides_strong_rule_at_high_confidence() {
        let rule = resolve_rule_intent("想喝咖啡", None);
        let model = ModelIntent {
            primary: PrimaryIntent::Shopping,
            confidence: 0.9,
            keywords: vec![],
        };
        let merged = merge_model_intent(&rule, &model);
        assert_eq!(merged.primary, PrimaryIntent::Shopping);
    }

    #[test]
    fn test_model_below_07_never_trusted() {
        let rule = resolve_rule_intent("随便走走", None);
        let model = ModelIntent {
            primary: PrimaryIntent::Spa,
            confidence: 0.69,
            keywords: vec![],
        };
        let merged = merge_model_intent(&rule, &model);
        assert_ne!(merged.primary, PrimaryIntent::Spa);
        assert_eq!(merged.source, rule.source);
    }

    #[test]
    fn test_min_stay_clamped_to_window_margin() {
        let p = resolve_rule_intent("看电影", None);
        // 60-minute window leaves at most 50 minutes of dwell default.
        assert_eq!(suggested_min_stay_minutes(&p, 60), 50);
    }
}
