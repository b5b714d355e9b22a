//! Side quest: a gamified arrival challenge attached to the chosen
//! destination. Daytime-only eligibility, template tasks, radius check.

use serde::{Deserialize, Serialize};

use crate::geo::{self, GeoPoint};
use crate::window::TimeWindow;

/// Arrival counts when the user is within this many meters of the target.
pub const VERIFICATION_RADIUS_M: f64 = 140.0;

/// Daytime band: 06:00 to 20:00, inclusive on both ends.
const BAND_START_MINUTE: u16 = 6 * 60;
const BAND_END_MINUTE: u16 = 20 * 60;

/// Safety rules. They bound task generation and are restated verbatim to
/// any narrative rewording, which may never introduce tasks that violate
/// them.
pub const SAFETY_NOTES: [&str; 3] = [
    "全程只走公共开放区域，不进入封闭或施工场所",
    "不要攀爬围栏、高处或任何设施",
    "不与陌生人私下会面或交换联系方式",
];

/// The whole window must sit inside the daytime band and must not cross
/// midnight. Hard rule; unlike dwell time this is never relaxed.
pub fn quest_eligible(window: &TimeWindow) -> bool {
    !window.crosses_midnight()
        && window.start_minute >= BAND_START_MINUTE
        && window.end_minute <= BAND_END_MINUTE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestTheme {
    Park,
    Museum,
    Mall,
    Generic,
}

/// Coarse heuristic on the destination's name/category text.
pub fn quest_theme(name: &str, category: &str) -> QuestTheme {
    let text = format!("{}{}", name, category).to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));
    if any(&["公园", "植物园", "江滩", "绿地", "风景"]) {
        QuestTheme::Park
    } else if any(&["博物馆", "美术馆", "科技馆", "展览", "图书馆"]) {
        QuestTheme::Museum
    } else if any(&["商场", "购物", "百货", "广场", "商业街"]) {
        QuestTheme::Mall
    } else {
        QuestTheme::Generic
    }
}

/// Template tasks per theme, 2-3 short instructions each.
pub fn quest_tasks(name: &str, category: &str) -> Vec<String> {
    let tasks: &[&str] = match quest_theme(name, category) {
        QuestTheme::Park => &[
            "找到一棵你觉得最好看的树，拍一张它的全景照",
            "沿主路散步十分钟，数一数遇到几只小动物",
            "找一条长椅坐下，听一分钟周围的声音",
        ],
        QuestTheme::Museum => &[
            "找到一件展品，把它的名字记下来",
            "挑一件你最喜欢的展品，用一句话描述它",
        ],
        QuestTheme::Mall => &[
            "找到一家你从没进过的店，进去逛一圈",
            "在中庭拍一张从下往上的照片",
        ],
        QuestTheme::Generic => &[
            "在门口拍一张带店名或地名的照片",
            "找到这里你觉得最特别的一个角落",
        ],
    };
    tasks.iter().map(|t| t.to_string()).collect()
}

/// Arrival verification result. Nothing here is ever retained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalCheck {
    pub reached: bool,
    pub distance_meter: f64,
    pub radius_meter: f64,
}

pub fn verify_arrival(user: GeoPoint, destination: GeoPoint, radius_m: f64) -> ArrivalCheck {
    let distance = geo::haversine_distance_meters(user, destination);
    ArrivalCheck {
        reached: distance <= radius_m,
        distance_meter: distance,
        radius_meter: radius_m,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility_band() {
        let ok = TimeWindow::parse("09:00", "11:00").unwrap();
        assert!(quest_eligible(&ok));

        // Ends past 20:00.
        let late = TimeWindow::parse("19:30", "21:00").unwrap();
        assert!(!quest_eligible(&late));

        // Crosses midnight.
        let overnight = TimeWindow::parse("23:00", "01:00").unwrap();
        assert!(!quest_eligible(&overnight));

        // Starts before 06:00.
        let early = TimeWindow::parse("05:30", "08:00").unwrap();
        assert!(!quest_eligible(&early));

        // Band edges are inclusive.
        let edges = TimeWindow::parse("06:00", "20:00").unwrap();
        assert!(quest_eligible(&edges));
    }

    #[test]
    fn test_theme_and_task_counts() {
        assert_eq!(quest_theme("烈士公园", "风景名胜"), QuestTheme::Park);
        assert_eq!(quest_theme("湖南省博物馆", "科教文化"), QuestTheme::Museum);
        assert_eq!(quest_theme("万达广场", "购物服务"), QuestTheme::Mall);
        assert_eq!(quest_theme("某个地方", "生活服务"), QuestTheme::Generic);

        for (name, cat) in [
            ("烈士公园", "风景名胜"),
            ("湖南省博物馆", "科教文化"),
            ("万达广场", "购物服务"),
            ("某个地方", "生活服务"),
        ] {
            let tasks = quest_tasks(name, cat);
            assert!((2..=5).contains(&tasks.len()));
        }
    }

    #[test]
    fn test_verify_at_destination() {
        let p = GeoPoint::new(112.97, 28.19);
        let check = verify_arrival(p, p, VERIFICATION_RADIUS_M);
        assert!(check.reached);
        assert_eq!(check.distance_meter, 0.0);
        assert_eq!(check.radius_meter, 140.0);
    }

    #[test]
    fn test_verify_just_outside_radius() {
        let dest = GeoPoint::new(112.97, 28.19);
        // ~141 meters north of the destination.
        let user = GeoPoint::new(112.97, 28.19 + 141.0 / 111_195.0);
        let check = verify_arrival(user, dest, VERIFICATION_RADIUS_M);
        assert!(!check.reached);
        assert!(check.distance_meter > 140.0 && check.distance_meter < 142.0);
    }
}
