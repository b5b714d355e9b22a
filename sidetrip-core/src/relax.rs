//! Layered constraint relaxation over scored candidates.
//!
//! An explicit ordered list of named steps, each a pure function over
//! (pool, state). Require-steps always run; rescue-steps run only when the
//! current survivor set is empty, and each rescue records a note so nothing
//! is loosened silently.

use crate::score::Candidate;

/// One-way floor when intent keywords exist: close destinations are fine
/// for food or errands.
pub const ONE_WAY_FLOOR_WITH_INTENT: i64 = 1;
/// One-way floor for generic requests: avoid recommending somewhere too
/// close to bother with.
pub const ONE_WAY_FLOOR_GENERIC: i64 = 6;
/// Dwell requirement after relaxation never sits above this.
pub const RELAXED_MIN_STAY: i64 = 20;

#[derive(Debug, Clone)]
pub struct FilterState {
    pub min_stay_minutes: i64,
    pub one_way_floor: i64,
    pub allow_relax: bool,
}

impl FilterState {
    pub fn new(min_stay_minutes: i64, has_intent_keywords: bool, allow_relax: bool) -> Self {
        Self {
            min_stay_minutes,
            one_way_floor: if has_intent_keywords {
                ONE_WAY_FLOOR_WITH_INTENT
            } else {
                ONE_WAY_FLOOR_GENERIC
            },
            allow_relax,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChainResult {
    /// At least one candidate survived; notes record every rescue applied.
    Kept {
        survivors: Vec<Candidate>,
        notes: Vec<String>,
    },
    /// No candidate survives even after every permitted rescue.
    Exhausted,
}

enum StepKind {
    /// Always runs; narrows the survivor set.
    Require,
    /// Runs only when the survivor set is empty; loosens state, refilters
    /// the stage pool, and emits a note.
    Rescue,
}

struct Step {
    kind: StepKind,
    apply: fn(&[Candidate], &mut FilterState) -> (Vec<Candidate>, Option<String>),
}

fn filter_dwell(pool: &[Candidate], state: &mut FilterState) -> (Vec<Candidate>, Option<String>) {
    let kept = pool
        .iter()
        .filter(|c| c.play_min >= state.min_stay_minutes)
        .cloned()
        .collect();
    (kept, None)
}

fn rescue_dwell(pool: &[Candidate], state: &mut FilterState) -> (Vec<Candidate>, Option<String>) {
    let original = state.min_stay_minutes;
    state.min_stay_minutes = original.min(RELAXED_MIN_STAY);
    let (kept, _) = filter_dwell(pool, state);
    let note = format!(
        "停留时间要求已从 {original} 分钟放宽到 {} 分钟",
        state.min_stay_minutes
    );
    (kept, Some(note))
}

fn filter_one_way(pool: &[Candidate], state: &mut FilterState) -> (Vec<Candidate>, Option<String>) {
    let kept = pool
        .iter()
        .filter(|c| c.one_way_min >= state.one_way_floor)
        .cloned()
        .collect();
    (kept, None)
}

fn rescue_one_way(pool: &[Candidate], state: &mut FilterState) -> (Vec<Candidate>, Option<String>) {
    state.one_way_floor = 0;
    let (kept, _) = filter_one_way(pool, state);
    (kept, Some("已取消单程最短时间限制，允许非常近的目的地".to_string()))
}

/// Run the chain over scored candidates. With `allow_relax=false` only the
/// dwell requirement applies and infeasibility surfaces immediately.
pub fn run_filter_chain(pool: &[Candidate], state: &mut FilterState) -> ChainResult {
    if !state.allow_relax {
        let (survivors, _) = filter_dwell(pool, state);
        return if survivors.is_empty() {
            ChainResult::Exhausted
        } else {
            ChainResult::Kept { survivors, notes: Vec::new() }
        };
    }

    // Rescue steps re-filter the pool of the stage they rescue, so the two
    // stages hand a shrinking pool down the list.
    let steps: &[Step] = &[
        Step { kind: StepKind::Require, apply: filter_dwell },
        Step { kind: StepKind::Rescue, apply: rescue_dwell },
        Step { kind: StepKind::Require, apply: filter_one_way },
        Step { kind: StepKind::Rescue, apply: rescue_one_way },
    ];

    let mut notes = Vec::new();
    let mut stage_pool: Vec<Candidate> = pool.to_vec();
    let mut current: Vec<Candidate> = stage_pool.clone();

    for step in steps {
        match step.kind {
            StepKind::Require => {
                stage_pool = current;
                let (kept, _) = (step.apply)(&stage_pool, state);
                current = kept;
            }
            StepKind::Rescue => {
                if !current.is_empty() {
                    continue;
                }
                let (kept, note) = (step.apply)(&stage_pool, state);
                if let Some(n) = note {
                    notes.push(n);
                }
                current = kept;
                if current.is_empty() {
                    return ChainResult::Exhausted;
                }
            }
        }
    }

    if current.is_empty() {
        ChainResult::Exhausted
    } else {
        ChainResult::Kept { survivors: current, notes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    fn cand(name: &str, one_way: i64, play: i64) -> Candidate {
        let location = GeoPoint::new(112.9, 28.2);
        Candidate {
            id: Candidate::dedup_key(location, name),
            name: name.to_string(),
            category: String::new(),
            address: String::new(),
            location,
            distance_meters: None,
            one_way_min: one_way,
            play_min: play,
            weight: 0.0,
            match_hits: 0,
            affinity: 0.0,
        }
    }

    #[test]
    fn test_no_relaxation_needed() {
        let pool = vec![cand("a", 15, 90), cand("b", 8, 120)];
        let mut state = FilterState::new(60, true, true);
        match run_filter_chain(&pool, &mut state) {
            ChainResult::Kept { survivors, notes } => {
                assert_eq!(survivors.len(), 2);
                assert!(notes.is_empty());
            }
            ChainResult::Exhausted => panic!("expected survivors"),
        }
    }

    #[test]
    fn test_dwell_relaxes_before_one_way() {
        // 80-minute window, min stay 120: nothing satisfies the dwell
        // requirement, then the relaxed 20-minute bar keeps the 25-minute
        // candidate. Its one-way of 2 also trips the generic floor of 6,
        // so both notes appear, dwell first.
        let pool = vec![cand("close", 2, 25)];
        let mut state = FilterState::new(120, false, true);
        match run_filter_chain(&pool, &mut state) {
            ChainResult::Kept { survivors, notes } => {
                assert_eq!(survivors.len(), 1);
                assert_eq!(notes.len(), 2);
                assert!(notes[0].contains("停留时间"), "dwell note first: {notes:?}");
                assert!(notes[1].contains("单程"), "one-way note second: {notes:?}");
            }
            ChainResult::Exhausted => panic!("expected survivors"),
        }
    }

    #[test]
    fn test_one_way_floor_depends_on_intent_keywords() {
        assert_eq!(FilterState::new(30, true, true).one_way_floor, 1);
        assert_eq!(FilterState::new(30, false, true).one_way_floor, 6);
    }

    #[test]
    fn test_generic_floor_filters_very_close_places() {
        let pool = vec![cand("next-door", 3, 100), cand("proper", 12, 80)];
        let mut state = FilterState::new(30, false, true);
        match run_filter_chain(&pool, &mut state) {
            ChainResult::Kept { survivors, notes } => {
                assert_eq!(survivors.len(), 1);
                assert_eq!(survivors[0].name, "proper");
                assert!(notes.is_empty());
            }
            ChainResult::Exhausted => panic!("expected survivors"),
        }
    }

    #[test]
    fn test_exhausted_when_nothing_fits() {
        // Even the relaxed 20-minute dwell cannot be met.
        let pool = vec![cand("far", 70, 10)];
        let mut state = FilterState::new(120, true, true);
        assert_eq!(run_filter_chain(&pool, &mut state), ChainResult::Exhausted);
    }

    #[test]
    fn test_allow_relax_false_fails_fast_without_notes() {
        let pool = vec![cand("close", 2, 25)];
        let mut state = FilterState::new(120, false, false);
        assert_eq!(run_filter_chain(&pool, &mut state), ChainResult::Exhausted);
    }

    #[test]
    fn test_allow_relax_false_keeps_feasible_candidates() {
        let pool = vec![cand("ok", 10, 90)];
        let mut state = FilterState::new(60, false, false);
        match run_filter_chain(&pool, &mut state) {
            ChainResult::Kept { survivors, notes } => {
                assert_eq!(survivors.len(), 1);
                assert!(notes.is_empty());
            }
            ChainResult::Exhausted => panic!("expected survivors"),
        }
    }
}
