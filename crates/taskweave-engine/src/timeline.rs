//! Timeline merge: filter, order and de-overlap proposed blocks.
//!
//! Only a block's start instant is tested against the sleep window and
//! working hours; a block may run past either boundary.

use chrono::NaiveTime;
use taskweave_core::{EventBlock, MemoryPrefs, Timeline};

fn work_day_start() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default()
}

fn work_day_end() -> NaiveTime {
    NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default()
}

/// Parse `HH:MM`. Anything malformed reads as midnight.
pub fn parse_time_of_day(value: &str) -> NaiveTime {
    let mut parts = value.trim().split(':');
    let (Some(h), Some(m), None) = (parts.next(), parts.next(), parts.next()) else {
        return NaiveTime::default();
    };
    match (h.trim().parse::<u32>(), m.trim().parse::<u32>()) {
        (Ok(h), Ok(m)) => NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default(),
        _ => NaiveTime::default(),
    }
}

/// Sleep window membership. Wraps midnight unless `start < end`, so equal
/// bounds cover the whole day.
pub fn in_sleep_window(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start < end {
        start <= t && t < end
    } else {
        t >= start || t < end
    }
}

/// Closed interval `[08:00, 22:00]`.
pub fn in_working_hours(t: NaiveTime) -> bool {
    t >= work_day_start() && t <= work_day_end()
}

struct Window {
    sleep_start: NaiveTime,
    sleep_end: NaiveTime,
}

impl Window {
    fn from_prefs(prefs: &MemoryPrefs) -> Self {
        Self {
            sleep_start: parse_time_of_day(&prefs.sleep_start),
            sleep_end: parse_time_of_day(&prefs.sleep_end),
        }
    }

    fn admits(&self, block: &EventBlock) -> bool {
        let t = block.start.time();
        !in_sleep_window(t, self.sleep_start, self.sleep_end) && in_working_hours(t)
    }
}

/// Merge proposals from every agent into one conflict-free timeline.
///
/// Blocks starting in the sleep window or outside working hours are
/// dropped. The rest are ordered by `(start, source agent)` and any block
/// overlapping its predecessor is moved to start at the predecessor's end,
/// keeping its duration. A moved block is not checked against the windows
/// again. Input blocks are never modified.
pub fn merge_blocks(blocks: &[EventBlock], prefs: &MemoryPrefs) -> Timeline {
    let window = Window::from_prefs(prefs);

    let mut candidates: Vec<&EventBlock> = blocks.iter().filter(|b| window.admits(b)).collect();
    candidates.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.source_agent.as_str().cmp(b.source_agent.as_str()))
    });

    let mut merged: Timeline = Vec::with_capacity(candidates.len());
    for block in candidates {
        let next = match merged.last() {
            Some(prev) if block.start < prev.end => block.shifted_to(prev.end),
            _ => block.clone(),
        };
        merged.push(next);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use proptest::prelude::*;
    use taskweave_core::AgentKind;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn block(start: NaiveDateTime, minutes: i64, agent: AgentKind) -> EventBlock {
        EventBlock::proposed("b", start, start + Duration::minutes(minutes), agent)
    }

    fn prefs() -> MemoryPrefs {
        MemoryPrefs::defaults_for("u1")
    }

    #[test]
    fn overlapping_block_shifts_forward() {
        let study = block(at(8, 0), 90, AgentKind::Study);
        let meal = block(at(9, 0), 45, AgentKind::Meal);

        let out = merge_blocks(&[study.clone(), meal.clone()], &prefs());

        assert_eq!(out.len(), 2);
        assert_eq!((out[0].start, out[0].end), (at(8, 0), at(9, 30)));
        assert_eq!(out[0].source_agent, AgentKind::Study);
        assert_eq!((out[1].start, out[1].end), (at(9, 30), at(10, 15)));
        assert_eq!(out[1].id, meal.id);
        // inputs untouched
        assert_eq!(meal.start, at(9, 0));
    }

    #[test]
    fn block_in_sleep_window_is_dropped() {
        let late = block(at(23, 30), 30, AgentKind::Study);
        assert!(merge_blocks(&[late], &prefs()).is_empty());
    }

    #[test]
    fn empty_input_gives_empty_timeline() {
        assert!(merge_blocks(&[], &prefs()).is_empty());
    }

    #[test]
    fn working_hours_bounds_are_inclusive() {
        let blocks = [
            block(at(7, 59), 10, AgentKind::Calendar),
            block(at(8, 0), 10, AgentKind::Calendar),
            block(at(22, 0), 10, AgentKind::Calendar),
            block(at(22, 1), 10, AgentKind::Calendar),
        ];
        let out = merge_blocks(&blocks, &prefs());
        let starts: Vec<_> = out.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![at(8, 0), at(22, 0)]);
    }

    #[test]
    fn start_only_check_lets_block_run_past_boundary() {
        let long = block(at(21, 59), 90, AgentKind::Study);
        let out = merge_blocks(&[long], &prefs());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].end, at(23, 29));
    }

    #[test]
    fn ties_break_on_agent_name() {
        let study = block(at(10, 0), 30, AgentKind::Study);
        let calendar = block(at(10, 0), 15, AgentKind::Calendar);
        let meal = block(at(10, 0), 20, AgentKind::Meal);

        let out = merge_blocks(&[study, calendar, meal], &prefs());
        let agents: Vec<_> = out.iter().map(|b| b.source_agent).collect();
        assert_eq!(agents, vec![AgentKind::Calendar, AgentKind::Meal, AgentKind::Study]);
        assert_eq!(out[1].start, at(10, 15));
        assert_eq!(out[2].start, at(10, 35));
    }

    #[test]
    fn non_wrapping_sleep_window() {
        let mut p = prefs();
        p.sleep_start = "13:00".into();
        p.sleep_end = "14:00".into();
        let blocks = [
            block(at(12, 0), 30, AgentKind::Meal),
            block(at(13, 30), 30, AgentKind::Meal),
            block(at(14, 0), 30, AgentKind::Meal),
        ];
        let starts: Vec<_> = merge_blocks(&blocks, &p).iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![at(12, 0), at(14, 0)]);
    }

    #[test]
    fn equal_sleep_bounds_exclude_everything() {
        let mut p = prefs();
        p.sleep_start = "10:00".into();
        p.sleep_end = "10:00".into();
        assert!(merge_blocks(&[block(at(12, 0), 30, AgentKind::Study)], &p).is_empty());
    }

    #[test]
    fn shifted_block_is_kept_past_working_hours() {
        let study = block(at(21, 0), 90, AgentKind::Study);
        let meal = block(at(21, 30), 30, AgentKind::Meal);

        let out = merge_blocks(&[study, meal.clone()], &prefs());

        assert_eq!(out.len(), 2);
        assert_eq!((out[0].start, out[0].end), (at(21, 0), at(22, 30)));
        assert_eq!(out[1].id, meal.id);
        assert_eq!((out[1].start, out[1].end), (at(22, 30), at(23, 0)));
    }

    #[test]
    fn shifted_block_is_kept_inside_sleep_window() {
        let mut p = prefs();
        p.sleep_start = "21:00".into();
        p.sleep_end = "07:00".into();
        let first = block(at(20, 0), 60, AgentKind::Calendar);
        let second = block(at(20, 30), 30, AgentKind::Study);

        let out = merge_blocks(&[first, second], &p);

        assert_eq!(out.len(), 2);
        assert_eq!((out[1].start, out[1].end), (at(21, 0), at(21, 30)));
    }

    #[test]
    fn parse_time_of_day_tolerates_garbage() {
        assert_eq!(parse_time_of_day("07:30"), NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(parse_time_of_day(" 7 : 05 "), NaiveTime::from_hms_opt(7, 5, 0).unwrap());
        assert_eq!(parse_time_of_day("25:00"), NaiveTime::default());
        assert_eq!(parse_time_of_day("7"), NaiveTime::default());
        assert_eq!(parse_time_of_day("07:00:00"), NaiveTime::default());
        assert_eq!(parse_time_of_day("ab:cd"), NaiveTime::default());
    }

    #[test]
    fn sleep_window_wraps_midnight() {
        let start = parse_time_of_day("23:00");
        let end = parse_time_of_day("07:00");
        assert!(in_sleep_window(parse_time_of_day("23:00"), start, end));
        assert!(in_sleep_window(parse_time_of_day("03:00"), start, end));
        assert!(!in_sleep_window(parse_time_of_day("07:00"), start, end));
        assert!(!in_sleep_window(parse_time_of_day("12:00"), start, end));
    }

    fn arb_agent() -> impl Strategy<Value = AgentKind> {
        prop_oneof![
            Just(AgentKind::Study),
            Just(AgentKind::Meal),
            Just(AgentKind::Calendar)
        ]
    }

    fn arb_block() -> impl Strategy<Value = EventBlock> {
        (0i64..3, 0i64..1440, 1i64..240, arb_agent()).prop_map(|(day, minute, len, agent)| {
            let start = at(0, 0) + Duration::days(day) + Duration::minutes(minute);
            block(start, len, agent)
        })
    }

    fn arb_prefs() -> impl Strategy<Value = MemoryPrefs> {
        (0u32..24, 0u32..24).prop_map(|(s, e)| {
            let mut p = prefs();
            p.sleep_start = format!("{s:02}:00");
            p.sleep_end = format!("{e:02}:00");
            p
        })
    }

    proptest! {
        #[test]
        fn output_is_sorted_and_non_overlapping(
            blocks in prop::collection::vec(arb_block(), 0..40),
            p in arb_prefs(),
        ) {
            let out = merge_blocks(&blocks, &p);
            for pair in out.windows(2) {
                prop_assert!(pair[0].start <= pair[1].start);
                prop_assert!(pair[0].end <= pair[1].start);
            }
        }

        #[test]
        fn unshifted_output_starts_inside_allowed_window(
            blocks in prop::collection::vec(arb_block(), 0..40),
            p in arb_prefs(),
        ) {
            let start = parse_time_of_day(&p.sleep_start);
            let end = parse_time_of_day(&p.sleep_end);
            for out in merge_blocks(&blocks, &p) {
                let input = blocks.iter().find(|b| b.id == out.id).unwrap();
                if out.start != input.start {
                    continue;
                }
                let t = out.start.time();
                prop_assert!(!in_sleep_window(t, start, end));
                prop_assert!(in_working_hours(t));
            }
        }

        #[test]
        fn durations_are_preserved(
            blocks in prop::collection::vec(arb_block(), 0..40),
            p in arb_prefs(),
        ) {
            for out in merge_blocks(&blocks, &p) {
                let original = blocks.iter().find(|b| b.id == out.id).unwrap();
                prop_assert_eq!(out.duration(), original.duration());
            }
        }

        #[test]
        fn merging_a_merged_timeline_is_a_fixed_point(
            blocks in prop::collection::vec(arb_block(), 0..40),
            p in arb_prefs(),
        ) {
            // shifting may push a block out of the windows; keep only the
            // blocks a fresh merge would accept as already valid
            let window = Window::from_prefs(&p);
            let valid: Vec<EventBlock> = merge_blocks(&blocks, &p)
                .into_iter()
                .filter(|b| window.admits(b))
                .collect();
            prop_assert_eq!(merge_blocks(&valid, &p), valid);
        }
    }
}
