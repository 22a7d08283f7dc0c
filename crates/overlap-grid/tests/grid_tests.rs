//! Tests for building slot grids from busy intervals.

use chrono::{Duration, TimeZone, Utc};
use overlap_grid::grid::token_prefix;
use overlap_grid::{build_grid, build_grid_with_rng, BusyInterval, GridLayout};
use rand::rngs::StdRng;
use rand::SeedableRng;

// ── Helpers ─────────────────────────────────────────────────────────────────

fn march_layout() -> GridLayout {
    let start = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
    GridLayout::days(start, 14, 15).unwrap()
}

fn busy(start: &str, end: &str) -> BusyInterval {
    BusyInterval::new(start.parse().unwrap(), end.parse().unwrap())
}

fn busy_indices(events: &[BusyInterval], layout: &GridLayout) -> Vec<usize> {
    build_grid(events, layout)
        .slots()
        .iter()
        .filter(|slot| !slot.available)
        .map(|slot| slot.index)
        .collect()
}

// ── Shape ───────────────────────────────────────────────────────────────────

#[test]
fn two_week_window_has_1344_slots() {
    let grid = build_grid(&[], &march_layout());
    assert_eq!(grid.len(), 1344);
    assert!(grid.slots().iter().all(|slot| slot.available));
}

#[test]
fn slots_are_in_ascending_timestamp_order() {
    let layout = march_layout();
    let grid = build_grid(&[], &layout);
    for (i, pair) in grid.slots().windows(2).enumerate() {
        assert_eq!(pair[0].index, i);
        assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::minutes(15));
    }
    assert_eq!(grid.slots()[0].timestamp, layout.window_start());
}

// ── Busy marking ────────────────────────────────────────────────────────────

#[test]
fn nine_to_ten_meeting_marks_slots_36_to_39() {
    let events = vec![busy("2021-03-01T09:00:00Z", "2021-03-01T10:00:00Z")];
    assert_eq!(busy_indices(&events, &march_layout()), vec![36, 37, 38, 39]);
}

#[test]
fn event_inside_a_slice_still_marks_that_slot() {
    // 09:05-09:10 never covers a slot boundary but overlaps [09:00, 09:15).
    let events = vec![busy("2021-03-01T09:05:00Z", "2021-03-01T09:10:00Z")];
    assert_eq!(busy_indices(&events, &march_layout()), vec![36]);
}

#[test]
fn adjacent_event_end_does_not_mark_next_slot() {
    let events = vec![busy("2021-03-01T09:00:00Z", "2021-03-01T09:15:00Z")];
    assert_eq!(busy_indices(&events, &march_layout()), vec![36]);
}

#[test]
fn unsorted_and_overlapping_events_are_merged() {
    let events = vec![
        busy("2021-03-02T00:30:00Z", "2021-03-02T01:00:00Z"),
        busy("2021-03-01T00:00:00Z", "2021-03-01T00:30:00Z"),
        busy("2021-03-01T00:15:00Z", "2021-03-01T00:45:00Z"),
    ];
    assert_eq!(busy_indices(&events, &march_layout()), vec![0, 1, 2, 98, 99]);
}

#[test]
fn events_outside_window_or_inverted_mark_nothing() {
    let events = vec![
        busy("2021-02-28T09:00:00Z", "2021-02-28T10:00:00Z"),
        busy("2021-03-20T09:00:00Z", "2021-03-20T10:00:00Z"),
        busy("2021-03-01T10:00:00Z", "2021-03-01T09:00:00Z"),
        busy("2021-03-01T10:00:00Z", "2021-03-01T10:00:00Z"),
    ];
    assert!(busy_indices(&events, &march_layout()).is_empty());
}

#[test]
fn event_straddling_window_start_is_clipped() {
    let events = vec![busy("2021-02-28T23:00:00Z", "2021-03-01T00:30:00Z")];
    assert_eq!(busy_indices(&events, &march_layout()), vec![0, 1]);
}

// ── Tokens ──────────────────────────────────────────────────────────────────

#[test]
fn busy_and_free_tokens_share_prefix_and_length() {
    let layout = march_layout();
    let events = vec![busy("2021-03-01T09:00:00Z", "2021-03-01T10:00:00Z")];
    let with_meeting = build_grid(&events, &layout);
    let without = build_grid(&[], &layout);

    let busy_slot = &with_meeting.slots()[36];
    let free_slot = &without.slots()[36];
    assert!(!busy_slot.available);
    assert!(free_slot.available);
    assert_eq!(busy_slot.token.len(), free_slot.token.len());

    let prefix = token_prefix(busy_slot.timestamp);
    assert_eq!(prefix, "2021-03-01T09:00:00Z");
    assert!(busy_slot.token.starts_with(&prefix));
    assert!(free_slot.token.starts_with(&prefix));
    assert_ne!(busy_slot.token, free_slot.token);
}

#[test]
fn free_tokens_match_across_parties_busy_tokens_do_not() {
    let layout = march_layout();
    let events = vec![busy("2021-03-01T09:00:00Z", "2021-03-01T10:00:00Z")];
    let a = build_grid_with_rng(&events, &layout, &mut StdRng::seed_from_u64(1));
    let b = build_grid_with_rng(&events, &layout, &mut StdRng::seed_from_u64(2));

    assert_eq!(a.slots()[0].token, b.slots()[0].token);
    assert_ne!(a.slots()[36].token, b.slots()[36].token);
}

#[test]
fn busy_tokens_are_unique_within_a_grid() {
    let layout = march_layout();
    let events = vec![busy("2021-03-01T00:00:00Z", "2021-03-15T00:00:00Z")];
    let tokens = build_grid(&events, &layout).into_tokens();
    let unique: std::collections::HashSet<_> = tokens.iter().collect();
    assert_eq!(unique.len(), tokens.len());
}

#[test]
fn into_tokens_preserves_slot_order() {
    let layout = march_layout();
    let grid = build_grid(&[], &layout);
    let expected: Vec<String> = grid.slots().iter().map(|s| s.token.clone()).collect();
    assert_eq!(grid.into_tokens(), expected);
}
