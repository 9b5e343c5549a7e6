// src/cycle.rs
//! Maps calendar dates onto plan-day indices.
//!
//! A cycle's `day_order_map` is a rotation of `0..=6` anchored at the start
//! date's weekday (Sunday = 0). Position `k` names the plan day that applies
//! `k` days after the start, repeating every seven days.

use chrono::{Datelike, NaiveDate};

use crate::model::{WorkoutCycle, WorkoutDay};

pub const CYCLE_LENGTH_DAYS: usize = 7;
/// Number of plan days shown in the rolling "up next" preview.
pub const UPCOMING_PREVIEW_LEN: usize = 6;

/// Builds the rotation for a cycle starting on `start_date`.
pub fn derive_day_order_map(start_date: NaiveDate) -> [u8; CYCLE_LENGTH_DAYS] {
    let anchor = start_date.weekday().num_days_from_sunday() as usize;
    let mut map = [0u8; CYCLE_LENGTH_DAYS];
    for (k, slot) in map.iter_mut().enumerate() {
        *slot = ((anchor + k) % CYCLE_LENGTH_DAYS) as u8;
    }
    map
}

fn is_valid_map(map: &[u8]) -> bool {
    map.len() == CYCLE_LENGTH_DAYS && map.iter().all(|&i| (i as usize) < CYCLE_LENGTH_DAYS)
}

/// Position of `date` within the cycle's seven-day window.
/// `None` when the date precedes the cycle or the stored map is unusable.
fn position_for(cycle: &WorkoutCycle, date: NaiveDate) -> Option<usize> {
    if !is_valid_map(&cycle.day_order_map) {
        return None;
    }
    let days_since = (date - cycle.start_date).num_days();
    if days_since < 0 {
        return None;
    }
    Some((days_since as usize) % CYCLE_LENGTH_DAYS)
}

/// The plan-day index that applies on `date`, if any.
pub fn plan_day_index_for(cycle: &WorkoutCycle, date: NaiveDate) -> Option<u8> {
    position_for(cycle, date).map(|pos| cycle.day_order_map[pos])
}

/// Plan-day indices left in the current rotation, strictly after `today`.
pub fn remaining_days_in_cycle(cycle: &WorkoutCycle, today: NaiveDate) -> Option<Vec<u8>> {
    position_for(cycle, today).map(|pos| cycle.day_order_map[pos + 1..].to_vec())
}

/// Resolves `remaining` into plan days and pads with the start of the plan
/// so the preview always covers a rolling week.
pub fn upcoming_plan_days<'a>(remaining: &[u8], plan_days: &'a [WorkoutDay]) -> Vec<&'a WorkoutDay> {
    let mut canonical: Vec<&WorkoutDay> = plan_days.iter().collect();
    canonical.sort_by_key(|d| d.order);

    let mut upcoming: Vec<&WorkoutDay> = remaining
        .iter()
        .filter_map(|idx| canonical.iter().copied().find(|d| d.order == *idx))
        .collect();

    if remaining.len() < UPCOMING_PREVIEW_LEN {
        let pad = UPCOMING_PREVIEW_LEN - remaining.len();
        upcoming.extend(canonical.iter().copied().take(pad));
    }
    upcoming
}
