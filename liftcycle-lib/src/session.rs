// src/session.rs
//! Session lifecycle: one session per user per date, created lazily from the
//! cycle's plan day, plus cycle/plan replacement and retirement.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::cycle::{derive_day_order_map, plan_day_index_for};
use crate::model::{NewCycle, NewSession, NewSessionExercise, WorkoutCycle, WorkoutPlan, WorkoutSession};
use crate::store::{Store, StoreError};

/// Outcome of [`retire_cycle_and_plan`].
#[derive(Debug, Default)]
pub struct RetireReport {
    /// Id of the session for `today` that was removed, if there was one.
    pub deleted_session_id: Option<i64>,
    /// Set when today's session could not be cleaned up. Deactivation still happened.
    pub stale_session: Option<StaleSession>,
}

#[derive(Debug)]
pub struct StaleSession {
    pub session_id: Option<i64>,
    pub error: StoreError,
}

/// Returns the session for `(user_id, date)`, creating it from the cycle's
/// plan day on first access.
///
/// `Ok(None)` means no plan day applies to `date` (before the cycle start or a
/// corrupt day map). A creation that loses a race to another writer falls back
/// to reading the winner's session. A session left over from a retired cycle
/// (see [`is_left_over`]) is deleted and created afresh from `plan`.
pub fn resolve_or_create_session(
    store: &dyn Store,
    user_id: i64,
    date: NaiveDate,
    cycle: &WorkoutCycle,
    plan: &WorkoutPlan,
) -> Result<Option<WorkoutSession>, StoreError> {
    if let Some(existing) = store.get_session_by_date(user_id, date)? {
        if !is_left_over(&existing, cycle) {
            return Ok(Some(existing));
        }
        info!(
            session_id = existing.id,
            %date,
            old_cycle_id = existing.workout_cycle_id,
            cycle_id = cycle.id,
            "replacing session opened under a retired cycle"
        );
        match store.delete_session(existing.id) {
            // Already replaced by another writer
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    let Some(cycle_day_index) = plan_day_index_for(cycle, date) else {
        debug!(%date, cycle_id = cycle.id, "no plan day applies");
        return Ok(None);
    };

    let templates: Vec<NewSessionExercise> = plan
        .day(cycle_day_index)
        .map(|day| {
            day.exercises
                .iter()
                .map(|t| NewSessionExercise::from_template(0, t))
                .collect()
        })
        .unwrap_or_default();

    let new_session = NewSession {
        user_id,
        workout_cycle_id: cycle.id,
        cycle_day_index,
        date,
    };

    match store.create_session(&new_session, &templates) {
        Ok(session) => {
            info!(
                session_id = session.id,
                %date,
                cycle_day_index,
                exercises = templates.len(),
                "created workout session"
            );
            Ok(Some(session))
        }
        Err(e) if e.is_already_exists() => {
            debug!(%date, "session created concurrently, reading existing one");
            store.get_session_by_date(user_id, date)
        }
        Err(e) => Err(e),
    }
}

/// A session opened ahead of time under an earlier cycle, for a date the
/// given cycle now covers. Completed sessions are history and are kept.
pub fn is_left_over(session: &WorkoutSession, cycle: &WorkoutCycle) -> bool {
    session.workout_cycle_id != cycle.id
        && session.date >= cycle.start_date
        && !session.is_completed
}

/// Marks the session completed. Already-completed sessions are returned as-is.
pub fn mark_completed(
    store: &dyn Store,
    session: &WorkoutSession,
) -> Result<WorkoutSession, StoreError> {
    if session.is_completed {
        return Ok(session.clone());
    }
    store.mark_session_completed(session.id)?;
    Ok(WorkoutSession {
        is_completed: true,
        ..session.clone()
    })
}

/// Points the active cycle at a new plan version, keeping its rotation.
pub fn replace_plan(
    store: &dyn Store,
    cycle: &WorkoutCycle,
    new_plan_id: i64,
) -> Result<WorkoutCycle, StoreError> {
    store.update_cycle_plan_id(cycle.user_id, new_plan_id)?;
    Ok(WorkoutCycle {
        workout_plan_id: new_plan_id,
        ..cycle.clone()
    })
}

/// Starts a new cycle for `plan_id` anchored at `start_date`.
pub fn start_cycle(
    store: &dyn Store,
    user_id: i64,
    plan_id: i64,
    start_date: NaiveDate,
) -> Result<WorkoutCycle, StoreError> {
    store.create_cycle(&NewCycle {
        user_id,
        workout_plan_id: plan_id,
        start_date,
        day_order_map: derive_day_order_map(start_date).to_vec(),
    })?;
    // Creation only acknowledges; the id comes from reading it back
    store
        .get_active_cycle(user_id)?
        .ok_or(StoreError::NotFound {
            entity: "Active cycle for user",
            id: user_id,
        })
}

/// Deactivates the user's cycle and plan, then removes today's session so the
/// next access resolves against whatever replaces them.
pub fn retire_cycle_and_plan(
    store: &dyn Store,
    user_id: i64,
    today: NaiveDate,
) -> Result<RetireReport, StoreError> {
    store.retire_active(user_id)?;

    let mut report = RetireReport::default();
    match store.get_session_by_date(user_id, today) {
        Ok(Some(session)) => match store.delete_session(session.id) {
            Ok(()) => report.deleted_session_id = Some(session.id),
            Err(error) => {
                warn!(session_id = session.id, %error, "failed to delete stale session");
                report.stale_session = Some(StaleSession {
                    session_id: Some(session.id),
                    error,
                });
            }
        },
        Ok(None) => {}
        Err(error) => {
            warn!(%today, %error, "failed to look up stale session");
            report.stale_session = Some(StaleSession {
                session_id: None,
                error,
            });
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn only_open_sessions_of_other_cycles_on_covered_dates_are_left_over() {
        let cycle = WorkoutCycle {
            id: 2,
            user_id: 1,
            workout_plan_id: 5,
            start_date: date(2),
            day_order_map: derive_day_order_map(date(2)).to_vec(),
            is_active: true,
        };
        let session = |cycle_id, day, is_completed| WorkoutSession {
            id: 9,
            user_id: 1,
            workout_cycle_id: cycle_id,
            cycle_day_index: 0,
            date: date(day),
            is_completed,
        };

        assert!(is_left_over(&session(1, 3, false), &cycle));
        assert!(is_left_over(&session(1, 2, false), &cycle));
        // Before the new cycle started
        assert!(!is_left_over(&session(1, 1, false), &cycle));
        assert!(!is_left_over(&session(1, 3, true), &cycle));
        assert!(!is_left_over(&session(2, 3, false), &cycle));
    }
}
