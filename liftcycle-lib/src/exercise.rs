// src/exercise.rs
//! Per-exercise status transitions within a session.
//!
//! `is_completed` and `is_skipped` are mutually exclusive. `is_deleted` is an
//! orthogonal visibility flag and never touches the other two.

use strum_macros::{Display, EnumIter};

use crate::model::WorkoutSessionExercise;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum ExerciseStatus {
    Pending,
    Completed,
    Skipped,
}

/// Which session exercises a listing should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExerciseView {
    #[default]
    Active,
    IncludeDeleted,
}

pub fn status(exercise: &WorkoutSessionExercise) -> ExerciseStatus {
    if exercise.is_completed {
        ExerciseStatus::Completed
    } else if exercise.is_skipped {
        ExerciseStatus::Skipped
    } else {
        ExerciseStatus::Pending
    }
}

pub fn toggle_complete(exercise: &mut WorkoutSessionExercise) {
    exercise.is_completed = !exercise.is_completed;
    if exercise.is_completed {
        exercise.is_skipped = false;
    }
}

pub fn toggle_skip(exercise: &mut WorkoutSessionExercise) {
    exercise.is_skipped = !exercise.is_skipped;
    if exercise.is_skipped {
        exercise.is_completed = false;
    }
}

pub fn soft_delete(exercise: &mut WorkoutSessionExercise) {
    exercise.is_deleted = true;
}

/// Sets the position only; keeping sibling orders contiguous is up to the caller.
pub fn reorder(exercise: &mut WorkoutSessionExercise, order: i64) {
    exercise.order = order;
}

pub fn set_weight(exercise: &mut WorkoutSessionExercise, weight: Option<f64>) {
    exercise.weight = weight;
}

/// Applies `view` and sorts by `order`, then id.
pub fn filter_view(
    exercises: Vec<WorkoutSessionExercise>,
    view: ExerciseView,
) -> Vec<WorkoutSessionExercise> {
    let mut visible: Vec<WorkoutSessionExercise> = exercises
        .into_iter()
        .filter(|e| view == ExerciseView::IncludeDeleted || !e.is_deleted)
        .collect();
    visible.sort_by_key(|e| (e.order, e.id));
    visible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: i64, order: i64) -> WorkoutSessionExercise {
        WorkoutSessionExercise {
            id,
            workout_session_id: 1,
            name: format!("Exercise {id}"),
            muscles: vec!["chest".into()],
            order,
            is_optional: false,
            is_completed: false,
            is_skipped: false,
            is_deleted: false,
            weight: None,
            base_exercise_id: None,
        }
    }

    #[test]
    fn complete_then_skip_leaves_skipped() {
        let mut e = pending(1, 0);
        toggle_complete(&mut e);
        toggle_skip(&mut e);
        assert!(!e.is_completed);
        assert!(e.is_skipped);
        assert_eq!(status(&e), ExerciseStatus::Skipped);
    }

    #[test]
    fn skip_then_complete_leaves_completed() {
        let mut e = pending(1, 0);
        toggle_skip(&mut e);
        toggle_complete(&mut e);
        assert!(e.is_completed);
        assert!(!e.is_skipped);
        assert_eq!(status(&e), ExerciseStatus::Completed);
    }

    #[test]
    fn toggling_twice_restores_flag() {
        let mut e = pending(1, 0);
        toggle_complete(&mut e);
        toggle_complete(&mut e);
        assert_eq!(status(&e), ExerciseStatus::Pending);

        toggle_skip(&mut e);
        toggle_skip(&mut e);
        assert_eq!(status(&e), ExerciseStatus::Pending);
    }

    #[test]
    fn un_completing_does_not_restore_skip() {
        let mut e = pending(1, 0);
        toggle_skip(&mut e);
        toggle_complete(&mut e);
        toggle_complete(&mut e);
        assert!(!e.is_skipped);
        assert!(!e.is_completed);
    }

    #[test]
    fn soft_delete_keeps_completion_flags() {
        let mut e = pending(1, 0);
        toggle_complete(&mut e);
        soft_delete(&mut e);
        assert!(e.is_deleted);
        assert!(e.is_completed);
        assert!(!e.is_skipped);
    }

    #[test]
    fn views_hide_deleted_and_sort() {
        let mut deleted = pending(1, 0);
        soft_delete(&mut deleted);
        let mut moved = pending(2, 5);
        reorder(&mut moved, -1);
        let list = vec![deleted, moved, pending(3, 1)];

        let active = filter_view(list.clone(), ExerciseView::Active);
        assert_eq!(active.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 3]);

        let all = filter_view(list, ExerciseView::IncludeDeleted);
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 1, 3]);
    }
}
