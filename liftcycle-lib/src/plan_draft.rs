// src/plan_draft.rs
//! Editable plan drafts. Every edit consumes the draft and returns a new one;
//! indices that point nowhere leave it unchanged.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::cycle::CYCLE_LENGTH_DAYS;
use crate::model::{
    normalize_muscles, BaseExercise, NewPlan, NewWorkoutDay, NewWorkoutExercise, WorkoutPlan,
    REST_DAY_LABEL,
};

const WEEKDAY_LABELS: [&str; CYCLE_LENGTH_DAYS] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Plan name cannot be empty.")]
    EmptyPlanName,
    #[error("Select at least one workout day.")]
    NoWorkoutDays,
    #[error("Workout day '{label}' has no exercises. Add one or make it a rest day.")]
    EmptyWorkoutDay { label: String },
    #[error("An exercise on '{label}' has no name.")]
    EmptyExerciseName { label: String },
    #[error("Base exercise {0} does not exist.")]
    UnknownBaseExercise(i64),
}

#[derive(Error, Debug)]
pub enum DraftFileError {
    #[error("Failed to read plan draft file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse plan draft (TOML): {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize plan draft (TOML): {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ExerciseDraft {
    pub name: String,
    pub muscles: Vec<String>,
    pub is_optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_exercise_id: Option<i64>,
}

impl ExerciseDraft {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Starts a draft exercise from a catalog entry.
    pub fn from_base(base: &BaseExercise) -> Self {
        Self {
            name: base.name.clone(),
            muscles: base.muscles.clone(),
            is_optional: false,
            base_exercise_id: Some(base.id),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DayDraft {
    pub label: String,
    pub selected: bool,
    pub exercises: Vec<ExerciseDraft>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PlanDraft {
    pub name: String,
    pub split_type: String,
    /// Set when editing, so the submission becomes a new version of that plan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    pub days: Vec<DayDraft>,
}

impl Default for PlanDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            split_type: "custom".to_string(),
            group_id: None,
            days: WEEKDAY_LABELS
                .iter()
                .map(|label| DayDraft {
                    label: (*label).to_string(),
                    ..Default::default()
                })
                .collect(),
        }
    }
}

impl PlanDraft {
    pub fn new(name: &str, split_type: &str) -> Self {
        Self {
            name: name.to_string(),
            split_type: split_type.to_string(),
            ..Default::default()
        }
    }

    /// Prefills a draft from an existing plan; submitting it creates the next version.
    pub fn from_plan(plan: &WorkoutPlan) -> Self {
        let mut draft = Self::new(&plan.name, &plan.split_type);
        draft.group_id = Some(plan.group_id);
        for day in &plan.workout_days {
            let Some(slot) = draft.days.get_mut(day.order as usize) else {
                continue;
            };
            slot.selected = !day.is_rest_day();
            slot.label = if day.is_rest_day() {
                WEEKDAY_LABELS[day.order as usize].to_string()
            } else {
                day.label.clone()
            };
            slot.exercises = day
                .exercises
                .iter()
                .map(|e| ExerciseDraft {
                    name: e.name.clone(),
                    muscles: e.muscles.clone(),
                    is_optional: e.is_optional,
                    base_exercise_id: e.base_exercise_id,
                })
                .collect();
        }
        draft
    }

    /// # Errors
    /// Returns `DraftFileError` on I/O or TOML failures.
    pub fn from_toml_file(path: &Path) -> Result<Self, DraftFileError> {
        let content = fs::read_to_string(path)?;
        let mut draft: Self = toml::from_str(&content)?;
        // Files may list fewer than seven days
        while draft.days.len() < CYCLE_LENGTH_DAYS {
            let label = WEEKDAY_LABELS[draft.days.len()];
            draft.days.push(DayDraft {
                label: label.to_string(),
                ..Default::default()
            });
        }
        draft.days.truncate(CYCLE_LENGTH_DAYS);
        Ok(draft)
    }

    /// # Errors
    /// Returns `DraftFileError::Serialize` if the draft cannot be written as TOML.
    pub fn to_toml_string(&self) -> Result<String, DraftFileError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn with_day(mut self, day: usize, edit: impl FnOnce(&mut DayDraft)) -> Self {
        if let Some(d) = self.days.get_mut(day) {
            edit(d);
        }
        self
    }

    fn with_exercise(
        self,
        day: usize,
        exercise: usize,
        edit: impl FnOnce(&mut ExerciseDraft),
    ) -> Self {
        self.with_day(day, |d| {
            if let Some(e) = d.exercises.get_mut(exercise) {
                edit(e);
            }
        })
    }

    #[must_use]
    pub fn toggle_day_selected(self, day: usize) -> Self {
        self.with_day(day, |d| d.selected = !d.selected)
    }

    #[must_use]
    pub fn set_day_label(self, day: usize, label: &str) -> Self {
        self.with_day(day, |d| d.label = label.to_string())
    }

    #[must_use]
    pub fn add_exercise(self, day: usize, exercise: ExerciseDraft) -> Self {
        self.with_day(day, |d| d.exercises.push(exercise))
    }

    #[must_use]
    pub fn remove_exercise(self, day: usize, exercise: usize) -> Self {
        self.with_day(day, |d| {
            if exercise < d.exercises.len() {
                d.exercises.remove(exercise);
            }
        })
    }

    /// Appends a muscle field (possibly blank, to be filled in later).
    #[must_use]
    pub fn add_muscle(self, day: usize, exercise: usize, muscle: &str) -> Self {
        self.with_exercise(day, exercise, |e| e.muscles.push(muscle.to_string()))
    }

    #[must_use]
    pub fn set_muscle(self, day: usize, exercise: usize, slot: usize, muscle: &str) -> Self {
        self.with_exercise(day, exercise, |e| {
            if let Some(m) = e.muscles.get_mut(slot) {
                *m = muscle.to_string();
            }
        })
    }

    #[must_use]
    pub fn remove_muscle(self, day: usize, exercise: usize, slot: usize) -> Self {
        self.with_exercise(day, exercise, |e| {
            if slot < e.muscles.len() {
                e.muscles.remove(slot);
            }
        })
    }

    /// # Errors
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyPlanName);
        }
        let selected: Vec<&DayDraft> = self.days.iter().filter(|d| d.selected).collect();
        if selected.is_empty() {
            return Err(ValidationError::NoWorkoutDays);
        }
        for day in selected {
            if day.exercises.is_empty() {
                return Err(ValidationError::EmptyWorkoutDay {
                    label: day.label.clone(),
                });
            }
            if day
                .exercises
                .iter()
                .any(|e| e.name.trim().is_empty() && e.base_exercise_id.is_none())
            {
                return Err(ValidationError::EmptyExerciseName {
                    label: day.label.clone(),
                });
            }
        }
        Ok(())
    }

    /// Validates and converts the draft into a creation request. Catalog-linked
    /// exercises take their name and muscles from `catalog` as of now.
    /// # Errors
    /// Returns `ValidationError` if the draft is incomplete or names an unknown
    /// base exercise.
    pub fn to_new_plan(
        &self,
        user_id: i64,
        catalog: &[BaseExercise],
    ) -> Result<NewPlan, ValidationError> {
        self.validate()?;

        let mut workout_days = Vec::with_capacity(CYCLE_LENGTH_DAYS);
        for (order, day) in self.days.iter().enumerate().take(CYCLE_LENGTH_DAYS) {
            if !day.selected {
                workout_days.push(NewWorkoutDay {
                    label: REST_DAY_LABEL.to_string(),
                    order: order as u8,
                    exercises: Vec::new(),
                });
                continue;
            }

            let mut exercises = Vec::with_capacity(day.exercises.len());
            for (i, ex) in day.exercises.iter().enumerate() {
                let (name, muscles) = match ex.base_exercise_id {
                    Some(base_id) => {
                        let base = catalog
                            .iter()
                            .find(|b| b.id == base_id)
                            .ok_or(ValidationError::UnknownBaseExercise(base_id))?;
                        (base.name.clone(), normalize_muscles(&base.muscles))
                    }
                    None => (ex.name.trim().to_string(), normalize_muscles(&ex.muscles)),
                };
                exercises.push(NewWorkoutExercise {
                    name,
                    muscles,
                    is_optional: ex.is_optional,
                    order: i as i64,
                    base_exercise_id: ex.base_exercise_id,
                });
            }

            let label = day.label.trim();
            workout_days.push(NewWorkoutDay {
                label: if label.is_empty() {
                    WEEKDAY_LABELS[order].to_string()
                } else {
                    label.to_string()
                },
                order: order as u8,
                exercises,
            });
        }

        Ok(NewPlan {
            user_id,
            group_id: self.group_id,
            name: self.name.trim().to_string(),
            split_type: self.split_type.trim().to_string(),
            cycle_length_days: CYCLE_LENGTH_DAYS as i64,
            workout_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper_lower() -> PlanDraft {
        PlanDraft::new("Upper/Lower", "upper-lower")
            .toggle_day_selected(1)
            .set_day_label(1, "Upper")
            .add_exercise(1, ExerciseDraft::named("Bench Press"))
            .add_muscle(1, 0, "chest")
            .add_muscle(1, 0, "")
            .toggle_day_selected(2)
            .set_day_label(2, "Lower")
            .add_exercise(2, ExerciseDraft::named("Squat"))
    }

    #[test]
    fn edits_return_new_values() {
        let draft = PlanDraft::new("Plan", "custom");
        let toggled = draft.clone().toggle_day_selected(3);
        assert!(!draft.days[3].selected);
        assert!(toggled.days[3].selected);
        assert_eq!(toggled.clone().toggle_day_selected(3), draft);
    }

    #[test]
    fn out_of_range_edits_are_ignored() {
        let draft = upper_lower();
        assert_eq!(draft.clone().toggle_day_selected(9), draft);
        assert_eq!(draft.clone().remove_exercise(1, 5), draft);
        assert_eq!(draft.clone().remove_muscle(1, 0, 7), draft);
    }

    #[test]
    fn muscle_fields_can_be_edited_and_removed() {
        let draft = upper_lower().set_muscle(1, 0, 1, "triceps");
        assert_eq!(draft.days[1].exercises[0].muscles, vec!["chest", "triceps"]);
        let draft = draft.remove_muscle(1, 0, 0);
        assert_eq!(draft.days[1].exercises[0].muscles, vec!["triceps"]);
    }

    #[test]
    fn selected_day_without_exercises_fails_validation() {
        let draft = upper_lower().toggle_day_selected(4).set_day_label(4, "Arms");
        assert_eq!(
            draft.validate(),
            Err(ValidationError::EmptyWorkoutDay {
                label: "Arms".into()
            })
        );
        assert_eq!(
            PlanDraft::new(" ", "x").validate(),
            Err(ValidationError::EmptyPlanName)
        );
        assert_eq!(
            PlanDraft::new("Plan", "x").validate(),
            Err(ValidationError::NoWorkoutDays)
        );
    }

    #[test]
    fn new_plan_fills_rest_days_and_cleans_muscles() {
        let plan = upper_lower().to_new_plan(5, &[]).unwrap();
        assert_eq!(plan.workout_days.len(), 7);
        assert_eq!(plan.workout_days[0].label, REST_DAY_LABEL);
        assert!(plan.workout_days[0].exercises.is_empty());
        assert_eq!(plan.workout_days[1].label, "Upper");
        assert_eq!(plan.workout_days[1].exercises[0].muscles, vec!["chest"]);
        assert_eq!(plan.cycle_length_days, 7);
        assert_eq!(plan.user_id, 5);
    }

    #[test]
    fn catalog_exercises_are_copied_at_submission() {
        let catalog = vec![BaseExercise {
            id: 3,
            name: "Deadlift".into(),
            muscles: vec!["hamstrings".into(), "back".into()],
        }];
        let draft = upper_lower().add_exercise(
            2,
            ExerciseDraft {
                base_exercise_id: Some(3),
                ..Default::default()
            },
        );
        let plan = draft.to_new_plan(1, &catalog).unwrap();
        let copied = &plan.workout_days[2].exercises[1];
        assert_eq!(copied.name, "Deadlift");
        assert_eq!(copied.muscles, vec!["hamstrings", "back"]);
        assert_eq!(copied.base_exercise_id, Some(3));

        assert_eq!(
            draft.to_new_plan(1, &[]),
            Err(ValidationError::UnknownBaseExercise(3))
        );
    }

    #[test]
    fn short_toml_files_are_padded_to_a_week() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        fs::write(
            &path,
            r#"
name = "Push"
split_type = "ppl"

[[days]]
label = "Rest"

[[days]]
label = "Push"
selected = true

[[days.exercises]]
name = "Overhead Press"
muscles = ["shoulders"]
"#,
        )
        .unwrap();
        let draft = PlanDraft::from_toml_file(&path).unwrap();
        assert_eq!(draft.days.len(), 7);
        assert_eq!(draft.days[6].label, "Saturday");
        assert!(draft.days[1].selected);
        assert!(draft.validate().is_ok());
    }
}
