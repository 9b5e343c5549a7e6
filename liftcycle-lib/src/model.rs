// src/model.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Label given to plan days that carry no exercises.
pub const REST_DAY_LABEL: &str = "Rest Day";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>, // Issued by the remote API, absent for local profiles
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A versioned weekly template. Never mutated in place: an edit is a new row
/// with the same `group_id` and `version + 1`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutPlan {
    pub id: i64,
    pub group_id: i64,
    pub version: i64,
    pub user_id: i64,
    pub name: String,
    pub split_type: String,
    pub cycle_length_days: i64,
    pub is_active: bool,
    pub workout_days: Vec<WorkoutDay>,
}

impl WorkoutPlan {
    /// Looks up a day by its fixed template position.
    pub fn day(&self, order: u8) -> Option<&WorkoutDay> {
        self.workout_days.iter().find(|d| d.order == order)
    }

    /// Days sorted by template position.
    pub fn days_in_order(&self) -> Vec<&WorkoutDay> {
        let mut days: Vec<&WorkoutDay> = self.workout_days.iter().collect();
        days.sort_by_key(|d| d.order);
        days
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutDay {
    pub label: String,
    pub order: u8,
    pub exercises: Vec<WorkoutExercise>,
}

impl WorkoutDay {
    pub fn is_rest_day(&self) -> bool {
        self.exercises.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutExercise {
    pub name: String,
    pub muscles: Vec<String>,
    pub is_optional: bool,
    pub order: i64,
    pub base_exercise_id: Option<i64>,
}

/// Shared catalog entry. Name and muscles are copied into plans and sessions
/// when referenced and are not kept in sync afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BaseExercise {
    pub id: i64,
    pub name: String,
    pub muscles: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutCycle {
    pub id: i64,
    pub user_id: i64,
    pub workout_plan_id: i64,
    pub start_date: NaiveDate,
    pub day_order_map: Vec<u8>,
    pub is_active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSession {
    pub id: i64,
    pub user_id: i64,
    pub workout_cycle_id: i64,
    pub cycle_day_index: u8,
    pub date: NaiveDate,
    pub is_completed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSessionExercise {
    pub id: i64,
    pub workout_session_id: i64,
    pub name: String,
    pub muscles: Vec<String>,
    pub order: i64,
    pub is_optional: bool,
    pub is_completed: bool,
    pub is_skipped: bool,
    pub is_deleted: bool,
    pub weight: Option<f64>,
    pub base_exercise_id: Option<i64>,
}

// --- Request shapes ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    pub user_id: i64,
    pub group_id: Option<i64>, // Some(..) when this is a new version of an existing plan
    pub name: String,
    pub split_type: String,
    pub cycle_length_days: i64,
    pub workout_days: Vec<NewWorkoutDay>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkoutDay {
    pub label: String,
    pub order: u8,
    pub exercises: Vec<NewWorkoutExercise>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkoutExercise {
    pub name: String,
    pub muscles: Vec<String>,
    pub is_optional: bool,
    pub order: i64,
    pub base_exercise_id: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPlan {
    pub plan_id: i64,
    pub plan_group_id: i64,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewCycle {
    pub user_id: i64,
    pub workout_plan_id: i64,
    pub start_date: NaiveDate,
    pub day_order_map: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub user_id: i64,
    pub workout_cycle_id: i64,
    pub cycle_day_index: u8,
    pub date: NaiveDate,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionExercise {
    pub workout_session_id: i64,
    pub name: String,
    pub muscles: Vec<String>,
    pub order: i64,
    pub is_optional: bool,
    pub base_exercise_id: Option<i64>,
}

impl NewSessionExercise {
    /// Field-for-field copy of a template exercise into a session.
    pub fn from_template(workout_session_id: i64, template: &WorkoutExercise) -> Self {
        Self {
            workout_session_id,
            name: template.name.clone(),
            muscles: template.muscles.clone(),
            order: template.order,
            is_optional: template.is_optional,
            base_exercise_id: template.base_exercise_id,
        }
    }
}

/// Trims, drops empty entries and removes duplicates while keeping first-seen order.
pub fn normalize_muscles<I, S>(muscles: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for m in muscles {
        let trimmed = m.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.iter().any(|existing| existing.eq_ignore_ascii_case(trimmed)) {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Parses the comma-separated form used on the command line.
pub fn parse_muscle_list(raw: &str) -> Vec<String> {
    normalize_muscles(raw.split(','))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muscles_are_trimmed_and_deduplicated() {
        assert_eq!(
            parse_muscle_list(" chest, triceps,,Chest , "),
            vec!["chest".to_string(), "triceps".to_string()]
        );
        assert!(parse_muscle_list("").is_empty());
    }

    #[test]
    fn rest_day_has_no_exercises() {
        let day = WorkoutDay {
            label: REST_DAY_LABEL.to_string(),
            order: 0,
            exercises: vec![],
        };
        assert!(day.is_rest_day());
    }

    #[test]
    fn wire_format_is_camel_case() {
        let session = WorkoutSession {
            id: 1,
            user_id: 2,
            workout_cycle_id: 3,
            cycle_day_index: 4,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            is_completed: false,
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["workoutCycleId"], 3);
        assert_eq!(json["cycleDayIndex"], 4);
        assert_eq!(json["date"], "2024-01-01");
    }
}
