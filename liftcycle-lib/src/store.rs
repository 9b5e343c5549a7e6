// src/store.rs
//! The persistence collaborator. Everything of record lives behind this trait;
//! the lifecycle code never persists directly.

use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{
    BaseExercise, CreatedPlan, Credentials, NewCycle, NewPlan, NewSession, NewSessionExercise,
    User, WorkoutCycle, WorkoutPlan, WorkoutSession, WorkoutSessionExercise,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found: ID {id}")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Record already exists: {0}")]
    AlreadyExists(String),
    #[error("Not signed in or session expired")]
    Unauthorized,
    #[error("Database connection failed")]
    Connection(#[from] rusqlite::Error),
    #[error("Database query failed: {0}")]
    QueryFailed(rusqlite::Error),
    #[error("Database insert failed: {0}")]
    InsertFailed(rusqlite::Error),
    #[error("Database update failed: {0}")]
    UpdateFailed(rusqlite::Error),
    #[error("Database delete failed: {0}")]
    DeleteFailed(rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing local data")]
    Io(#[from] std::io::Error),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned error: {status} - {body}")]
    Server { status: u16, body: String },
    #[error("Failed to decode stored data: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Lookups return `Ok(None)` for missing records; mutations on a missing
/// record return `StoreError::NotFound`.
pub trait Store {
    // --- Users ---
    fn sign_in(&self, credentials: &Credentials) -> Result<User, StoreError>;
    fn sign_up(&self, credentials: &Credentials) -> Result<User, StoreError>;

    // --- Plans ---
    fn get_active_plan(&self, user_id: i64) -> Result<Option<WorkoutPlan>, StoreError>;
    fn get_plan(&self, plan_id: i64) -> Result<Option<WorkoutPlan>, StoreError>;
    /// Every plan version the user has created, newest first.
    fn list_plans(&self, user_id: i64) -> Result<Vec<WorkoutPlan>, StoreError>;
    /// Creates the plan and makes it the user's only active plan.
    fn create_plan(&self, plan: &NewPlan) -> Result<CreatedPlan, StoreError>;
    fn deactivate_plan(&self, user_id: i64) -> Result<(), StoreError>;

    // --- Cycles ---
    fn get_active_cycle(&self, user_id: i64) -> Result<Option<WorkoutCycle>, StoreError>;
    /// Creates the cycle and makes it the user's only active cycle.
    fn create_cycle(&self, cycle: &NewCycle) -> Result<(), StoreError>;
    fn deactivate_cycle(&self, user_id: i64) -> Result<(), StoreError>;
    fn update_cycle_plan_id(&self, user_id: i64, plan_id: i64) -> Result<(), StoreError>;
    /// Deactivates the user's cycle and then their plan.
    ///
    /// Backends without multi-statement writes issue the two calls in order.
    /// If the second one fails the user is left with an active plan and no
    /// cycle; the next `create_plan` or `create_cycle` deactivates it anyway.
    fn retire_active(&self, user_id: i64) -> Result<(), StoreError> {
        self.deactivate_cycle(user_id)?;
        self.deactivate_plan(user_id)
    }

    // --- Sessions ---
    fn get_session_by_date(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<WorkoutSession>, StoreError>;
    /// Sessions with `from <= date <= to`, ordered by date.
    fn list_sessions(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WorkoutSession>, StoreError>;
    /// Creates the session and its exercise instances as one unit. Returns
    /// `StoreError::AlreadyExists` if the user already has a session that day;
    /// the `workout_session_id` of each exercise is ignored.
    fn create_session(
        &self,
        session: &NewSession,
        exercises: &[NewSessionExercise],
    ) -> Result<WorkoutSession, StoreError>;
    fn delete_session(&self, session_id: i64) -> Result<(), StoreError>;
    fn mark_session_completed(&self, session_id: i64) -> Result<(), StoreError>;

    // --- Session exercises ---
    /// All exercises of the session, soft-deleted ones included.
    fn get_session_exercises(
        &self,
        session_id: i64,
    ) -> Result<Vec<WorkoutSessionExercise>, StoreError>;
    fn add_session_exercise(
        &self,
        exercise: &NewSessionExercise,
    ) -> Result<WorkoutSessionExercise, StoreError>;
    fn toggle_complete(&self, exercise_id: i64) -> Result<(), StoreError>;
    fn toggle_skip(&self, exercise_id: i64) -> Result<(), StoreError>;
    fn soft_delete(&self, exercise_id: i64) -> Result<(), StoreError>;
    fn reorder(&self, exercise_id: i64, order: i64) -> Result<(), StoreError>;
    fn set_weight(&self, exercise_id: i64, weight: Option<f64>) -> Result<(), StoreError>;

    // --- Base exercise catalog ---
    fn list_base_exercises(&self) -> Result<Vec<BaseExercise>, StoreError>;
    fn get_base_exercise(&self, id: i64) -> Result<Option<BaseExercise>, StoreError>;
    fn create_base_exercise(
        &self,
        name: &str,
        muscles: &[String],
    ) -> Result<BaseExercise, StoreError>;
}
