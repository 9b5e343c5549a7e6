// src/lib.rs
use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

// --- Declare modules ---
pub mod api_client;
pub mod cache;
mod config;
pub mod cycle;
pub mod db;
pub mod exercise;
pub mod model;
pub mod plan_draft;
pub mod session;
pub mod store;

// --- Expose public types ---
pub use api_client::ApiStore;
pub use cache::{SessionCache, ACTIVE_PLAN_KEY, USER_KEY};
pub use config::{
    get_config_path as get_config_path_util, load as load_config_util, parse_color,
    save as save_config_util, Backend, Config, ConfigError, StandardColor, Theme,
};
pub use db::{get_db_path as get_db_path_util, SqliteStore};
pub use exercise::{ExerciseStatus, ExerciseView};
pub use model::{
    BaseExercise, Credentials, User, WorkoutCycle, WorkoutDay, WorkoutExercise, WorkoutPlan,
    WorkoutSession, WorkoutSessionExercise,
};
pub use plan_draft::{DayDraft, DraftFileError, ExerciseDraft, PlanDraft, ValidationError};
pub use session::{RetireReport, StaleSession};
pub use store::{Store, StoreError};

use model::NewSessionExercise;

/// Conditions callers branch on rather than report as failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Not signed in. Use 'sign-in' first.")]
    NotSignedIn,
    #[error("No active workout plan. Create one first.")]
    NoActivePlan,
    #[error("No workout session on {0}.")]
    NoSession(NaiveDate),
    #[error("Exercise {0} is not part of this session.")]
    ExerciseNotInSession(i64),
}

/// Everything needed to show one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayView {
    pub date: NaiveDate,
    /// The plan day that applies, `None` when no day of the rotation applies.
    pub plan_day: Option<WorkoutDay>,
    pub session: Option<WorkoutSession>,
    pub exercises: Vec<WorkoutSessionExercise>,
}

impl DayView {
    pub fn is_rest_day(&self) -> bool {
        self.plan_day.as_ref().map_or(true, WorkoutDay::is_rest_day)
    }
}

pub struct AppService {
    pub config: Config,
    pub store: Box<dyn Store>,
    pub cache: SessionCache,
    pub config_path: PathBuf,
}

impl AppService {
    /// Initializes the application service.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or initialization fails.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;
        let cache_path = cache::get_cache_path().context("Failed to determine cache path")?;
        let cache = SessionCache::new(cache_path);

        let store: Box<dyn Store> = match config.backend {
            Backend::Remote => {
                let token = cache.get::<User>(USER_KEY).and_then(|u| u.token);
                let api = ApiStore::new(&config.api_base_url, config.request_timeout())
                    .context("Failed to build HTTP client")?
                    .with_token(token);
                Box::new(api)
            }
            Backend::Local => {
                let db_path = db::get_db_path().context("Failed to determine database path")?;
                let sqlite = SqliteStore::open(&db_path)
                    .with_context(|| format!("Failed to open database at {db_path:?}"))?;
                Box::new(sqlite)
            }
        };

        Ok(Self::with_store(config, store, cache, config_path))
    }

    pub fn with_store(
        config: Config,
        store: Box<dyn Store>,
        cache: SessionCache,
        config_path: PathBuf,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            config_path,
        }
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save(&self.config_path, &self.config)
    }

    /// Switches backend. Takes effect on the next start; the cached user is
    /// cleared because ids differ between backends.
    /// # Errors
    /// Returns `anyhow::Error` if saving the config or clearing the cache fails.
    pub fn set_backend(&mut self, backend: Backend) -> Result<()> {
        if self.config.backend != backend {
            self.clear_cached_session()?;
        }
        self.config.backend = backend;
        self.save_config().context("Failed to save config")
    }

    /// # Errors
    /// Returns `ConfigError` for malformed URLs or if saving fails.
    pub fn set_api_base_url(&mut self, url: &str) -> Result<(), ConfigError> {
        self.config.set_api_base_url(url)?;
        self.save_config()
    }

    // --- Users ---

    /// # Errors
    /// Returns `anyhow::Error` wrapping `StoreError::Unauthorized` for unknown users.
    pub fn sign_in(&self, username: &str, password: &str) -> Result<User> {
        let user = self
            .store
            .sign_in(&credentials(username, password)?)
            .with_context(|| format!("Sign-in failed for '{}'", username.trim()))?;
        self.remember_user(&user)?;
        Ok(user)
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping `StoreError::AlreadyExists` for taken usernames.
    pub fn sign_up(&self, username: &str, password: &str) -> Result<User> {
        let user = self
            .store
            .sign_up(&credentials(username, password)?)
            .with_context(|| format!("Sign-up failed for '{}'", username.trim()))?;
        self.remember_user(&user)?;
        Ok(user)
    }

    /// # Errors
    /// Returns `anyhow::Error` if the cache cannot be written.
    pub fn sign_out(&self) -> Result<()> {
        self.clear_cached_session()
    }

    fn remember_user(&self, user: &User) -> Result<()> {
        self.cache.remove(ACTIVE_PLAN_KEY)?;
        self.cache
            .set(USER_KEY, user)
            .context("Failed to cache signed-in user")?;
        info!(user_id = user.id, "signed in");
        Ok(())
    }

    fn clear_cached_session(&self) -> Result<()> {
        self.cache.remove(USER_KEY)?;
        self.cache.remove(ACTIVE_PLAN_KEY)?;
        Ok(())
    }

    /// # Errors
    /// Returns `LifecycleError::NotSignedIn` if no user is cached.
    pub fn current_user(&self) -> Result<User> {
        self.cache
            .get::<User>(USER_KEY)
            .ok_or_else(|| LifecycleError::NotSignedIn.into())
    }

    // --- Plans ---

    /// Fetches the active plan and refreshes the cached copy.
    /// # Errors
    /// Returns `LifecycleError::NoActivePlan` when the user has none; callers
    /// should route to plan creation.
    pub fn active_plan(&self) -> Result<WorkoutPlan> {
        let user = self.current_user()?;
        match self
            .store
            .get_active_plan(user.id)
            .context("Failed to fetch active plan")?
        {
            Some(plan) => {
                self.cache.set(ACTIVE_PLAN_KEY, &plan)?;
                Ok(plan)
            }
            None => {
                self.cache.remove(ACTIVE_PLAN_KEY)?;
                bail!(LifecycleError::NoActivePlan)
            }
        }
    }

    /// Last active plan seen on this device, without a network round trip.
    pub fn cached_active_plan(&self) -> Option<WorkoutPlan> {
        self.cache.get(ACTIVE_PLAN_KEY)
    }

    fn catalog_for(&self, draft: &PlanDraft) -> Result<Vec<BaseExercise>> {
        let needs_catalog = draft
            .days
            .iter()
            .flat_map(|d| d.exercises.iter())
            .any(|e| e.base_exercise_id.is_some());
        if !needs_catalog {
            return Ok(Vec::new());
        }
        self.store
            .list_base_exercises()
            .context("Failed to load exercise catalog")
    }

    fn fetch_plan(&self, plan_id: i64) -> Result<WorkoutPlan> {
        self.store
            .get_plan(plan_id)?
            .ok_or_else(|| anyhow::anyhow!("Plan {plan_id} vanished after creation"))
    }

    /// Creates a new plan, replacing any active plan, and starts a cycle at `today`.
    /// # Errors
    /// Returns `ValidationError` before any persistence call if the draft is incomplete.
    pub fn create_plan(&self, draft: &PlanDraft, today: NaiveDate) -> Result<WorkoutPlan> {
        let user = self.current_user()?;
        let catalog = self.catalog_for(draft)?;
        let mut new_plan = draft.to_new_plan(user.id, &catalog)?;
        new_plan.group_id = None;

        if self.store.get_active_plan(user.id)?.is_some()
            || self.store.get_active_cycle(user.id)?.is_some()
        {
            let report = session::retire_cycle_and_plan(self.store.as_ref(), user.id, today)
                .context("Failed to retire the previous plan")?;
            if report.stale_session.is_some() {
                warn!("previous plan retired but today's session could not be removed");
            }
        }

        let created = self
            .store
            .create_plan(&new_plan)
            .context("Failed to create workout plan")?;
        session::start_cycle(self.store.as_ref(), user.id, created.plan_id, today)
            .context("Failed to start workout cycle")?;

        let plan = self.fetch_plan(created.plan_id)?;
        self.cache.set(ACTIVE_PLAN_KEY, &plan)?;
        info!(plan_id = plan.id, "created plan '{}'", plan.name);
        Ok(plan)
    }

    /// Saves `draft` as the next version of the active plan. The running cycle
    /// keeps its start date and rotation.
    /// # Errors
    /// Returns `ValidationError` for incomplete drafts and
    /// `LifecycleError::NoActivePlan` when there is nothing to edit.
    pub fn edit_plan(&self, draft: &PlanDraft, today: NaiveDate) -> Result<WorkoutPlan> {
        let current = self.active_plan()?;
        let catalog = self.catalog_for(draft)?;
        let mut new_plan = draft.to_new_plan(current.user_id, &catalog)?;
        new_plan.group_id = Some(current.group_id);

        let created = self
            .store
            .create_plan(&new_plan)
            .context("Failed to save new plan version")?;

        match self.store.get_active_cycle(current.user_id)? {
            Some(cycle) => {
                session::replace_plan(self.store.as_ref(), &cycle, created.plan_id)
                    .context("Failed to move cycle to the new plan version")?;
            }
            None => {
                session::start_cycle(self.store.as_ref(), current.user_id, created.plan_id, today)
                    .context("Failed to start workout cycle")?;
            }
        }

        let plan = self.fetch_plan(created.plan_id)?;
        self.cache.set(ACTIVE_PLAN_KEY, &plan)?;
        info!(
            plan_id = plan.id,
            version = plan.version,
            "saved new version of '{}'",
            plan.name
        );
        Ok(plan)
    }

    /// Retires the active cycle and plan.
    /// # Errors
    /// Returns `anyhow::Error` if deactivation fails; a failed cleanup of
    /// today's session is reported in the returned `RetireReport` instead.
    pub fn retire_plan(&self, today: NaiveDate) -> Result<RetireReport> {
        let user = self.current_user()?;
        let report = session::retire_cycle_and_plan(self.store.as_ref(), user.id, today)
            .context("Failed to retire workout plan")?;
        self.cache.remove(ACTIVE_PLAN_KEY)?;
        Ok(report)
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn plan_history(&self) -> Result<Vec<WorkoutPlan>> {
        let user = self.current_user()?;
        self.store
            .list_plans(user.id)
            .context("Failed to list plans")
    }

    // --- Sessions ---

    fn active_cycle_or_start(&self, plan: &WorkoutPlan, today: NaiveDate) -> Result<WorkoutCycle> {
        match self.store.get_active_cycle(plan.user_id)? {
            Some(cycle) => Ok(cycle),
            None => session::start_cycle(self.store.as_ref(), plan.user_id, plan.id, today)
                .context("Failed to start workout cycle"),
        }
    }

    /// Resolves (creating on first access) the session for `date`.
    /// # Errors
    /// Returns `LifecycleError::NoActivePlan` when there is no plan to derive from.
    pub fn day(&self, date: NaiveDate) -> Result<DayView> {
        self.day_as_of(date, Local::now().date_naive())
    }

    /// Like [`Self::day`]; a plan without a cycle gets one starting `today`,
    /// whatever date is being viewed.
    /// # Errors
    /// Returns `LifecycleError::NoActivePlan` when there is no plan to derive from.
    pub fn day_as_of(&self, date: NaiveDate, today: NaiveDate) -> Result<DayView> {
        let plan = self.active_plan()?;
        let cycle = self.active_cycle_or_start(&plan, today)?;
        let session =
            session::resolve_or_create_session(self.store.as_ref(), plan.user_id, date, &cycle, &plan)
                .with_context(|| format!("Failed to resolve session for {date}"))?;

        let (plan_day, exercises) = match &session {
            // Sessions kept from an earlier cycle index a different plan
            Some(s) => (
                (s.workout_cycle_id == cycle.id)
                    .then(|| plan.day(s.cycle_day_index).cloned())
                    .flatten(),
                self.session_exercises(s.id, ExerciseView::Active)?,
            ),
            None => (None, Vec::new()),
        };

        Ok(DayView {
            date,
            plan_day,
            session,
            exercises,
        })
    }

    /// The existing session on `date`, for commands that change it.
    /// # Errors
    /// Returns `LifecycleError::NoSession` if that day was never opened.
    pub fn session_for_update(&self, date: NaiveDate) -> Result<WorkoutSession> {
        let user = self.current_user()?;
        self.store
            .get_session_by_date(user.id, date)
            .with_context(|| format!("Failed to look up session for {date}"))?
            .ok_or_else(|| LifecycleError::NoSession(date).into())
    }

    /// Reads the session of a past day without creating one.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn session_on(
        &self,
        date: NaiveDate,
        view: ExerciseView,
    ) -> Result<Option<(WorkoutSession, Vec<WorkoutSessionExercise>)>> {
        let user = self.current_user()?;
        match self.store.get_session_by_date(user.id, date)? {
            Some(s) => {
                let exercises = self.session_exercises(s.id, view)?;
                Ok(Some((s, exercises)))
            }
            None => Ok(None),
        }
    }

    /// Plan days still ahead in the rotation, padded to a rolling week.
    /// # Errors
    /// Returns `LifecycleError::NoActivePlan` when there is no plan.
    pub fn upcoming(&self, today: NaiveDate) -> Result<Vec<WorkoutDay>> {
        let plan = self.active_plan()?;
        let Some(cycle) = self.store.get_active_cycle(plan.user_id)? else {
            return Ok(Vec::new());
        };
        let Some(remaining) = cycle::remaining_days_in_cycle(&cycle, today) else {
            return Ok(Vec::new());
        };
        Ok(cycle::upcoming_plan_days(&remaining, &plan.workout_days)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Marks the session on `date` completed. Repeating it is harmless.
    /// # Errors
    /// Returns `LifecycleError::NoSession` if that day has no session.
    pub fn finish_session(&self, date: NaiveDate) -> Result<WorkoutSession> {
        let user = self.current_user()?;
        let session = self
            .store
            .get_session_by_date(user.id, date)?
            .ok_or(LifecycleError::NoSession(date))?;
        session::mark_completed(self.store.as_ref(), &session)
            .with_context(|| format!("Failed to complete session {}", session.id))
    }

    /// Sessions between two dates inclusive, for the calendar.
    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn calendar(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<WorkoutSession>> {
        let user = self.current_user()?;
        if from > to {
            bail!("Calendar range start {from} is after its end {to}.");
        }
        self.store
            .list_sessions(user.id, from, to)
            .context("Failed to list sessions")
    }

    // --- Session exercises ---

    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn session_exercises(
        &self,
        session_id: i64,
        view: ExerciseView,
    ) -> Result<Vec<WorkoutSessionExercise>> {
        let all = self
            .store
            .get_session_exercises(session_id)
            .with_context(|| format!("Failed to load exercises for session {session_id}"))?;
        Ok(exercise::filter_view(all, view))
    }

    /// Runs one mutation, then re-reads the session so the result reflects
    /// what the store confirmed rather than a local prediction.
    fn mutate_and_refresh<F>(
        &self,
        session: &WorkoutSession,
        exercise_id: i64,
        mutation: F,
    ) -> Result<Vec<WorkoutSessionExercise>>
    where
        F: FnOnce(&dyn Store) -> Result<(), StoreError>,
    {
        let current = self.store.get_session_exercises(session.id)?;
        if !current.iter().any(|e| e.id == exercise_id) {
            bail!(LifecycleError::ExerciseNotInSession(exercise_id));
        }
        mutation(self.store.as_ref())
            .with_context(|| format!("Failed to update exercise {exercise_id}"))?;
        self.session_exercises(session.id, ExerciseView::Active)
    }

    /// # Errors
    /// Returns `LifecycleError::ExerciseNotInSession` or wrapped store errors.
    pub fn toggle_complete(
        &self,
        session: &WorkoutSession,
        exercise_id: i64,
    ) -> Result<Vec<WorkoutSessionExercise>> {
        self.mutate_and_refresh(session, exercise_id, |s| s.toggle_complete(exercise_id))
    }

    /// # Errors
    /// Returns `LifecycleError::ExerciseNotInSession` or wrapped store errors.
    pub fn toggle_skip(
        &self,
        session: &WorkoutSession,
        exercise_id: i64,
    ) -> Result<Vec<WorkoutSessionExercise>> {
        self.mutate_and_refresh(session, exercise_id, |s| s.toggle_skip(exercise_id))
    }

    /// # Errors
    /// Returns `LifecycleError::ExerciseNotInSession` or wrapped store errors.
    pub fn remove_exercise(
        &self,
        session: &WorkoutSession,
        exercise_id: i64,
    ) -> Result<Vec<WorkoutSessionExercise>> {
        self.mutate_and_refresh(session, exercise_id, |s| s.soft_delete(exercise_id))
    }

    /// # Errors
    /// Returns `LifecycleError::ExerciseNotInSession` or wrapped store errors.
    pub fn reorder_exercise(
        &self,
        session: &WorkoutSession,
        exercise_id: i64,
        order: i64,
    ) -> Result<Vec<WorkoutSessionExercise>> {
        self.mutate_and_refresh(session, exercise_id, |s| s.reorder(exercise_id, order))
    }

    /// # Errors
    /// Returns `anyhow::Error` for negative weights, `LifecycleError::ExerciseNotInSession`
    /// or wrapped store errors.
    pub fn set_exercise_weight(
        &self,
        session: &WorkoutSession,
        exercise_id: i64,
        weight: Option<f64>,
    ) -> Result<Vec<WorkoutSessionExercise>> {
        if weight.is_some_and(|w| w < 0.0 || !w.is_finite()) {
            bail!("Weight must be a non-negative number.");
        }
        self.mutate_and_refresh(session, exercise_id, |s| s.set_weight(exercise_id, weight))
    }

    /// Appends an exercise to the session. Catalog-linked drafts copy the
    /// catalog's name and muscles as they are now.
    /// # Errors
    /// Returns `ValidationError` for unnamed exercises or unknown catalog ids.
    pub fn add_session_exercise(
        &self,
        session: &WorkoutSession,
        draft: &ExerciseDraft,
    ) -> Result<Vec<WorkoutSessionExercise>> {
        let (name, muscles) = match draft.base_exercise_id {
            Some(base_id) => {
                let base = self
                    .store
                    .get_base_exercise(base_id)?
                    .ok_or(ValidationError::UnknownBaseExercise(base_id))?;
                (base.name, model::normalize_muscles(&base.muscles))
            }
            None => {
                let name = draft.name.trim();
                if name.is_empty() {
                    bail!(ValidationError::EmptyExerciseName {
                        label: "this session".to_string()
                    });
                }
                (name.to_string(), model::normalize_muscles(&draft.muscles))
            }
        };

        let existing = self.store.get_session_exercises(session.id)?;
        let order = existing.iter().map(|e| e.order).max().map_or(0, |m| m + 1);

        self.store
            .add_session_exercise(&NewSessionExercise {
                workout_session_id: session.id,
                name,
                muscles,
                order,
                is_optional: draft.is_optional,
                base_exercise_id: draft.base_exercise_id,
            })
            .context("Failed to add exercise to session")?;
        self.session_exercises(session.id, ExerciseView::Active)
    }

    // --- Catalog ---

    /// # Errors
    /// Returns `anyhow::Error` wrapping store errors.
    pub fn list_base_exercises(&self) -> Result<Vec<BaseExercise>> {
        self.store
            .list_base_exercises()
            .context("Failed to list exercise catalog")
    }

    /// # Errors
    /// Returns `anyhow::Error` if the name is empty or already taken.
    pub fn create_base_exercise(&self, name: &str, muscles: &str) -> Result<BaseExercise> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            bail!("Exercise name cannot be empty.");
        }
        self.store
            .create_base_exercise(trimmed, &model::parse_muscle_list(muscles))
            .with_context(|| format!("Failed to create catalog exercise '{trimmed}'"))
    }
}

fn credentials(username: &str, password: &str) -> Result<Credentials> {
    let username = username.trim();
    if username.is_empty() {
        bail!("Username cannot be empty.");
    }
    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}
