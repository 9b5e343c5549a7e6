// src/db.rs
//! Self-contained SQLite implementation of [`Store`].
//!
//! The uniqueness rules a remote server would enforce live in the schema here:
//! one session per user per date, and at most one active plan and one active
//! cycle per user (partial unique indexes). Concurrent session creation is
//! first-writer-wins; the loser sees `StoreError::AlreadyExists`.

use chrono::{NaiveDate, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::exercise;
use crate::model::{
    BaseExercise, CreatedPlan, Credentials, NewCycle, NewPlan, NewSession, NewSessionExercise, User, WorkoutCycle, WorkoutDay, WorkoutExercise, WorkoutPlan,
    WorkoutSession, WorkoutSessionExercise,
};
use crate::store::{Store, StoreError};

const DB_FILE_NAME: &str = "liftcycle.sqlite";
pub(crate) const APP_DATA_DIR: &str = "liftcycle";

/// Gets the path to the SQLite database file within the app's data directory.
pub fn get_db_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir().ok_or(StoreError::DataDir)?;
    let app_dir = data_dir.join(APP_DATA_DIR);
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Opens a connection to the SQLite database.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(StoreError::Connection)?;
    Ok(conn)
}

/// Initializes the database tables if they don't exist.
pub fn init_db(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE
        );

        CREATE TABLE IF NOT EXISTS base_exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            muscles TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS workout_plans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL,
            version INTEGER NOT NULL,
            user_id INTEGER NOT NULL REFERENCES users(id),
            name TEXT NOT NULL,
            split_type TEXT NOT NULL,
            cycle_length_days INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_plans_one_active
            ON workout_plans(user_id) WHERE is_active = 1;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_plans_group_version
            ON workout_plans(group_id, version);

        CREATE TABLE IF NOT EXISTS workout_days (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id INTEGER NOT NULL REFERENCES workout_plans(id),
            day_order INTEGER NOT NULL CHECK(day_order BETWEEN 0 AND 6),
            label TEXT NOT NULL,
            UNIQUE(plan_id, day_order)
        );

        CREATE TABLE IF NOT EXISTS workout_exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            day_id INTEGER NOT NULL REFERENCES workout_days(id),
            name TEXT NOT NULL,
            muscles TEXT NOT NULL DEFAULT '[]',
            is_optional INTEGER NOT NULL DEFAULT 0,
            exercise_order INTEGER NOT NULL,
            base_exercise_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS workout_cycles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            workout_plan_id INTEGER NOT NULL REFERENCES workout_plans(id),
            start_date TEXT NOT NULL,
            day_order_map TEXT NOT NULL, -- JSON array of 7 plan-day indices
            is_active INTEGER NOT NULL DEFAULT 1
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_cycles_one_active
            ON workout_cycles(user_id) WHERE is_active = 1;

        CREATE TABLE IF NOT EXISTS workout_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            workout_cycle_id INTEGER NOT NULL REFERENCES workout_cycles(id),
            cycle_day_index INTEGER NOT NULL,
            date TEXT NOT NULL,
            is_completed INTEGER NOT NULL DEFAULT 0,
            UNIQUE(user_id, date)
        );

        CREATE TABLE IF NOT EXISTS session_exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES workout_sessions(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            muscles TEXT NOT NULL DEFAULT '[]',
            exercise_order INTEGER NOT NULL,
            is_optional INTEGER NOT NULL DEFAULT 0,
            is_completed INTEGER NOT NULL DEFAULT 0,
            is_skipped INTEGER NOT NULL DEFAULT 0,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            weight REAL,
            base_exercise_id INTEGER,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_session_exercises_session
            ON session_exercises(session_id);",
    )
    .map_err(StoreError::Connection)?;
    Ok(())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// Muscle lists are JSON arrays so names may contain any character
fn encode_muscles(muscles: &[String]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(muscles)?)
}

fn decode_muscles(raw: &str, idx: usize) -> Result<Vec<String>, rusqlite::Error> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn decode_day_order_map(raw: &str) -> Result<Vec<u8>, rusqlite::Error> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn map_row_to_cycle(row: &Row) -> Result<WorkoutCycle, rusqlite::Error> {
    let raw_map: String = row.get(4)?;
    Ok(WorkoutCycle {
        id: row.get(0)?,
        user_id: row.get(1)?,
        workout_plan_id: row.get(2)?,
        start_date: row.get(3)?,
        day_order_map: decode_day_order_map(&raw_map)?,
        is_active: row.get(5)?,
    })
}

fn map_row_to_session(row: &Row) -> Result<WorkoutSession, rusqlite::Error> {
    Ok(WorkoutSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        workout_cycle_id: row.get(2)?,
        cycle_day_index: row.get(3)?,
        date: row.get(4)?,
        is_completed: row.get(5)?,
    })
}

fn map_row_to_session_exercise(row: &Row) -> Result<WorkoutSessionExercise, rusqlite::Error> {
    let muscles: String = row.get(3)?;
    Ok(WorkoutSessionExercise {
        id: row.get(0)?,
        workout_session_id: row.get(1)?,
        name: row.get(2)?,
        muscles: decode_muscles(&muscles, 3)?,
        order: row.get(4)?,
        is_optional: row.get(5)?,
        is_completed: row.get(6)?,
        is_skipped: row.get(7)?,
        is_deleted: row.get(8)?,
        weight: row.get(9)?,
        base_exercise_id: row.get(10)?,
    })
}

fn map_row_to_base_exercise(row: &Row) -> Result<BaseExercise, rusqlite::Error> {
    let muscles: String = row.get(2)?;
    Ok(BaseExercise {
        id: row.get(0)?,
        name: row.get(1)?,
        muscles: decode_muscles(&muscles, 2)?,
    })
}

const PLAN_COLUMNS: &str =
    "id, group_id, version, user_id, name, split_type, cycle_length_days, is_active";
const CYCLE_COLUMNS: &str = "id, user_id, workout_plan_id, start_date, day_order_map, is_active";
const SESSION_COLUMNS: &str = "id, user_id, workout_cycle_id, cycle_day_index, date, is_completed";
const SESSION_EXERCISE_COLUMNS: &str = "id, session_id, name, muscles, exercise_order, is_optional, is_completed, is_skipped, is_deleted, weight, base_exercise_id";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wraps an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self, StoreError> {
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::new(open_db(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::new(Connection::open_in_memory().map_err(StoreError::Connection)?)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, username FROM users WHERE username = ?1 COLLATE NOCASE",
                params![username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        token: None,
                    })
                },
            )
            .optional()
            .map_err(StoreError::QueryFailed)
    }

    /// Fills in the days and exercises of a plan header row.
    fn load_plan_days(&self, plan_id: i64) -> Result<Vec<WorkoutDay>, StoreError> {
        let mut day_stmt = self
            .conn
            .prepare("SELECT id, day_order, label FROM workout_days WHERE plan_id = ?1 ORDER BY day_order ASC")
            .map_err(StoreError::QueryFailed)?;
        let day_rows = day_stmt
            .query_map(params![plan_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, u8>(1)?, row.get::<_, String>(2)?))
            })
            .map_err(StoreError::QueryFailed)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::QueryFailed)?;

        let mut ex_stmt = self
            .conn
            .prepare(
                "SELECT name, muscles, is_optional, exercise_order, base_exercise_id
                 FROM workout_exercises WHERE day_id = ?1 ORDER BY exercise_order ASC, id ASC",
            )
            .map_err(StoreError::QueryFailed)?;

        let mut days = Vec::with_capacity(day_rows.len());
        for (day_id, order, label) in day_rows {
            let exercises = ex_stmt
                .query_map(params![day_id], |row| {
                    let muscles: String = row.get(1)?;
                    Ok(WorkoutExercise {
                        name: row.get(0)?,
                        muscles: decode_muscles(&muscles, 1)?,
                        is_optional: row.get(2)?,
                        order: row.get(3)?,
                        base_exercise_id: row.get(4)?,
                    })
                })
                .map_err(StoreError::QueryFailed)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::QueryFailed)?;
            days.push(WorkoutDay {
                label,
                order,
                exercises,
            });
        }
        Ok(days)
    }

    fn query_plan(&self, where_clause: &str, key: i64) -> Result<Option<WorkoutPlan>, StoreError> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM workout_plans WHERE {where_clause}");
        let header = self
            .conn
            .query_row(&sql, params![key], |row| {
                Ok(WorkoutPlan {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    version: row.get(2)?,
                    user_id: row.get(3)?,
                    name: row.get(4)?,
                    split_type: row.get(5)?,
                    cycle_length_days: row.get(6)?,
                    is_active: row.get(7)?,
                    workout_days: Vec::new(),
                })
            })
            .optional()
            .map_err(StoreError::QueryFailed)?;

        match header {
            Some(mut plan) => {
                plan.workout_days = self.load_plan_days(plan.id)?;
                Ok(Some(plan))
            }
            None => Ok(None),
        }
    }

    fn get_session_exercise(&self, exercise_id: i64) -> Result<WorkoutSessionExercise, StoreError> {
        let sql = format!("SELECT {SESSION_EXERCISE_COLUMNS} FROM session_exercises WHERE id = ?1");
        self.conn
            .query_row(&sql, params![exercise_id], map_row_to_session_exercise)
            .optional()
            .map_err(StoreError::QueryFailed)?
            .ok_or(StoreError::NotFound {
                entity: "Session exercise",
                id: exercise_id,
            })
    }

    /// Loads an exercise, applies a transition and writes the result back.
    fn mutate_exercise<F>(&self, exercise_id: i64, transition: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut WorkoutSessionExercise),
    {
        let mut ex = self.get_session_exercise(exercise_id)?;
        transition(&mut ex);
        self.conn
            .execute(
                "UPDATE session_exercises
                 SET is_completed = :completed, is_skipped = :skipped, is_deleted = :deleted,
                     exercise_order = :order, weight = :weight, updated_at = :updated_at
                 WHERE id = :id",
                named_params! {
                    ":completed": ex.is_completed,
                    ":skipped": ex.is_skipped,
                    ":deleted": ex.is_deleted,
                    ":order": ex.order,
                    ":weight": ex.weight,
                    ":updated_at": Utc::now().to_rfc3339(),
                    ":id": exercise_id,
                },
            )
            .map_err(StoreError::UpdateFailed)?;
        Ok(())
    }

    fn insert_session_exercise(
        conn: &Connection,
        session_id: i64,
        exercise: &NewSessionExercise,
    ) -> Result<i64, StoreError> {
        let muscles = encode_muscles(&exercise.muscles)?;
        conn.execute(
            "INSERT INTO session_exercises
                (session_id, name, muscles, exercise_order, is_optional, base_exercise_id, updated_at)
             VALUES (:session_id, :name, :muscles, :order, :optional, :base_id, :updated_at)",
            named_params! {
                ":session_id": session_id,
                ":name": exercise.name,
                ":muscles": muscles,
                ":order": exercise.order,
                ":optional": exercise.is_optional,
                ":base_id": exercise.base_exercise_id,
                ":updated_at": Utc::now().to_rfc3339(),
            },
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::NotFound {
                    entity: "Workout session",
                    id: session_id,
                }
            } else {
                StoreError::InsertFailed(e)
            }
        })?;
        Ok(conn.last_insert_rowid())
    }
}

impl Store for SqliteStore {
    /// Local databases carry no credentials: the username selects an existing profile.
    fn sign_in(&self, credentials: &Credentials) -> Result<User, StoreError> {
        self.find_user(credentials.username.trim())?
            .ok_or(StoreError::Unauthorized)
    }

    fn sign_up(&self, credentials: &Credentials) -> Result<User, StoreError> {
        let username = credentials.username.trim();
        self.conn
            .execute("INSERT INTO users (username) VALUES (?1)", params![username])
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::AlreadyExists(format!("user '{username}'"))
                } else {
                    StoreError::InsertFailed(e)
                }
            })?;
        Ok(User {
            id: self.conn.last_insert_rowid(),
            username: username.to_string(),
            token: None,
        })
    }

    fn get_active_plan(&self, user_id: i64) -> Result<Option<WorkoutPlan>, StoreError> {
        self.query_plan("user_id = ?1 AND is_active = 1", user_id)
    }

    fn get_plan(&self, plan_id: i64) -> Result<Option<WorkoutPlan>, StoreError> {
        self.query_plan("id = ?1", plan_id)
    }

    fn list_plans(&self, user_id: i64) -> Result<Vec<WorkoutPlan>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM workout_plans WHERE user_id = ?1 ORDER BY id DESC")
            .map_err(StoreError::QueryFailed)?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, i64>(0))
            .map_err(StoreError::QueryFailed)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::QueryFailed)?;

        let mut plans = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(plan) = self.get_plan(id)? {
                plans.push(plan);
            }
        }
        Ok(plans)
    }

    fn create_plan(&self, plan: &NewPlan) -> Result<CreatedPlan, StoreError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(StoreError::Connection)?;

        let version: i64 = match plan.group_id {
            Some(group_id) => tx
                .query_row(
                    "SELECT COALESCE(MAX(version), 0) + 1 FROM workout_plans WHERE group_id = ?1",
                    params![group_id],
                    |row| row.get(0),
                )
                .map_err(StoreError::QueryFailed)?,
            None => 1,
        };

        tx.execute(
            "UPDATE workout_plans SET is_active = 0 WHERE user_id = ?1 AND is_active = 1",
            params![plan.user_id],
        )
        .map_err(StoreError::UpdateFailed)?;

        tx.execute(
            "INSERT INTO workout_plans
                (group_id, version, user_id, name, split_type, cycle_length_days, is_active, created_at)
             VALUES (:group_id, :version, :user_id, :name, :split_type, :cycle_len, 1, :created_at)",
            named_params! {
                ":group_id": plan.group_id.unwrap_or(0),
                ":version": version,
                ":user_id": plan.user_id,
                ":name": plan.name,
                ":split_type": plan.split_type,
                ":cycle_len": plan.cycle_length_days,
                ":created_at": Utc::now().to_rfc3339(),
            },
        )
        .map_err(StoreError::InsertFailed)?;
        let plan_id = tx.last_insert_rowid();

        // A brand-new plan starts its own group
        let group_id = match plan.group_id {
            Some(g) => g,
            None => {
                tx.execute(
                    "UPDATE workout_plans SET group_id = id WHERE id = ?1",
                    params![plan_id],
                )
                .map_err(StoreError::UpdateFailed)?;
                plan_id
            }
        };

        for day in &plan.workout_days {
            tx.execute(
                "INSERT INTO workout_days (plan_id, day_order, label) VALUES (?1, ?2, ?3)",
                params![plan_id, day.order, day.label],
            )
            .map_err(StoreError::InsertFailed)?;
            let day_id = tx.last_insert_rowid();
            for ex in &day.exercises {
                let muscles = encode_muscles(&ex.muscles)?;
                tx.execute(
                    "INSERT INTO workout_exercises
                        (day_id, name, muscles, is_optional, exercise_order, base_exercise_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        day_id,
                        ex.name,
                        muscles,
                        ex.is_optional,
                        ex.order,
                        ex.base_exercise_id
                    ],
                )
                .map_err(StoreError::InsertFailed)?;
            }
        }

        tx.commit().map_err(StoreError::Connection)?;
        debug!(plan_id, group_id, version, "created workout plan");
        Ok(CreatedPlan {
            plan_id,
            plan_group_id: group_id,
            version,
        })
    }

    fn deactivate_plan(&self, user_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE workout_plans SET is_active = 0 WHERE user_id = ?1 AND is_active = 1",
                params![user_id],
            )
            .map_err(StoreError::UpdateFailed)?;
        Ok(())
    }

    fn get_active_cycle(&self, user_id: i64) -> Result<Option<WorkoutCycle>, StoreError> {
        let sql =
            format!("SELECT {CYCLE_COLUMNS} FROM workout_cycles WHERE user_id = ?1 AND is_active = 1");
        self.conn
            .query_row(&sql, params![user_id], map_row_to_cycle)
            .optional()
            .map_err(StoreError::QueryFailed)
    }

    fn create_cycle(&self, cycle: &NewCycle) -> Result<(), StoreError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(StoreError::Connection)?;
        tx.execute(
            "UPDATE workout_cycles SET is_active = 0 WHERE user_id = ?1 AND is_active = 1",
            params![cycle.user_id],
        )
        .map_err(StoreError::UpdateFailed)?;
        tx.execute(
            "INSERT INTO workout_cycles (user_id, workout_plan_id, start_date, day_order_map, is_active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![
                cycle.user_id,
                cycle.workout_plan_id,
                cycle.start_date,
                serde_json::to_string(&cycle.day_order_map)?
            ],
        )
        .map_err(StoreError::InsertFailed)?;
        tx.commit().map_err(StoreError::Connection)?;
        Ok(())
    }

    fn deactivate_cycle(&self, user_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE workout_cycles SET is_active = 0 WHERE user_id = ?1 AND is_active = 1",
                params![user_id],
            )
            .map_err(StoreError::UpdateFailed)?;
        Ok(())
    }

    fn retire_active(&self, user_id: i64) -> Result<(), StoreError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(StoreError::Connection)?;
        tx.execute(
            "UPDATE workout_cycles SET is_active = 0 WHERE user_id = ?1 AND is_active = 1",
            params![user_id],
        )
        .map_err(StoreError::UpdateFailed)?;
        tx.execute(
            "UPDATE workout_plans SET is_active = 0 WHERE user_id = ?1 AND is_active = 1",
            params![user_id],
        )
        .map_err(StoreError::UpdateFailed)?;
        tx.commit().map_err(StoreError::Connection)?;
        debug!(user_id, "retired active cycle and plan");
        Ok(())
    }

    fn update_cycle_plan_id(&self, user_id: i64, plan_id: i64) -> Result<(), StoreError> {
        let rows = self
            .conn
            .execute(
                "UPDATE workout_cycles SET workout_plan_id = ?1 WHERE user_id = ?2 AND is_active = 1",
                params![plan_id, user_id],
            )
            .map_err(StoreError::UpdateFailed)?;
        if rows == 0 {
            return Err(StoreError::NotFound {
                entity: "Active cycle for user",
                id: user_id,
            });
        }
        Ok(())
    }

    fn get_session_by_date(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<WorkoutSession>, StoreError> {
        let sql =
            format!("SELECT {SESSION_COLUMNS} FROM workout_sessions WHERE user_id = ?1 AND date = ?2");
        self.conn
            .query_row(&sql, params![user_id, date], map_row_to_session)
            .optional()
            .map_err(StoreError::QueryFailed)
    }

    fn list_sessions(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WorkoutSession>, StoreError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM workout_sessions
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3 ORDER BY date ASC"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(StoreError::QueryFailed)?;
        let iter = stmt
            .query_map(params![user_id, from, to], map_row_to_session)
            .map_err(StoreError::QueryFailed)?;
        iter.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::QueryFailed)
    }

    fn create_session(
        &self,
        session: &NewSession,
        exercises: &[NewSessionExercise],
    ) -> Result<WorkoutSession, StoreError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(StoreError::Connection)?;

        tx.execute(
            "INSERT INTO workout_sessions (user_id, workout_cycle_id, cycle_day_index, date, is_completed)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                session.user_id,
                session.workout_cycle_id,
                session.cycle_day_index,
                session.date
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::AlreadyExists(format!(
                    "session for user {} on {}",
                    session.user_id, session.date
                ))
            } else {
                StoreError::InsertFailed(e)
            }
        })?;
        let session_id = tx.last_insert_rowid();

        for ex in exercises {
            Self::insert_session_exercise(&tx, session_id, ex)?;
        }
        tx.commit().map_err(StoreError::Connection)?;

        Ok(WorkoutSession {
            id: session_id,
            user_id: session.user_id,
            workout_cycle_id: session.workout_cycle_id,
            cycle_day_index: session.cycle_day_index,
            date: session.date,
            is_completed: false,
        })
    }

    fn delete_session(&self, session_id: i64) -> Result<(), StoreError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(StoreError::Connection)?;
        tx.execute(
            "DELETE FROM session_exercises WHERE session_id = ?1",
            params![session_id],
        )
        .map_err(StoreError::DeleteFailed)?;
        let rows = tx
            .execute("DELETE FROM workout_sessions WHERE id = ?1", params![session_id])
            .map_err(StoreError::DeleteFailed)?;
        if rows == 0 {
            return Err(StoreError::NotFound {
                entity: "Workout session",
                id: session_id,
            });
        }
        tx.commit().map_err(StoreError::Connection)?;
        Ok(())
    }

    fn mark_session_completed(&self, session_id: i64) -> Result<(), StoreError> {
        let rows = self
            .conn
            .execute(
                "UPDATE workout_sessions SET is_completed = 1 WHERE id = ?1",
                params![session_id],
            )
            .map_err(StoreError::UpdateFailed)?;
        if rows == 0 {
            return Err(StoreError::NotFound {
                entity: "Workout session",
                id: session_id,
            });
        }
        Ok(())
    }

    fn get_session_exercises(
        &self,
        session_id: i64,
    ) -> Result<Vec<WorkoutSessionExercise>, StoreError> {
        let sql = format!(
            "SELECT {SESSION_EXERCISE_COLUMNS} FROM session_exercises
             WHERE session_id = ?1 ORDER BY exercise_order ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(StoreError::QueryFailed)?;
        let iter = stmt
            .query_map(params![session_id], map_row_to_session_exercise)
            .map_err(StoreError::QueryFailed)?;
        iter.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::QueryFailed)
    }

    fn add_session_exercise(
        &self,
        exercise: &NewSessionExercise,
    ) -> Result<WorkoutSessionExercise, StoreError> {
        let id = Self::insert_session_exercise(&self.conn, exercise.workout_session_id, exercise)?;
        self.get_session_exercise(id)
    }

    fn toggle_complete(&self, exercise_id: i64) -> Result<(), StoreError> {
        self.mutate_exercise(exercise_id, exercise::toggle_complete)
    }

    fn toggle_skip(&self, exercise_id: i64) -> Result<(), StoreError> {
        self.mutate_exercise(exercise_id, exercise::toggle_skip)
    }

    fn soft_delete(&self, exercise_id: i64) -> Result<(), StoreError> {
        self.mutate_exercise(exercise_id, exercise::soft_delete)
    }

    fn reorder(&self, exercise_id: i64, order: i64) -> Result<(), StoreError> {
        self.mutate_exercise(exercise_id, |e| exercise::reorder(e, order))
    }

    fn set_weight(&self, exercise_id: i64, weight: Option<f64>) -> Result<(), StoreError> {
        self.mutate_exercise(exercise_id, |e| exercise::set_weight(e, weight))
    }

    fn list_base_exercises(&self) -> Result<Vec<BaseExercise>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, muscles FROM base_exercises ORDER BY name ASC")
            .map_err(StoreError::QueryFailed)?;
        let iter = stmt
            .query_map([], map_row_to_base_exercise)
            .map_err(StoreError::QueryFailed)?;
        iter.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::QueryFailed)
    }

    fn get_base_exercise(&self, id: i64) -> Result<Option<BaseExercise>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, name, muscles FROM base_exercises WHERE id = ?1",
                params![id],
                map_row_to_base_exercise,
            )
            .optional()
            .map_err(StoreError::QueryFailed)
    }

    fn create_base_exercise(
        &self,
        name: &str,
        muscles: &[String],
    ) -> Result<BaseExercise, StoreError> {
        let name = name.trim();
        let encoded = encode_muscles(muscles)?;
        self.conn
            .execute(
                "INSERT INTO base_exercises (name, muscles) VALUES (?1, ?2)",
                params![name, encoded],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::AlreadyExists(format!("base exercise '{name}'"))
                } else {
                    StoreError::InsertFailed(e)
                }
            })?;
        Ok(BaseExercise {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            muscles: muscles.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_user() -> (SqliteStore, User) {
        let store = SqliteStore::open_in_memory().unwrap();
        let user = store
            .sign_up(&Credentials {
                username: "alex".into(),
                password: String::new(),
            })
            .unwrap();
        (store, user)
    }

    #[test]
    fn sign_in_requires_existing_profile() {
        let (store, user) = store_with_user();
        let creds = |name: &str| Credentials {
            username: name.into(),
            password: String::new(),
        };
        assert_eq!(store.sign_in(&creds("ALEX")).unwrap().id, user.id);
        assert!(matches!(
            store.sign_in(&creds("nobody")),
            Err(StoreError::Unauthorized)
        ));
        assert!(store.sign_up(&creds("alex")).unwrap_err().is_already_exists());
    }

    #[test]
    fn cycle_map_round_trips_through_json_column() {
        let (store, user) = store_with_user();
        let plan = store
            .create_plan(&NewPlan {
                user_id: user.id,
                group_id: None,
                name: "Full body".into(),
                split_type: "full-body".into(),
                cycle_length_days: 7,
                workout_days: vec![],
            })
            .unwrap();
        store
            .create_cycle(&NewCycle {
                user_id: user.id,
                workout_plan_id: plan.plan_id,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                day_order_map: vec![1, 2, 3, 4, 5, 6, 0],
            })
            .unwrap();
        let cycle = store.get_active_cycle(user.id).unwrap().unwrap();
        assert_eq!(cycle.day_order_map, vec![1, 2, 3, 4, 5, 6, 0]);
        assert!(cycle.is_active);
    }

    #[test]
    fn mutations_on_missing_exercise_report_not_found() {
        let (store, _) = store_with_user();
        assert!(matches!(
            store.toggle_complete(42),
            Err(StoreError::NotFound { id: 42, .. })
        ));
        assert!(matches!(
            store.mark_session_completed(7),
            Err(StoreError::NotFound { id: 7, .. })
        ));
    }

    #[test]
    fn muscles_are_stored_as_json_arrays() {
        let (store, _) = store_with_user();
        let muscles = vec!["back, upper".to_string(), "lats".to_string()];
        let created = store.create_base_exercise("Pullover", &muscles).unwrap();
        let raw: String = store
            .conn
            .query_row(
                "SELECT muscles FROM base_exercises WHERE id = ?1",
                params![created.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw, r#"["back, upper","lats"]"#);
        let read = store.get_base_exercise(created.id).unwrap().unwrap();
        assert_eq!(read.muscles, muscles);
    }

    #[test]
    fn retire_active_clears_cycle_and_plan_together() {
        let (store, user) = store_with_user();
        let plan = store
            .create_plan(&NewPlan {
                user_id: user.id,
                group_id: None,
                name: "Full body".into(),
                split_type: "full-body".into(),
                cycle_length_days: 7,
                workout_days: vec![],
            })
            .unwrap();
        store
            .create_cycle(&NewCycle {
                user_id: user.id,
                workout_plan_id: plan.plan_id,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                day_order_map: vec![1, 2, 3, 4, 5, 6, 0],
            })
            .unwrap();

        store.retire_active(user.id).unwrap();
        assert!(store.get_active_cycle(user.id).unwrap().is_none());
        assert!(store.get_active_plan(user.id).unwrap().is_none());
        // Nothing left to retire is not an error
        store.retire_active(user.id).unwrap();
    }
}
