// src/api_client.rs
//! Remote implementation of [`Store`] over the REST API.

use chrono::NaiveDate;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::model::{
    BaseExercise, CreatedPlan, Credentials, NewCycle, NewPlan, NewSession, NewSessionExercise,
    User, WorkoutCycle, WorkoutPlan, WorkoutSession, WorkoutSessionExercise,
};
use crate::store::{Store, StoreError};

#[derive(Deserialize, Debug)]
struct AuthResponse {
    user: AuthUser,
    token: String,
}

#[derive(Deserialize, Debug)]
struct AuthUser {
    id: i64,
    username: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    #[serde(flatten)]
    session: &'a NewSession,
    exercises: &'a [NewSessionExercise],
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UpdateCyclePlanRequest {
    workout_plan_id: i64,
}

#[derive(Serialize, Debug)]
struct ReorderRequest {
    order: i64,
}

#[derive(Serialize, Debug)]
struct WeightRequest {
    weight: Option<f64>,
}

#[derive(Serialize, Debug)]
struct NewBaseExerciseRequest<'a> {
    name: &'a str,
    muscles: &'a [String],
}

pub struct ApiStore {
    http_client: Client,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl ApiStore {
    /// # Errors
    /// Returns `StoreError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, http_client))
    }

    /// Uses a caller-built client, e.g. one with custom proxy settings.
    pub fn with_client(base_url: &str, http_client: Client) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    /// Restores a bearer token saved from an earlier sign-in.
    #[must_use]
    pub fn with_token(self, token: Option<String>) -> Self {
        self.set_token(token);
        self
    }

    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = token;
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self.token.lock().ok().and_then(|guard| guard.clone());
        match token {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, StoreError> {
        let response = self.authorized(builder).send()?;
        debug!(status = %response.status(), "{what}");
        Ok(response)
    }

    /// Decodes a successful body or classifies the failure.
    fn expect_json<T: DeserializeOwned>(response: Response, entity: &'static str, id: i64) -> Result<T, StoreError> {
        let response = check_status(response, entity, id)?;
        Ok(response.json()?)
    }

    fn expect_ack(response: Response, entity: &'static str, id: i64) -> Result<(), StoreError> {
        check_status(response, entity, id).map(|_| ())
    }

    /// Lookup variant: 404 means "no such record", not an error.
    fn expect_optional<T: DeserializeOwned>(response: Response) -> Result<Option<T>, StoreError> {
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, "Record", 0)?;
        Ok(Some(response.json()?))
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let response = self.send(self.http_client.get(self.url(path)), path)?;
        Self::expect_optional(response)
    }

    fn post_ack(&self, path: &str, entity: &'static str, id: i64) -> Result<(), StoreError> {
        let response = self.send(self.http_client.post(self.url(path)), path)?;
        Self::expect_ack(response, entity, id)
    }

    fn authenticate(&self, path: &str, credentials: &Credentials) -> Result<User, StoreError> {
        info!(username = %credentials.username, "authenticating against {}", self.url(path));
        let response = self
            .http_client
            .post(self.url(path))
            .json(credentials)
            .send()?;
        let auth: AuthResponse = Self::expect_json(response, "User", 0)?;
        self.set_token(Some(auth.token.clone()));
        Ok(User {
            id: auth.user.id,
            username: auth.user.username,
            token: Some(auth.token),
        })
    }
}

/// Maps non-success statuses onto the store's error taxonomy.
fn classify_status(status: StatusCode, body: String, entity: &'static str, id: i64) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound { entity, id },
        StatusCode::CONFLICT => StoreError::AlreadyExists(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized,
        _ => StoreError::Server {
            status: status.as_u16(),
            body,
        },
    }
}

fn check_status(response: Response, entity: &'static str, id: i64) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "Could not read error body".to_string());
    // 404 and 409 are answers the caller branches on, not failures
    match status {
        StatusCode::NOT_FOUND | StatusCode::CONFLICT => {
            debug!("Request rejected with status: {}. Body: {}", status, body);
        }
        s if s.is_server_error() => {
            error!("Request failed with status: {}. Body: {}", status, body);
        }
        _ => warn!("Request failed with status: {}. Body: {}", status, body),
    }
    Err(classify_status(status, body, entity, id))
}

impl Store for ApiStore {
    fn sign_in(&self, credentials: &Credentials) -> Result<User, StoreError> {
        self.authenticate("/auth/login", credentials)
    }

    fn sign_up(&self, credentials: &Credentials) -> Result<User, StoreError> {
        self.authenticate("/auth/register", credentials)
    }

    fn get_active_plan(&self, user_id: i64) -> Result<Option<WorkoutPlan>, StoreError> {
        self.get(&format!("/users/{user_id}/plans/active"))
    }

    fn get_plan(&self, plan_id: i64) -> Result<Option<WorkoutPlan>, StoreError> {
        self.get(&format!("/plans/{plan_id}"))
    }

    fn list_plans(&self, user_id: i64) -> Result<Vec<WorkoutPlan>, StoreError> {
        Ok(self
            .get(&format!("/users/{user_id}/plans"))?
            .unwrap_or_default())
    }

    fn create_plan(&self, plan: &NewPlan) -> Result<CreatedPlan, StoreError> {
        let response = self.send(self.http_client.post(self.url("/plans")).json(plan), "POST /plans")?;
        Self::expect_json(response, "User", plan.user_id)
    }

    fn deactivate_plan(&self, user_id: i64) -> Result<(), StoreError> {
        self.post_ack(&format!("/users/{user_id}/plans/deactivate"), "User", user_id)
    }

    fn get_active_cycle(&self, user_id: i64) -> Result<Option<WorkoutCycle>, StoreError> {
        self.get(&format!("/users/{user_id}/cycles/active"))
    }

    fn create_cycle(&self, cycle: &NewCycle) -> Result<(), StoreError> {
        let response = self.send(self.http_client.post(self.url("/cycles")).json(cycle), "POST /cycles")?;
        Self::expect_ack(response, "Workout plan", cycle.workout_plan_id)
    }

    fn deactivate_cycle(&self, user_id: i64) -> Result<(), StoreError> {
        self.post_ack(&format!("/users/{user_id}/cycles/deactivate"), "User", user_id)
    }

    fn update_cycle_plan_id(&self, user_id: i64, plan_id: i64) -> Result<(), StoreError> {
        let path = format!("/users/{user_id}/cycles/active/plan");
        let body = UpdateCyclePlanRequest {
            workout_plan_id: plan_id,
        };
        let response = self.send(self.http_client.put(self.url(&path)).json(&body), &path)?;
        Self::expect_ack(response, "Active cycle for user", user_id)
    }

    fn get_session_by_date(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<WorkoutSession>, StoreError> {
        self.get(&format!("/users/{user_id}/sessions/{date}"))
    }

    fn list_sessions(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WorkoutSession>, StoreError> {
        Ok(self
            .get(&format!("/users/{user_id}/sessions?from={from}&to={to}"))?
            .unwrap_or_default())
    }

    fn create_session(
        &self,
        session: &NewSession,
        exercises: &[NewSessionExercise],
    ) -> Result<WorkoutSession, StoreError> {
        let body = CreateSessionRequest { session, exercises };
        let response = self.send(self.http_client.post(self.url("/sessions")).json(&body), "POST /sessions")?;
        Self::expect_json(response, "Workout cycle", session.workout_cycle_id)
    }

    fn delete_session(&self, session_id: i64) -> Result<(), StoreError> {
        let path = format!("/sessions/{session_id}");
        let response = self.send(self.http_client.delete(self.url(&path)), &path)?;
        Self::expect_ack(response, "Workout session", session_id)
    }

    fn mark_session_completed(&self, session_id: i64) -> Result<(), StoreError> {
        self.post_ack(&format!("/sessions/{session_id}/complete"), "Workout session", session_id)
    }

    fn get_session_exercises(
        &self,
        session_id: i64,
    ) -> Result<Vec<WorkoutSessionExercise>, StoreError> {
        let path = format!("/sessions/{session_id}/exercises");
        let response = self.send(self.http_client.get(self.url(&path)), &path)?;
        Self::expect_json(response, "Workout session", session_id)
    }

    fn add_session_exercise(
        &self,
        exercise: &NewSessionExercise,
    ) -> Result<WorkoutSessionExercise, StoreError> {
        let path = format!("/sessions/{}/exercises", exercise.workout_session_id);
        let response = self.send(self.http_client.post(self.url(&path)).json(exercise), &path)?;
        Self::expect_json(response, "Workout session", exercise.workout_session_id)
    }

    fn toggle_complete(&self, exercise_id: i64) -> Result<(), StoreError> {
        self.post_ack(
            &format!("/session-exercises/{exercise_id}/toggle-complete"),
            "Session exercise",
            exercise_id,
        )
    }

    fn toggle_skip(&self, exercise_id: i64) -> Result<(), StoreError> {
        self.post_ack(
            &format!("/session-exercises/{exercise_id}/toggle-skip"),
            "Session exercise",
            exercise_id,
        )
    }

    fn soft_delete(&self, exercise_id: i64) -> Result<(), StoreError> {
        let path = format!("/session-exercises/{exercise_id}");
        let response = self.send(self.http_client.delete(self.url(&path)), &path)?;
        Self::expect_ack(response, "Session exercise", exercise_id)
    }

    fn reorder(&self, exercise_id: i64, order: i64) -> Result<(), StoreError> {
        let path = format!("/session-exercises/{exercise_id}/order");
        let response = self.send(
            self.http_client.put(self.url(&path)).json(&ReorderRequest { order }),
            &path,
        )?;
        Self::expect_ack(response, "Session exercise", exercise_id)
    }

    fn set_weight(&self, exercise_id: i64, weight: Option<f64>) -> Result<(), StoreError> {
        let path = format!("/session-exercises/{exercise_id}/weight");
        let response = self.send(
            self.http_client.put(self.url(&path)).json(&WeightRequest { weight }),
            &path,
        )?;
        Self::expect_ack(response, "Session exercise", exercise_id)
    }

    fn list_base_exercises(&self) -> Result<Vec<BaseExercise>, StoreError> {
        Ok(self.get("/base-exercises")?.unwrap_or_default())
    }

    fn get_base_exercise(&self, id: i64) -> Result<Option<BaseExercise>, StoreError> {
        self.get(&format!("/base-exercises/{id}"))
    }

    fn create_base_exercise(
        &self,
        name: &str,
        muscles: &[String],
    ) -> Result<BaseExercise, StoreError> {
        let body = NewBaseExerciseRequest { name, muscles };
        let response = self.send(
            self.http_client.post(self.url("/base-exercises")).json(&body),
            "POST /base-exercises",
        )?;
        Self::expect_json(response, "Base exercise", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_onto_store_errors() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, String::new(), "Workout session", 3),
            StoreError::NotFound { id: 3, .. }
        ));
        assert!(classify_status(StatusCode::CONFLICT, "dup".into(), "x", 0).is_already_exists());
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new(), "x", 0),
            StoreError::Unauthorized
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "down".into(), "x", 0),
            StoreError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn base_url_is_normalized() {
        let store = ApiStore::new("https://api.example.com/v1/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            store.url("/plans/3"),
            "https://api.example.com/v1/plans/3"
        );
    }

    #[test]
    fn session_request_flattens_session_fields() {
        let session = NewSession {
            user_id: 1,
            workout_cycle_id: 2,
            cycle_day_index: 3,
            date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
        };
        let body = CreateSessionRequest {
            session: &session,
            exercises: &[],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["workoutCycleId"], 2);
        assert_eq!(json["date"], "2024-05-06");
        assert!(json["exercises"].as_array().unwrap().is_empty());
    }
}
