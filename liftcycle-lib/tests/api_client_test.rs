use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use liftcycle_lib::cycle::derive_day_order_map;
use liftcycle_lib::model::{Credentials, WorkoutCycle, WorkoutPlan};
use liftcycle_lib::session::resolve_or_create_session;
use liftcycle_lib::{ApiStore, Store, StoreError};

/// One request as the server saw it.
#[derive(Debug)]
struct SeenRequest {
    line: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl SeenRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Answers each connection with the next scripted `(status, body)` pair.
struct ScriptedServer {
    base_url: String,
    seen: Receiver<SeenRequest>,
}

impl ScriptedServer {
    fn start(script: Vec<(u16, &'static str)>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let (tx, seen) = mpsc::channel();
        thread::spawn(move || -> io::Result<()> {
            for (status, body) in script {
                let (mut stream, _) = listener.accept()?;
                let request = read_request(&mut stream)?;
                if tx.send(request).is_err() {
                    break;
                }
                write!(
                    stream,
                    "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )?;
                stream.flush()?;
            }
            Ok(())
        });
        Ok(Self { base_url, seen })
    }

    fn store(&self) -> Result<ApiStore> {
        // Bypass any proxy configured in the environment
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(ApiStore::with_client(&self.base_url, client))
    }

    /// Requests handled so far, in arrival order.
    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.try_iter().collect()
    }
}

fn read_request(stream: &mut impl Read) -> io::Result<SeenRequest> {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "headers cut short"));
        }
        raw.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = raw[head_end + 4..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Ok(SeenRequest {
        line,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

/// Collects formatted log output for the duration of `f`.
fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
    #[derive(Clone)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Ok(mut out) = self.0.lock() {
                out.extend_from_slice(buf);
            }
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let sink = Sink(Arc::new(Mutex::new(Vec::new())));
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logged = sink
        .0
        .lock()
        .map(|out| String::from_utf8_lossy(&out).to_string())
        .unwrap_or_default();
    (result, logged)
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn running_cycle() -> WorkoutCycle {
    WorkoutCycle {
        id: 2,
        user_id: 1,
        workout_plan_id: 3,
        start_date: monday(),
        day_order_map: derive_day_order_map(monday()).to_vec(),
        is_active: true,
    }
}

fn empty_plan() -> WorkoutPlan {
    WorkoutPlan {
        id: 3,
        group_id: 3,
        version: 1,
        user_id: 1,
        name: "Upper/Lower".into(),
        split_type: "upper-lower".into(),
        cycle_length_days: 7,
        is_active: true,
        workout_days: vec![],
    }
}

const MONDAY_SESSION: &str = r#"{"id":7,"userId":1,"workoutCycleId":2,"cycleDayIndex":1,"date":"2024-01-01","isCompleted":false}"#;

#[test]
fn test_not_found_lookups_are_none() -> Result<()> {
    let server = ScriptedServer::start(vec![(404, ""), (404, r#"{"error":"no cycle"}"#)])?;
    let store = server.store()?;

    assert!(store.get_active_plan(1)?.is_none());
    assert!(store.get_active_cycle(1)?.is_none());

    let lines: Vec<String> = server.seen().into_iter().map(|r| r.line).collect();
    assert_eq!(
        lines,
        vec![
            "GET /users/1/plans/active HTTP/1.1",
            "GET /users/1/cycles/active HTTP/1.1"
        ]
    );
    Ok(())
}

#[test]
fn test_not_found_mutation_is_an_error() -> Result<()> {
    let server = ScriptedServer::start(vec![(404, "")])?;
    let store = server.store()?;
    assert!(matches!(
        store.toggle_complete(42),
        Err(StoreError::NotFound { id: 42, .. })
    ));
    Ok(())
}

#[test]
fn test_sign_in_token_is_sent_as_bearer() -> Result<()> {
    let server = ScriptedServer::start(vec![
        (200, r#"{"user":{"id":1,"username":"sam"},"token":"t0k3n"}"#),
        (404, ""),
    ])?;
    let store = server.store()?;

    let user = store.sign_in(&Credentials {
        username: "sam".into(),
        password: "hunter2".into(),
    })?;
    assert_eq!(user.id, 1);
    assert_eq!(user.token.as_deref(), Some("t0k3n"));
    store.get_active_plan(user.id)?;

    let seen = server.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].line, "POST /auth/login HTTP/1.1");
    assert_eq!(seen[0].header("authorization"), None);
    let login: serde_json::Value = serde_json::from_str(&seen[0].body)?;
    assert_eq!(login["username"], "sam");
    assert_eq!(seen[1].header("authorization"), Some("Bearer t0k3n"));
    Ok(())
}

#[test]
fn test_conflicting_create_reads_existing_session() -> Result<()> {
    let server = ScriptedServer::start(vec![
        (404, ""),
        (409, r#"{"error":"session exists"}"#),
        (200, MONDAY_SESSION),
    ])?;
    let store = server.store()?.with_token(Some("t0k3n".into()));

    let session = resolve_or_create_session(&store, 1, monday(), &running_cycle(), &empty_plan())?
        .context("session expected")?;
    assert_eq!(session.id, 7);
    assert_eq!(session.workout_cycle_id, 2);

    let seen = server.seen();
    let lines: Vec<&str> = seen.iter().map(|r| r.line.as_str()).collect();
    assert_eq!(
        lines,
        vec![
            "GET /users/1/sessions/2024-01-01 HTTP/1.1",
            "POST /sessions HTTP/1.1",
            "GET /users/1/sessions/2024-01-01 HTTP/1.1"
        ]
    );
    let created: serde_json::Value = serde_json::from_str(&seen[1].body)?;
    assert_eq!(created["cycleDayIndex"], 1);
    assert_eq!(created["date"], "2024-01-01");
    assert!(seen.iter().all(|r| r.header("authorization") == Some("Bearer t0k3n")));
    Ok(())
}

#[test]
fn test_expected_rejections_stay_below_warn() -> Result<()> {
    let server = ScriptedServer::start(vec![
        (404, ""),
        (409, r#"{"error":"session exists"}"#),
        (200, MONDAY_SESSION),
        (503, "maintenance"),
    ])?;
    let store = server.store()?;

    let (resolved, logged) = capture_warnings(|| {
        resolve_or_create_session(&store, 1, monday(), &running_cycle(), &empty_plan())
    });
    assert!(resolved?.is_some());
    assert!(logged.is_empty(), "unexpected log output: {logged}");

    let (failed, logged) = capture_warnings(|| store.get_active_plan(1));
    assert!(matches!(failed, Err(StoreError::Server { status: 503, .. })));
    assert!(logged.contains("ERROR"));
    assert!(logged.contains("maintenance"));
    Ok(())
}
