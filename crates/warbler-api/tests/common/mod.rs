#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use warbler_api::session::{SESSION_COOKIE, SessionStore};
use warbler_api::{AppState, AppStateInner, auth, router};
use warbler_db::Database;
use warbler_db::models::NewMessage;
use warbler_types::models::User;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers.get(header::LOCATION).and_then(|v| v.to_str().ok())
    }

    /// `name=value` of the session cookie, ready to send back.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(SESSION_COOKIE))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

pub struct TestApp {
    pub state: AppState,
    app: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_sessions(SessionStore::new())
    }

    pub fn with_sessions(sessions: SessionStore) -> Self {
        let db = Database::open_in_memory().expect("in-memory database");
        let state = AppStateInner::with_sessions(db, sessions).expect("app state");
        let app = router(state.clone());
        Self { state, app }
    }

    /// Signs up `username` with `username` as password.
    pub fn signup(&self, username: &str) -> User {
        auth::signup(
            &self.state.db,
            username,
            &format!("{username}@test.com"),
            username,
            None,
        )
        .expect("signup")
    }

    pub fn add_message(&self, user_id: i64, text: &str) -> i64 {
        self.state
            .db
            .insert_message(&NewMessage { text: Some(text), user_id })
            .expect("insert message")
    }

    /// Cookie for a session already logged in as `user_id`.
    pub fn login_cookie(&self, user_id: i64) -> String {
        let id = self.state.sessions.create_logged_in(user_id);
        format!("{SESSION_COOKIE}={id}")
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> TestResponse {
        let mut req = Request::get(path);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, path: &str, form: &str, cookie: Option<&str>) -> TestResponse {
        let mut req = Request::post(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::from(form.to_string())).unwrap()).await
    }

    async fn send(&self, req: Request<Body>) -> TestResponse {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}
