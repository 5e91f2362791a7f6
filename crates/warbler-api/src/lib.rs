pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod render;
pub mod session;
pub mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use warbler_db::Database;

use crate::render::Templates;
use crate::session::SessionStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub templates: Templates,
    pub sessions: SessionStore,
}

impl AppStateInner {
    pub fn new(db: Database) -> anyhow::Result<AppState> {
        Self::with_sessions(db, SessionStore::new())
    }

    pub fn with_sessions(db: Database, sessions: SessionStore) -> anyhow::Result<AppState> {
        Ok(Arc::new(Self {
            db,
            templates: Templates::new()?,
            sessions,
        }))
    }
}

/// Every Warbler page route, wrapped in the session layer.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(messages::homepage))
        .route("/signup", get(auth::show_signup).post(auth::handle_signup))
        .route("/login", get(auth::show_login).post(auth::handle_login))
        .route("/logout", get(auth::logout))
        .route("/users", get(users::list_users))
        .route("/users/profile", get(users::edit_profile_form).post(users::edit_profile))
        .route("/users/delete", post(users::delete_user))
        .route("/users/follow/{follow_id}", post(users::add_follow))
        .route("/users/stop-following/{follow_id}", post(users::stop_following))
        .route("/users/{user_id}", get(users::show_user))
        .route("/users/{user_id}/following", get(users::show_following))
        .route("/users/{user_id}/followers", get(users::show_followers))
        .route("/users/{user_id}/likes", get(users::show_likes))
        .route("/messages/new", get(messages::new_message_form).post(messages::create_message))
        .route("/messages/{message_id}", get(messages::show_message))
        .route("/messages/{message_id}/delete", post(messages::delete_message))
        .route("/messages/{message_id}/like", post(messages::toggle_like))
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::load_session))
        .with_state(state)
}

async fn not_found() -> error::ViewError {
    error::ViewError::NotFound
}
