use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Form, extract::State, response::Response};
use minijinja::context;
use thiserror::Error;
use tracing::{info, warn};

use warbler_db::models::NewUser;
use warbler_db::{Database, is_constraint_violation};
use warbler_types::forms::{LoginForm, SignupForm, non_blank};
use warbler_types::models::{FlashLevel, User};

use crate::AppState;
use crate::error::ViewError;
use crate::middleware::Viewer;
use crate::render::redirect;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("username or email already taken")]
    Taken,
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// Hashes `password` and stores a new user. An empty `image_url` falls back
/// to the default avatar.
pub fn signup(
    db: &Database,
    username: &str,
    email: &str,
    password: &str,
    image_url: Option<&str>,
) -> Result<User, SignupError> {
    // Argon2id with a random salt
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| SignupError::Hash(e.to_string()))?
        .to_string();

    let user_id = db
        .insert_user(&NewUser {
            username,
            email,
            password_hash: &password_hash,
            image_url: image_url.and_then(non_blank),
        })
        .map_err(|e| {
            if is_constraint_violation(&e) {
                SignupError::Taken
            } else {
                SignupError::Database(e)
            }
        })?;

    let user = db
        .get_user(user_id)?
        .ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", user_id))?;

    info!("New user {} (#{})", username, user_id);
    Ok(user.into())
}

/// Returns the user when `username` exists and `password` matches its hash.
/// An unknown username and a wrong password are indistinguishable.
pub fn authenticate(db: &Database, username: &str, password: &str) -> anyhow::Result<Option<User>> {
    let Some(user) = db.get_user_by_username(username)? else {
        return Ok(None);
    };

    let parsed_hash = match PasswordHash::new(&user.password) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Unparseable password hash for user {}: {}", user.id, e);
            return Ok(None);
        }
    };

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Ok(None);
    }

    Ok(Some(user.into()))
}

// -- Handlers --

pub async fn show_signup(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Response, ViewError> {
    state.templates.page(&viewer, "users/signup.html", context! {})
}

pub async fn handle_signup(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Form(form): Form<SignupForm>,
) -> Result<Response, ViewError> {
    let mut errors = Vec::new();
    if non_blank(&form.username).is_none() {
        errors.push("Username is required.");
    }
    if !form.email.contains('@') {
        errors.push("A valid email is required.");
    }
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push("Password must be at least 6 characters.");
    }
    if !errors.is_empty() {
        return rerender_signup(&state, &viewer, &form, errors);
    }

    let db_state = state.clone();
    let username = form.username.trim().to_string();
    let email = form.email.trim().to_string();
    let password = form.password.clone();
    let image_url = form.image_url.clone();

    // Hashing is CPU-bound; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || {
        signup(&db_state.db, &username, &email, &password, Some(&image_url))
    })
    .await?;

    match result {
        Ok(user) => {
            viewer.session.login(user.id);
            Ok(redirect("/"))
        }
        Err(SignupError::Taken) => {
            viewer.session.flash(FlashLevel::Danger, "Username already taken");
            rerender_signup(&state, &viewer, &form, vec![])
        }
        Err(SignupError::Hash(e)) => Err(anyhow::anyhow!(e).into()),
        Err(SignupError::Database(e)) => Err(e.into()),
    }
}

fn rerender_signup(
    state: &AppState,
    viewer: &Viewer,
    form: &SignupForm,
    errors: Vec<&str>,
) -> Result<Response, ViewError> {
    state.templates.page(
        viewer,
        "users/signup.html",
        context! {
            errors,
            form => context! {
                username => &form.username,
                email => &form.email,
                image_url => &form.image_url,
            },
        },
    )
}

pub async fn show_login(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Response, ViewError> {
    state.templates.page(&viewer, "users/login.html", context! {})
}

pub async fn handle_login(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ViewError> {
    let db_state = state.clone();
    let username = form.username.clone();
    let password = form.password;

    let user = tokio::task::spawn_blocking(move || {
        authenticate(&db_state.db, &username, &password)
    })
    .await??;

    match user {
        Some(user) => {
            info!("User {} logged in", user.username);
            viewer.session.login(user.id);
            viewer
                .session
                .flash(FlashLevel::Success, format!("Hello, {}!", user.username));
            Ok(redirect("/"))
        }
        None => {
            warn!("Failed login for '{}'", form.username);
            viewer.session.flash(FlashLevel::Danger, "Invalid credentials.");
            state.templates.page(
                &viewer,
                "users/login.html",
                context! { form => context! { username => &form.username } },
            )
        }
    }
}

pub async fn logout(Extension(viewer): Extension<Viewer>) -> Response {
    viewer.session.logout();
    viewer
        .session
        .flash(FlashLevel::Success, "You have successfully logged out.");
    redirect("/login")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn signup_persists_hashed_password() {
        let db = db();
        let user = signup(&db, "testuser1", "test1@test.com", "HASHED_PASSWORD1", None).unwrap();

        let row = db.get_user(user.id).unwrap().expect("retrievable by id");
        assert_eq!(row.username, "testuser1");
        assert_ne!(row.password, "HASHED_PASSWORD1");
        assert!(row.password.starts_with("$argon2"));
        assert_eq!(user.image_url, "/static/images/default-pic.png");
    }

    #[test]
    fn signup_keeps_given_image() {
        let db = db();
        let user = signup(
            &db,
            "testuser1",
            "test1@test.com",
            "HASHED_PASSWORD1",
            Some("/static/images/warbler-hero.jpg"),
        )
        .unwrap();

        assert_eq!(user.image_url, "/static/images/warbler-hero.jpg");
    }

    #[test]
    fn signup_rejects_duplicates() {
        let db = db();
        signup(&db, "testuser1", "test1@test.com", "password", None).unwrap();

        let same_name = signup(&db, "testuser1", "other@test.com", "password", None);
        assert!(matches!(same_name, Err(SignupError::Taken)));

        let same_email = signup(&db, "other", "test1@test.com", "password", None);
        assert!(matches!(same_email, Err(SignupError::Taken)));
    }

    #[test]
    fn authenticate_returns_user_on_match() {
        let db = db();
        let user = signup(&db, "testuser4", "testuser4@test.com", "HASHED_PASSWORD4", None).unwrap();

        let authed = authenticate(&db, "testuser4", "HASHED_PASSWORD4").unwrap();
        assert_eq!(authed, Some(user));
    }

    #[test]
    fn authenticate_rejects_unknown_username() {
        let db = db();
        signup(&db, "testuser1", "test1@test.com", "HASHED_PASSWORD1", None).unwrap();

        assert_eq!(authenticate(&db, "testuser4", "HASHED_PASSWORD1").unwrap(), None);
    }

    #[test]
    fn authenticate_rejects_wrong_password() {
        let db = db();
        signup(&db, "testuser1", "test1@test.com", "HASHED_PASSWORD1", None).unwrap();

        assert_eq!(authenticate(&db, "testuser1", "HASHED_PASSWORD4").unwrap(), None);
    }

    #[test]
    fn authenticate_treats_corrupt_hash_as_failure() {
        let db = db();
        db.insert_user(&NewUser {
            username: "legacy",
            email: "legacy@test.com",
            password_hash: "not-a-phc-string",
            image_url: None,
        })
        .unwrap();

        assert_eq!(authenticate(&db, "legacy", "not-a-phc-string").unwrap(), None);
    }
}
