use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{error, warn};
use uuid::Uuid;

use warbler_types::models::{FlashLevel, User};

use crate::AppState;
use crate::error::ViewError;
use crate::session::{SESSION_COOKIE, Session};

/// Who is making the request: their session and, if logged in, their user.
#[derive(Clone)]
pub struct Viewer {
    pub session: Session,
    pub user: Option<User>,
}

impl Viewer {
    /// The logged-in user, or a flash + redirect home.
    pub fn require(&self) -> Result<&User, ViewError> {
        match &self.user {
            Some(user) => Ok(user),
            None => {
                self.session.flash(FlashLevel::Danger, "Access unauthorized.");
                Err(ViewError::Unauthorized)
            }
        }
    }

    /// Like `require`, but the logged-in user must also be `user_id`.
    pub fn require_self(&self, user_id: i64) -> Result<&User, ViewError> {
        let user = self.require()?;
        if user.id != user_id {
            warn!("User {} denied access to pages of user {}", user.id, user_id);
            self.session.flash(FlashLevel::Danger, "Access unauthorized.");
            return Err(ViewError::Unauthorized);
        }
        Ok(user)
    }
}

/// Attach a [`Viewer`] to every request.
///
/// A session id is minted for visitors without a valid cookie, but the cookie
/// is only sent once something has been written to that session. When the
/// handler logs out, the cookie follows the rotated id or is cleared.
pub async fn load_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let existing = jar
        .get(SESSION_COOKIE)
        .and_then(|c| c.value().parse::<Uuid>().ok())
        .filter(|id| state.sessions.touch(id));

    let session = Session::new(
        existing.unwrap_or_else(Uuid::new_v4),
        state.sessions.clone(),
    );

    let user = match session.user_id() {
        Some(user_id) => match state.db.get_user(user_id) {
            Ok(Some(row)) => Some(User::from(row)),
            Ok(None) => {
                // Account deleted out from under the session
                session.logout();
                None
            }
            Err(e) => {
                error!("Failed to load session user {}: {}", user_id, e);
                None
            }
        },
        None => None,
    };

    req.extensions_mut().insert(Viewer {
        session: session.clone(),
        user,
    });
    let response = next.run(req).await;

    let current = session.id();
    if state.sessions.contains(&current) {
        if existing == Some(current) {
            return response;
        }
        let cookie = Cookie::build((SESSION_COOKIE, current.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        (jar.add(cookie), response).into_response()
    } else if existing.is_some() {
        (jar.remove(Cookie::build(SESSION_COOKIE).path("/")), response).into_response()
    } else {
        response
    }
}
