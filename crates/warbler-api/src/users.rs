use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    response::Response,
};
use minijinja::context;
use tracing::info;

use warbler_db::is_constraint_violation;
use warbler_db::models::UserUpdate;
use warbler_types::forms::{SearchQuery, UserEditForm, non_blank};
use warbler_types::models::{FlashLevel, Message, User};

use crate::AppState;
use crate::auth::authenticate;
use crate::error::{OrNotFound, ViewError};
use crate::middleware::Viewer;
use crate::render::redirect;

/// Messages shown on a profile page.
const PROFILE_MESSAGE_LIMIT: u32 = 100;

/// Ids of the users the viewer follows; empty when logged out.
fn following_ids(state: &AppState, viewer: &Viewer) -> Result<Vec<i64>, ViewError> {
    match &viewer.user {
        Some(user) => Ok(state.db.following(user.id)?.iter().map(|u| u.id).collect()),
        None => Ok(Vec::new()),
    }
}

fn liked_ids(state: &AppState, viewer: &Viewer) -> Result<Vec<i64>, ViewError> {
    match &viewer.user {
        Some(user) => Ok(state.db.liked_message_ids(user.id)?),
        None => Ok(Vec::new()),
    }
}

/// GET /users — everyone, or usernames matching `?q=`.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, ViewError> {
    let search = query.q.as_deref().and_then(non_blank);
    let users: Vec<User> = state
        .db
        .list_users(search)?
        .into_iter()
        .map(User::from)
        .collect();

    state.templates.page(
        &viewer,
        "users/index.html",
        context! {
            users,
            search,
            following_ids => following_ids(&state, &viewer)?,
        },
    )
}

/// GET /users/{user_id} — profile with the user's newest messages.
pub async fn show_user(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<i64>,
) -> Result<Response, ViewError> {
    let user = User::from(state.db.get_user(user_id).or_not_found()?);
    let messages: Vec<Message> = state
        .db
        .messages_by_user(user_id, PROFILE_MESSAGE_LIMIT)?
        .into_iter()
        .map(Message::from)
        .collect();

    state.templates.page(
        &viewer,
        "users/show.html",
        context! {
            user,
            messages,
            stats => state.db.user_stats(user_id)?,
            following_ids => following_ids(&state, &viewer)?,
            likes => liked_ids(&state, &viewer)?,
        },
    )
}

/// GET /users/{user_id}/following — only the user themself may look.
pub async fn show_following(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<i64>,
) -> Result<Response, ViewError> {
    viewer.require_self(user_id)?;

    let user = User::from(state.db.get_user(user_id).or_not_found()?);
    let users: Vec<User> = state.db.following(user_id)?.into_iter().map(User::from).collect();

    state.templates.page(
        &viewer,
        "users/following.html",
        context! {
            user,
            users,
            stats => state.db.user_stats(user_id)?,
            following_ids => following_ids(&state, &viewer)?,
        },
    )
}

/// GET /users/{user_id}/followers — only the user themself may look.
pub async fn show_followers(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<i64>,
) -> Result<Response, ViewError> {
    viewer.require_self(user_id)?;

    let user = User::from(state.db.get_user(user_id).or_not_found()?);
    let users: Vec<User> = state.db.followers(user_id)?.into_iter().map(User::from).collect();

    state.templates.page(
        &viewer,
        "users/followers.html",
        context! {
            user,
            users,
            stats => state.db.user_stats(user_id)?,
            following_ids => following_ids(&state, &viewer)?,
        },
    )
}

/// GET /users/{user_id}/likes
pub async fn show_likes(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<i64>,
) -> Result<Response, ViewError> {
    viewer.require()?;

    let user = User::from(state.db.get_user(user_id).or_not_found()?);
    let messages: Vec<Message> = state
        .db
        .liked_messages(user_id)?
        .into_iter()
        .map(Message::from)
        .collect();

    state.templates.page(
        &viewer,
        "users/likes.html",
        context! {
            user,
            messages,
            stats => state.db.user_stats(user_id)?,
            following_ids => following_ids(&state, &viewer)?,
            likes => liked_ids(&state, &viewer)?,
        },
    )
}

/// POST /users/follow/{follow_id}
pub async fn add_follow(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(follow_id): Path<i64>,
) -> Result<Response, ViewError> {
    let me = viewer.require()?;
    let followed = state.db.get_user(follow_id).or_not_found()?;

    if followed.id == me.id {
        viewer.session.flash(FlashLevel::Danger, "You can't follow yourself.");
        return Ok(redirect(&format!("/users/{}", me.id)));
    }

    state.db.follow(me.id, followed.id)?;
    info!("User {} now follows {}", me.id, followed.id);

    Ok(redirect(&format!("/users/{}/following", me.id)))
}

/// POST /users/stop-following/{follow_id}
pub async fn stop_following(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(follow_id): Path<i64>,
) -> Result<Response, ViewError> {
    let me = viewer.require()?;
    let followed = state.db.get_user(follow_id).or_not_found()?;

    state.db.unfollow(me.id, followed.id)?;

    Ok(redirect(&format!("/users/{}/following", me.id)))
}

/// GET /users/profile
pub async fn edit_profile_form(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Response, ViewError> {
    let me = viewer.require()?;

    state.templates.page(
        &viewer,
        "users/edit.html",
        context! { form => me },
    )
}

/// POST /users/profile — the current password must be re-entered.
pub async fn edit_profile(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Form(form): Form<UserEditForm>,
) -> Result<Response, ViewError> {
    let me = viewer.require()?.clone();

    let db_state = state.clone();
    let username = me.username.clone();
    let password = form.password.clone();
    let confirmed = tokio::task::spawn_blocking(move || {
        authenticate(&db_state.db, &username, &password)
    })
    .await??;

    if confirmed.is_none() {
        viewer
            .session
            .flash(FlashLevel::Danger, "Wrong password, please try again.");
        return Ok(redirect("/"));
    }

    let (Some(username), Some(email)) = (non_blank(&form.username), non_blank(&form.email)) else {
        viewer
            .session
            .flash(FlashLevel::Danger, "Username and email are required.");
        return rerender_edit(&state, &viewer, &form);
    };

    let update = UserUpdate {
        username,
        email,
        image_url: non_blank(&form.image_url),
        header_image_url: non_blank(&form.header_image_url),
        bio: non_blank(&form.bio),
        location: non_blank(&form.location),
    };

    match state.db.update_user(me.id, &update) {
        Ok(()) => {
            info!("User {} updated their profile", me.id);
            Ok(redirect(&format!("/users/{}", me.id)))
        }
        Err(e) if is_constraint_violation(&e) => {
            viewer
                .session
                .flash(FlashLevel::Danger, "Username or email already taken");
            rerender_edit(&state, &viewer, &form)
        }
        Err(e) => Err(e.into()),
    }
}

fn rerender_edit(state: &AppState, viewer: &Viewer, form: &UserEditForm) -> Result<Response, ViewError> {
    state.templates.page(
        viewer,
        "users/edit.html",
        context! {
            form => context! {
                username => &form.username,
                email => &form.email,
                image_url => &form.image_url,
                header_image_url => &form.header_image_url,
                bio => &form.bio,
                location => &form.location,
            },
        },
    )
}

/// POST /users/delete — removes the account and everything it owns.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Response, ViewError> {
    let me = viewer.require()?;

    state.db.delete_user(me.id)?;
    viewer.session.logout();
    info!("User {} deleted their account", me.id);

    Ok(redirect("/signup"))
}
