use axum::{
    Extension, Form,
    extract::{Path, State},
    response::Response,
};
use minijinja::context;
use tracing::{info, warn};

use warbler_db::models::NewMessage;
use warbler_types::forms::{MessageForm, non_blank};
use warbler_types::models::{FlashLevel, MESSAGE_MAX_LEN, Message};

use crate::AppState;
use crate::error::{OrNotFound, ViewError};
use crate::middleware::Viewer;
use crate::render::redirect;

/// Messages shown on the home timeline.
const TIMELINE_LIMIT: u32 = 100;

/// GET / — the viewer's timeline, or the landing page when logged out.
pub async fn homepage(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Response, ViewError> {
    let Some(user) = &viewer.user else {
        return state.templates.page(&viewer, "home-anon.html", context! {});
    };

    let messages: Vec<Message> = state
        .db
        .timeline(user.id, TIMELINE_LIMIT)?
        .into_iter()
        .map(Message::from)
        .collect();

    state.templates.page(
        &viewer,
        "home.html",
        context! {
            messages,
            stats => state.db.user_stats(user.id)?,
            likes => state.db.liked_message_ids(user.id)?,
        },
    )
}

/// GET /messages/new
pub async fn new_message_form(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Response, ViewError> {
    viewer.require()?;
    state.templates.page(&viewer, "messages/new.html", context! {})
}

/// POST /messages/new — redirects to the author's profile on success.
pub async fn create_message(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Form(form): Form<MessageForm>,
) -> Result<Response, ViewError> {
    let me = viewer.require()?;

    let text = form.text.as_deref().and_then(non_blank);
    let error = match text {
        None => Some("Text is required."),
        Some(t) if t.chars().count() > MESSAGE_MAX_LEN => Some("Messages are limited to 140 characters."),
        Some(_) => None,
    };
    if let Some(error) = error {
        return state.templates.page(
            &viewer,
            "messages/new.html",
            context! { error, text => form.text.as_deref().unwrap_or_default() },
        );
    }

    let message_id = state.db.insert_message(&NewMessage { text, user_id: me.id })?;
    info!("User {} posted message {}", me.id, message_id);

    Ok(redirect(&format!("/users/{}", me.id)))
}

/// GET /messages/{message_id}
pub async fn show_message(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(message_id): Path<i64>,
) -> Result<Response, ViewError> {
    let message = Message::from(state.db.get_message(message_id).or_not_found()?);
    let likes = match &viewer.user {
        Some(user) => state.db.liked_message_ids(user.id)?,
        None => Vec::new(),
    };

    state.templates.page(
        &viewer,
        "messages/show.html",
        context! { message, likes },
    )
}

/// POST /messages/{message_id}/delete — only the author may delete.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(message_id): Path<i64>,
) -> Result<Response, ViewError> {
    let me = viewer.require()?;
    let message = state.db.get_message(message_id).or_not_found()?;

    if message.user_id != me.id {
        warn!(
            "User {} tried to delete message {} owned by {}",
            me.id, message_id, message.user_id
        );
        viewer.session.flash(FlashLevel::Danger, "Access unauthorized.");
        return Err(ViewError::Unauthorized);
    }

    state.db.delete_message(message_id)?;
    info!("User {} deleted message {}", me.id, message_id);

    Ok(redirect(&format!("/users/{}", me.id)))
}

/// POST /messages/{message_id}/like — toggles the viewer's like.
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(message_id): Path<i64>,
) -> Result<Response, ViewError> {
    let me = viewer.require()?;
    let message = state.db.get_message(message_id).or_not_found()?;

    if message.user_id == me.id {
        viewer
            .session
            .flash(FlashLevel::Danger, "You can't like your own warble.");
        return Ok(redirect("/"));
    }

    state.db.toggle_like(me.id, message_id)?;

    Ok(redirect("/"))
}
