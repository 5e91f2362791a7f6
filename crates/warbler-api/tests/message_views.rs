mod common;

use axum::http::StatusCode;

use common::TestApp;
use warbler_api::session::{DEFAULT_IDLE_TTL, SessionStore};

#[tokio::test]
async fn add_message_redirects_and_persists() {
    let app = TestApp::new();
    let user = app.signup("testuser");
    let cookie = app.login_cookie(user.id);

    let resp = app.post_form("/messages/new", "text=Hello", Some(&cookie)).await;

    assert_eq!(resp.status, StatusCode::FOUND);
    assert_eq!(resp.location(), Some(format!("/users/{}", user.id).as_str()));

    let messages = app.state.db.messages_by_user(user.id, 100).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "Hello");
}

#[tokio::test]
async fn add_message_requires_login() {
    let app = TestApp::new();
    let user = app.signup("testuser");

    let resp = app.post_form("/messages/new", "text=Hello", None).await;

    assert_eq!(resp.status, StatusCode::FOUND);
    assert_eq!(resp.location(), Some("/"));
    assert!(app.state.db.messages_by_user(user.id, 100).unwrap().is_empty());
}

#[tokio::test]
async fn add_message_without_text_rerenders_form() {
    let app = TestApp::new();
    let user = app.signup("testuser");
    let cookie = app.login_cookie(user.id);

    let resp = app.post_form("/messages/new", "", Some(&cookie)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("Text is required."));

    let long = "a".repeat(141);
    let resp = app.post_form("/messages/new", &format!("text={long}"), Some(&cookie)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("limited to 140 characters"));

    assert!(app.state.db.messages_by_user(user.id, 100).unwrap().is_empty());
}

#[tokio::test]
async fn new_message_form_renders_for_logged_in_user() {
    let app = TestApp::new();
    let user = app.signup("testuser");
    let cookie = app.login_cookie(user.id);

    let resp = app.get("/messages/new", Some(&cookie)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains(r#"<textarea name="text""#));

    let resp = app.get("/messages/new", None).await;
    assert_eq!(resp.status, StatusCode::FOUND);
}

#[tokio::test]
async fn messages_show() {
    let app = TestApp::new();
    let user = app.signup("testuser");
    let message_id = app.add_message(user.id, "test message");

    let resp = app.get(&format!("/messages/{message_id}"), None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains(r#"<p class="single-message">test message</p>"#));
    assert!(resp.body.contains("@testuser"));
}

#[tokio::test]
async fn messages_show_unknown_is_404() {
    let app = TestApp::new();

    let resp = app.get("/messages/424242", None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn messages_destroy() {
    let app = TestApp::new();
    let user = app.signup("testuser");
    let cookie = app.login_cookie(user.id);
    let message_id = app.add_message(user.id, "delete test message");

    let resp = app
        .post_form(&format!("/messages/{message_id}/delete"), "", Some(&cookie))
        .await;

    assert_eq!(resp.status, StatusCode::FOUND);
    let profile = format!("/users/{}", user.id);
    assert!(resp.body.contains(&format!(r#"<a href="{profile}">{profile}</a>"#)));
    assert!(app.state.db.get_message(message_id).unwrap().is_none());
}

#[tokio::test]
async fn unauth_message_destroy() {
    let app = TestApp::new();
    let owner = app.signup("owner");
    let intruder = app.signup("intruder");
    let message_id = app.add_message(owner.id, "mine, not yours");

    // Someone else's message
    let cookie = app.login_cookie(intruder.id);
    let resp = app
        .post_form(&format!("/messages/{message_id}/delete"), "", Some(&cookie))
        .await;
    assert_eq!(resp.status, StatusCode::FOUND);
    assert!(resp.body.contains(r#"<a href="/">/</a>"#));

    // Anonymous
    let resp = app
        .post_form(&format!("/messages/{message_id}/delete"), "", None)
        .await;
    assert_eq!(resp.status, StatusCode::FOUND);
    assert_eq!(resp.location(), Some("/"));

    assert!(app.state.db.get_message(message_id).unwrap().is_some());

    // The refusal is flashed on the next page
    let resp = app.get("/", Some(&cookie)).await;
    assert!(resp.body.contains("Access unauthorized."));
}

#[tokio::test]
async fn like_toggles_on_others_messages_only() {
    let app = TestApp::new();
    let author = app.signup("author");
    let fan = app.signup("fan");
    let message_id = app.add_message(author.id, "like me");

    let fan_cookie = app.login_cookie(fan.id);
    let resp = app
        .post_form(&format!("/messages/{message_id}/like"), "", Some(&fan_cookie))
        .await;
    assert_eq!(resp.status, StatusCode::FOUND);
    assert_eq!(app.state.db.liked_message_ids(fan.id).unwrap(), vec![message_id]);

    app.post_form(&format!("/messages/{message_id}/like"), "", Some(&fan_cookie))
        .await;
    assert!(app.state.db.liked_message_ids(fan.id).unwrap().is_empty());

    let author_cookie = app.login_cookie(author.id);
    app.post_form(&format!("/messages/{message_id}/like"), "", Some(&author_cookie))
        .await;
    assert!(app.state.db.liked_message_ids(author.id).unwrap().is_empty());
}

#[tokio::test]
async fn homepage_shows_timeline_for_logged_in_user() {
    let app = TestApp::new();
    let me = app.signup("me");
    let friend = app.signup("friend");
    let stranger = app.signup("stranger");
    app.state.db.follow(me.id, friend.id).unwrap();
    app.add_message(friend.id, "from a friend");
    app.add_message(stranger.id, "from a stranger");

    let resp = app.get("/", Some(&app.login_cookie(me.id))).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("<p>from a friend</p>"));
    assert!(!resp.body.contains("from a stranger"));

    let resp = app.get("/", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("What's Happening?"));
}

#[tokio::test]
async fn anonymous_refusals_do_not_grow_session_store() {
    let app = TestApp::with_sessions(SessionStore::with_limits(DEFAULT_IDLE_TTL, 8));

    for _ in 0..8 {
        app.post_form("/messages/new", "text=hi", None).await;
    }
    let settled = app.state.sessions.len();
    assert!(settled <= 8);

    for _ in 0..200 {
        let resp = app.post_form("/messages/new", "text=hi", None).await;
        assert_eq!(resp.status, StatusCode::FOUND);
        assert_eq!(resp.location(), Some("/"));
    }
    assert_eq!(app.state.sessions.len(), settled);
}

#[tokio::test]
async fn repeat_visitor_reuses_one_session() {
    let app = TestApp::new();

    let resp = app.post_form("/messages/new", "text=hi", None).await;
    let cookie = resp.session_cookie().expect("session cookie set");

    for _ in 0..20 {
        let resp = app.post_form("/messages/new", "text=hi", Some(&cookie)).await;
        assert!(resp.session_cookie().is_none());
    }
    assert_eq!(app.state.sessions.len(), 1);
}
