use axum::{
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use minijinja::{Environment, UndefinedBehavior, Value, context};

use crate::error::ViewError;
use crate::middleware::Viewer;

/// Templates compiled into the binary, keyed by the name they are loaded under.
const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("home-anon.html", include_str!("../templates/home-anon.html")),
    ("users/signup.html", include_str!("../templates/users/signup.html")),
    ("users/login.html", include_str!("../templates/users/login.html")),
    ("users/index.html", include_str!("../templates/users/index.html")),
    ("users/detail.html", include_str!("../templates/users/detail.html")),
    ("users/show.html", include_str!("../templates/users/show.html")),
    ("users/following.html", include_str!("../templates/users/following.html")),
    ("users/followers.html", include_str!("../templates/users/followers.html")),
    ("users/likes.html", include_str!("../templates/users/likes.html")),
    ("users/edit.html", include_str!("../templates/users/edit.html")),
    ("messages/_list.html", include_str!("../templates/messages/_list.html")),
    ("messages/new.html", include_str!("../templates/messages/new.html")),
    ("messages/show.html", include_str!("../templates/messages/show.html")),
];

pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        // Pages render with partial contexts (e.g. `form.username` on a blank form)
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    /// Renders a full page. Every page sees the viewer as `current_user` and
    /// consumes the session's pending flashes.
    pub fn page(&self, viewer: &Viewer, name: &str, ctx: Value) -> Result<Response, ViewError> {
        let html = self.env.get_template(name)?.render(context! {
            current_user => &viewer.user,
            flashes => viewer.session.take_flashes(),
            ..ctx
        })?;
        Ok(Html(html).into_response())
    }
}

/// 302 to `location` with a short HTML body linking to it.
///
/// `location` is always an app-generated path, so it is not escaped.
pub fn redirect(location: &str) -> Response {
    let body = format!(
        "<!doctype html>\n\
         <html lang=en>\n\
         <title>Redirecting...</title>\n\
         <h1>Redirecting...</h1>\n\
         <p>You should be redirected automatically to the target URL: \
         <a href=\"{location}\">{location}</a>. If not, click the link.\n"
    );

    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
        Html(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionStore};
    use uuid::Uuid;
    use std::path::Path;
    use warbler_types::models::{DEFAULT_HEADER_IMAGE_URL, DEFAULT_IMAGE_URL, FlashLevel};

    #[test]
    fn all_templates_parse() {
        assert!(Templates::new().is_ok());
    }

    #[test]
    fn referenced_images_are_shipped() {
        let static_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../static");

        let mut urls = vec![DEFAULT_IMAGE_URL, DEFAULT_HEADER_IMAGE_URL];
        for &(_, source) in TEMPLATES {
            urls.extend(
                source
                    .split('"')
                    .filter(|attr| attr.starts_with("/static/images/")),
            );
        }

        for url in urls {
            let file = static_dir.join(url.trim_start_matches("/static/"));
            assert!(file.is_file(), "{url} is referenced but {} is missing", file.display());
        }
    }

    #[test]
    fn redirect_body_links_to_target() {
        let resp = redirect("/users/3");
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/users/3");
    }

    #[test]
    fn page_consumes_flashes() {
        let templates = Templates::new().unwrap();
        let viewer = Viewer {
            session: Session::new(Uuid::new_v4(), SessionStore::new()),
            user: None,
        };
        viewer.session.flash(FlashLevel::Info, "Welcome back");

        let resp = templates.page(&viewer, "home-anon.html", context! {}).unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(viewer.session.take_flashes().is_empty());
    }
}
