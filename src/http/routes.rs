//! Web routes: echo pages, health and status.

use axum::{
    extract::Path,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::server::Registrant;
use crate::rpc::echo::EchoService;

/// Human-facing pages plus the health and status endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebRoutes;

impl Registrant for WebRoutes {
    fn name(&self) -> &'static str {
        "web"
    }

    fn register(&self, router: Router) -> Router {
        router
            .route("/", get(index))
            .route("/echo", axum::routing::post(post_echo))
            .route("/echo/{content}", get(get_echo))
            .route("/health", get(health))
            .route("/status", get(status))
    }
}

#[derive(Debug, Deserialize)]
struct EchoForm {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub name: String,
    pub version: String,
    pub status: String,
}

async fn index() -> Html<String> {
    page(
        "echopilot",
        r#"<form method="post" action="/echo">
  <input type="text" name="content" autofocus>
  <button type="submit">Echo</button>
</form>"#,
    )
}

async fn get_echo(Path(content): Path<String>) -> Html<String> {
    let body = format!(
        "<p id=\"echo\">{}</p>\n<a href=\"/\">Again</a>",
        escape_html(&content)
    );
    page("echopilot: echo", &body)
}

async fn post_echo(Form(form): Form<EchoForm>) -> Response {
    let echoed = EchoService.echo_string(form.content);
    // Nothing to show; `/echo/` has no route.
    if echoed.is_empty() {
        return Redirect::to("/").into_response();
    }
    match echo_path(&echoed) {
        Some(path) => Redirect::to(&path).into_response(),
        None => {
            tracing::warn!(content = %echoed, "Failed to build echo redirect");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "serving".to_string(),
    })
}

/// `/echo/{content}` with `content` percent-encoded as one path segment.
fn echo_path(content: &str) -> Option<String> {
    let mut url = Url::parse("http://localhost/echo/").ok()?;
    url.path_segments_mut().ok()?.pop_if_empty().push(content);
    Some(url.path().to_string())
}

pub(crate) fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{}</title></head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        body
    ))
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
