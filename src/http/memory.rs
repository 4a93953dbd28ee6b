//! `/memory`: a small in-process list of saved strings.
//!
//! The store lives in the registrant, and the router is built once per
//! factory, so saved entries survive listener reloads but not a restart.

use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    extract::State,
    response::{Html, Redirect},
    routing::get,
    Form, Router,
};
use serde::Deserialize;

use crate::http::routes::{escape_html, page};
use crate::http::server::Registrant;

/// Append-only store of saved strings.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    saved: Arc<RwLock<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, memory: String) {
        self.saved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(memory);
    }

    /// Every saved entry, oldest first.
    pub fn list(&self) -> Vec<String> {
        self.saved.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Mounts `GET /memory` and `POST /memory` over a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryRoutes {
    store: MemoryStore,
}

impl MemoryRoutes {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl Registrant for MemoryRoutes {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn register(&self, router: Router) -> Router {
        let memory = Router::new()
            .route("/memory", get(list_memories).post(post_memory))
            .with_state(self.store.clone());
        router.merge(memory)
    }
}

#[derive(Debug, Deserialize)]
struct MemoryForm {
    content: Option<String>,
}

async fn list_memories(State(store): State<MemoryStore>) -> Html<String> {
    let memories = store.list();
    tracing::debug!(count = memories.len(), "Listing memories");

    let items: String = memories
        .iter()
        .map(|memory| format!("  <li>{}</li>\n", escape_html(memory)))
        .collect();
    let body = format!(
        "<ul id=\"memories\">\n{items}</ul>\n\
         <form method=\"post\" action=\"/memory\">\n  \
         <input type=\"text\" name=\"content\">\n  \
         <button type=\"submit\">Remember</button>\n</form>"
    );
    page("echopilot: memory", &body)
}

async fn post_memory(State(store): State<MemoryStore>, Form(form): Form<MemoryForm>) -> Redirect {
    if let Some(content) = form.content {
        tracing::info!(memory = %content, "Memory created");
        store.create(content);
    }
    Redirect::to("/memory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn post(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/memory")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    async fn listing(app: Router) -> String {
        let response = app
            .oneshot(Request::builder().uri("/memory").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn post_saves_and_redirects_to_list() {
        let routes = MemoryRoutes::default();
        let app = routes.register(Router::new());

        let response = app.clone().oneshot(post("content=first")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/memory");

        app.clone().oneshot(post("content=%3Cb%3E")).await.unwrap();

        assert_eq!(routes.store().list(), vec!["first", "<b>"]);
        let text = listing(app).await;
        assert!(text.contains("<li>first</li>"));
        assert!(text.contains("<li>&lt;b&gt;</li>"));
    }

    #[tokio::test]
    async fn post_without_content_saves_nothing() {
        let routes = MemoryRoutes::default();
        let app = routes.register(Router::new());

        let response = app.oneshot(post("other=1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(routes.store().list().is_empty());
    }

    #[tokio::test]
    async fn routers_built_from_one_store_share_entries() {
        let store = MemoryStore::new();
        let first = MemoryRoutes::new(store.clone()).register(Router::new());
        let second = MemoryRoutes::new(store.clone()).register(Router::new());

        first.oneshot(post("content=kept")).await.unwrap();
        assert!(listing(second).await.contains("<li>kept</li>"));
    }
}
