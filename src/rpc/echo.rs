//! Echo service.
//!
//! Served as connect-style JSON RPC: `POST /echo.v1.EchoService/<Method>`
//! with a JSON body, answered with a JSON body of the same shape.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::http::server::Registrant;

/// RPC path of the string echo method.
pub const ECHO_STRING_PATH: &str = "/echo.v1.EchoService/EchoString";

/// RPC path of the integer echo method.
pub const ECHO_INT_PATH: &str = "/echo.v1.EchoService/EchoInt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoStringMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoIntMessage {
    #[serde(default)]
    pub content: i32,
}

/// Returns whatever it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoService;

impl EchoService {
    pub fn echo_string(&self, content: String) -> String {
        content
    }

    pub fn echo_int(&self, content: i32) -> i32 {
        content
    }
}

impl Registrant for EchoService {
    fn name(&self) -> &'static str {
        "echo.v1.EchoService"
    }

    fn register(&self, router: Router) -> Router {
        let rpc = Router::new()
            .route(ECHO_STRING_PATH, post(echo_string))
            .route(ECHO_INT_PATH, post(echo_int))
            .with_state(*self);
        router.merge(rpc)
    }
}

async fn echo_string(
    State(service): State<EchoService>,
    Json(request): Json<EchoStringMessage>,
) -> Json<EchoStringMessage> {
    tracing::debug!(len = request.content.len(), "EchoString");
    Json(EchoStringMessage {
        content: service.echo_string(request.content),
    })
}

async fn echo_int(
    State(service): State<EchoService>,
    Json(request): Json<EchoIntMessage>,
) -> Json<EchoIntMessage> {
    tracing::debug!(content = request.content, "EchoInt");
    Json(EchoIntMessage {
        content: service.echo_int(request.content),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn call(path: &str, body: &'static str) -> (StatusCode, String) {
        let app = EchoService.register(Router::new());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn echo_string_returns_content() {
        let (status, body) = call(ECHO_STRING_PATH, r#"{"content":"hello"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"content":"hello"}"#);
    }

    #[tokio::test]
    async fn echo_int_returns_content() {
        let (status, body) = call(ECHO_INT_PATH, r#"{"content":-42}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"content":-42}"#);
    }

    #[tokio::test]
    async fn wrong_type_is_rejected() {
        let (status, _) = call(ECHO_INT_PATH, r#"{"content":"nope"}"#).await;
        assert!(status.is_client_error());
    }
}
