//! HTTP server publishing the talk list.
//!
//! Two routes:
//! - `GET /` answers `Hello world`
//! - `GET /talks` answers the contents of the talks file, re-read on every
//!   request so edits show up without a restart

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::de::IgnoredAny;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// Shared state for the request handlers.
#[derive(Debug, Clone)]
pub struct ServerState {
    talks_file: Arc<PathBuf>,
}

impl ServerState {
    /// State serving talks from `talks_file`.
    #[must_use]
    pub fn new(talks_file: impl Into<PathBuf>) -> Self {
        Self {
            talks_file: Arc::new(talks_file.into()),
        }
    }

    /// The file `GET /talks` serves.
    #[must_use]
    pub fn talks_file(&self) -> &Path {
        &self.talks_file
    }
}

/// Build the router. `cors` allows requests from any origin.
#[must_use]
pub fn router(state: ServerState, cors: bool) -> Router {
    let app = Router::new()
        .route("/", get(hello))
        .route("/talks", get(talks))
        .with_state(state);

    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Bind to the configured address and serve until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the address cannot be resolved or bound.
pub async fn serve(config: &ServerConfig) -> Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let state = ServerState::new(&config.talks_file);
    info!("Server listening on http://{}", listener.local_addr()?);
    info!("Serving talks from {}", state.talks_file().display());

    axum::serve(listener, router(state, config.cors))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn hello() -> &'static str {
    "Hello world"
}

async fn talks(State(state): State<ServerState>) -> std::result::Result<Response, TalksError> {
    let body = read_talks_file(state.talks_file()).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Read the talks file, checking that it is well-formed JSON.
///
/// The text is returned as-is; its shape is not checked.
///
/// # Errors
///
/// Returns [`Error::TalksFileRead`] or [`Error::TalksFileParse`].
pub async fn read_talks_file(path: &Path) -> Result<String> {
    let body = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::TalksFileRead {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_str::<IgnoredAny>(&body).map_err(|source| Error::TalksFileParse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(body)
}

struct TalksError(Error);

impl From<Error> for TalksError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for TalksError {
    fn into_response(self) -> Response {
        error!("Failed to serve talks: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to load talks: {}", self.0),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TWO_TALKS: &str = r#"[
  {"title": "Talk A", "subtitle": "a", "startTime": "2024-05-01T09:00:00Z", "endTime": "2024-05-01T09:30:00Z", "duration": 30},
  {"title": "Talk B", "subtitle": "b", "startTime": "2024-05-01T10:00:00Z", "endTime": "2024-05-01T11:00:00Z", "duration": 60}
]
"#;

    fn talks_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    async fn spawn_server(state: ServerState, cors: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state, cors)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_root_says_hello() {
        let base = spawn_server(ServerState::new("unused.json"), false).await;

        let response = reqwest::get(format!("{base}/")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "Hello world");
    }

    #[tokio::test]
    async fn test_talks_served_verbatim() {
        let file = talks_file(TWO_TALKS);
        let base = spawn_server(ServerState::new(file.path()), false).await;

        let response = reqwest::get(format!("{base}/talks")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(response.text().await.unwrap(), TWO_TALKS);
    }

    #[tokio::test]
    async fn test_talks_file_reread_each_request() {
        let file = talks_file("[]");
        let base = spawn_server(ServerState::new(file.path()), false).await;

        let first = reqwest::get(format!("{base}/talks")).await.unwrap();
        assert_eq!(first.text().await.unwrap(), "[]");

        std::fs::write(file.path(), TWO_TALKS).unwrap();
        let second = reqwest::get(format!("{base}/talks")).await.unwrap();
        assert_eq!(second.text().await.unwrap(), TWO_TALKS);
    }

    #[tokio::test]
    async fn test_missing_file_is_server_error() {
        crate::logging::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(ServerState::new(dir.path().join("missing.json")), false).await;

        let response = reqwest::get(format!("{base}/talks")).await.unwrap();
        assert_eq!(response.status(), 500);
        assert!(response.text().await.unwrap().contains("missing.json"));
    }

    #[tokio::test]
    async fn test_malformed_file_is_server_error() {
        let file = talks_file(r#"[{"title": "#);
        let base = spawn_server(ServerState::new(file.path()), false).await;

        let response = reqwest::get(format!("{base}/talks")).await.unwrap();
        assert_eq!(response.status(), 500);
    }

    #[tokio::test]
    async fn test_cors_header_when_enabled() {
        let file = talks_file("[]");
        let base = spawn_server(ServerState::new(file.path()), true).await;

        let response = reqwest::Client::new()
            .get(format!("{base}/talks"))
            .header("Origin", "http://example.test")
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }

    #[tokio::test]
    async fn test_served_talks_decode_with_client() {
        let file = talks_file(TWO_TALKS);
        let base = spawn_server(ServerState::new(file.path()), false).await;

        let talks = crate::client::RemoteTalksClient::new(base)
            .get_talks()
            .await
            .unwrap();
        let titles: Vec<&str> = talks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Talk A", "Talk B"]);
    }

    #[tokio::test]
    async fn test_read_talks_file_accepts_any_json() {
        let file = talks_file(r#"{"not": "a list"}"#);
        let body = read_talks_file(file.path()).await.unwrap();
        assert_eq!(body, r#"{"not": "a list"}"#);
    }

    #[tokio::test]
    async fn test_read_talks_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_talks_file(&dir.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, Error::TalksFileRead { .. }));

        let file = talks_file("not json");
        let err = read_talks_file(file.path()).await.unwrap_err();
        assert!(matches!(err, Error::TalksFileParse { .. }));
    }

    #[test]
    fn test_state_talks_file() {
        let state = ServerState::new("talks.json");
        assert_eq!(state.talks_file(), Path::new("talks.json"));
    }
}
