//! HTTP 서버 - `POST /search`, `GET /healthz`
//!
//! 요청마다 저장소 세션을 새로 열고, 응답 후 닫습니다.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::config::AppConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::VideoSearchError;
use crate::knowledge::{HybridRetriever, StoreSession};
use crate::rerank::{RerankProvider, Reranker};
use crate::search::{validate_request, SearchRequest, SearchResponse, VideoSearch};

/// 서버 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub rerank: Arc<dyn RerankProvider>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// 라우터 구성
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/search", post(search_handler))
        .with_state(state)
}

/// 서버 실행
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Search API listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn search_handler(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;

    let query = validate_request(&request, state.config.top_k).map_err(error_response)?;

    let session =
        StoreSession::open_for_query(&state.config.data_dir, state.config.embedding_dimension)
            .await
            .map_err(error_response)?;

    let retriever = HybridRetriever::from_session(&session, state.embedder.clone());
    let search = VideoSearch::new(retriever, Reranker::new(state.rerank.clone()))
        .with_default_top_k(state.config.top_k);

    let response = search.search(&query).await.map_err(error_response)?;
    Ok(Json(response))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn error_response(err: VideoSearchError) -> ApiError {
    if err.is_client_error() {
        return bad_request(err.to_string());
    }

    tracing::error!("Search failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeStore;
    use crate::rerank::RerankScore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[derive(Default)]
    struct CountingRerank {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RerankProvider for CountingRerank {
        async fn rerank(&self, _: &str, _: &[String], _: usize) -> anyhow::Result<Vec<RerankScore>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn state(
        data_dir: &std::path::Path,
    ) -> (AppState, Arc<CountingEmbedder>, Arc<CountingRerank>) {
        let embedder = Arc::new(CountingEmbedder::default());
        let rerank = Arc::new(CountingRerank::default());
        let config = AppConfig {
            data_dir: data_dir.to_path_buf(),
            embedding_dimension: 4,
            ..AppConfig::default()
        };
        let state = AppState {
            config: Arc::new(config),
            embedder: embedder.clone(),
            rerank: rerank.clone(),
        };
        (state, embedder, rerank)
    }

    fn request(query: Option<&str>, mode: Option<&str>) -> SearchRequest {
        SearchRequest {
            query: query.map(str::to_string),
            mode: mode.map(str::to_string),
            top_k: None,
        }
    }

    /// 빈 레코드 저장소 생성 (수집 1회 이후 상태)
    fn init_store(data_dir: &std::path::Path) {
        KnowledgeStore::open(&StoreSession::records_db_path(data_dir)).unwrap();
    }

    #[tokio::test]
    async fn test_invalid_mode_is_400_without_calls() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        let (state, embedder, rerank) = state(&data_dir);

        let (status, Json(body)) =
            search_handler(State(state), Ok(Json(request(Some("cat"), Some("invalid")))))
                .await
                .unwrap_err();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("\"scene\" or \"transcripts\""));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rerank.calls.load(Ordering::SeqCst), 0);
        // 세션도 열지 않음
        assert!(!data_dir.exists());
    }

    #[tokio::test]
    async fn test_missing_query_is_400() {
        let temp_dir = TempDir::new().unwrap();
        let (state, _, _) = state(temp_dir.path());

        let (status, Json(body)) = search_handler(State(state), Ok(Json(request(None, Some("scene")))))
            .await
            .unwrap_err();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Missing query parameter");
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty_without_rerank() {
        let temp_dir = TempDir::new().unwrap();
        init_store(temp_dir.path());
        let (state, embedder, rerank) = state(temp_dir.path());

        let Json(response) =
            search_handler(State(state), Ok(Json(request(Some("cat"), Some("scene")))))
                .await
                .unwrap();

        assert!(response.frontend_results.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rerank.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_top_k_is_400() {
        let temp_dir = TempDir::new().unwrap();
        init_store(temp_dir.path());
        let (state, embedder, _) = state(temp_dir.path());

        let mut oversized = request(Some("cat"), Some("scene"));
        oversized.top_k = Some(usize::MAX);

        let (status, Json(body)) = search_handler(State(state), Ok(Json(oversized)))
            .await
            .unwrap_err();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("top_k"));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_uninitialized_store_is_500_without_writes() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("fresh");
        let (state, embedder, _) = state(&data_dir);

        let (status, Json(body)) =
            search_handler(State(state), Ok(Json(request(Some("cat"), Some("scene")))))
                .await
                .unwrap_err();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.error.contains("Store connectivity"));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(!data_dir.exists());
    }

    #[test]
    fn test_server_error_mapping() {
        let (status, Json(body)) = error_response(VideoSearchError::Rerank("timeout".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Rerank failed: timeout");
    }
}
