//! 검색 서비스 - 요청 검증 → 하이브리드 검색 → 병합 → 리랭크

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_TOP_K, MAX_TOP_K};
use crate::error::{Result, VideoSearchError};
use crate::knowledge::{merge, HybridRetriever, SearchMode, SearchResult};
use crate::rerank::Reranker;

// ============================================================================
// Request / Response
// ============================================================================

/// 검색 요청 (외부 입력, 모든 필드 선택)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub mode: Option<String>,
    pub top_k: Option<usize>,
}

/// 검색 응답
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub frontend_results: Vec<SearchResult>,
}

/// 검증된 검색 요청
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub mode: SearchMode,
    pub top_k: usize,
}

/// 요청 검증 (외부 호출 전에 수행)
///
/// - 검색어 없음/공백 → `MissingQuery`
/// - 모드 없음/알 수 없음 → `InvalidMode`
/// - `top_k` 없음 → `default_top_k`, 최소 1
/// - `top_k`가 `MAX_TOP_K` 초과 → `InvalidTopK`
pub fn validate_request(request: &SearchRequest, default_top_k: usize) -> Result<SearchQuery> {
    let query = match request.query.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => return Err(VideoSearchError::MissingQuery),
    };

    let mode = match request.mode.as_deref() {
        Some(m) => m.parse::<SearchMode>()?,
        None => return Err(VideoSearchError::InvalidMode("<missing>".to_string())),
    };

    let top_k = match request.top_k {
        Some(requested) if requested > MAX_TOP_K => {
            return Err(VideoSearchError::InvalidTopK {
                requested,
                max: MAX_TOP_K,
            })
        }
        Some(requested) => requested,
        None => default_top_k.min(MAX_TOP_K),
    };

    Ok(SearchQuery {
        query,
        mode,
        top_k: top_k.max(1),
    })
}

// ============================================================================
// VideoSearch
// ============================================================================

/// 비디오 검색 서비스
pub struct VideoSearch {
    retriever: HybridRetriever,
    reranker: Reranker,
    default_top_k: usize,
}

impl VideoSearch {
    pub fn new(retriever: HybridRetriever, reranker: Reranker) -> Self {
        Self {
            retriever,
            reranker,
            default_top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k.clamp(1, MAX_TOP_K);
        self
    }

    /// 원시 요청 처리
    pub async fn handle(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let query = validate_request(request, self.default_top_k)?;
        self.search(&query).await
    }

    /// 검증된 요청 검색
    ///
    /// 병합 결과가 비어 있으면 리랭커를 호출하지 않고 빈 응답을 반환합니다.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let hybrid = self
            .retriever
            .search(&query.query, query.mode, query.top_k)
            .await?;

        let merged = merge(hybrid.vector, hybrid.text);
        if merged.is_empty() {
            tracing::info!("No results for '{}' ({})", query.query, query.mode);
            return Ok(SearchResponse::default());
        }

        let frontend_results = self.reranker.rerank(&query.query, merged).await?;
        Ok(SearchResponse { frontend_results })
    }
}

// ============================================================================
// Tests
// ============================================================================
