//! 리랭크 모듈 - 크로스 인코더 관련도 재정렬
//!
//! 병합된 후보 전체를 리랭크 서비스에 한 번 보내고,
//! 관련도 내림차순 정렬 → 레코드 ID 중복 제거 → 하한 필터를 적용합니다.
//!
//! ref: https://docs.cohere.com/reference/rerank

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VideoSearchError};
use crate::knowledge::SearchResult;

/// 관련도 하한 (이 값 미만은 제외, 경계값은 유지)
pub const RELEVANCE_FLOOR: f32 = 0.05;

const COHERE_RERANK_URL: &str = "https://api.cohere.com/v2/rerank";

/// 기본 리랭크 모델
pub const DEFAULT_RERANK_MODEL: &str = "rerank-v3.5";

// ============================================================================
// RerankProvider Trait
// ============================================================================

/// 리랭크 점수 (입력 문서 인덱스 + 관련도)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub relevance_score: f32,
}

/// 리랭크 프로바이더 트레이트
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// 문서 목록을 검색어 기준으로 채점
    ///
    /// 반환 순서는 보장하지 않습니다.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> anyhow::Result<Vec<RerankScore>>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Cohere Rerank
// ============================================================================

/// Cohere Rerank API 구현체 (재시도 없음)
#[derive(Debug)]
pub struct CohereRerank {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

impl CohereRerank {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        Self::with_model(api_key, DEFAULT_RERANK_MODEL)
    }

    pub fn with_model(api_key: String, model: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model: model.to_string(),
            client,
        })
    }

    /// 환경변수 `COHERE_API_KEY`에서 생성
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("COHERE_API_KEY") {
            Ok(key) if !key.is_empty() => Self::new(key),
            _ => anyhow::bail!(
                "Rerank API key not found. Set COHERE_API_KEY environment variable.\n\
                 Get your API key at: https://dashboard.cohere.com/api-keys"
            ),
        }
    }
}

#[async_trait]
impl RerankProvider for CohereRerank {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> anyhow::Result<Vec<RerankScore>> {
        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n,
        };

        let response = self
            .client
            .post(COHERE_RERANK_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send rerank request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read rerank response")?;

        if !status.is_success() {
            anyhow::bail!("Rerank API error ({}): {}", status, body);
        }

        let parsed: RerankResponse =
            serde_json::from_str(&body).context("Failed to parse rerank response")?;
        Ok(parsed.results)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Reranker
// ============================================================================

/// 검색 결과 리랭커
pub struct Reranker {
    provider: Arc<dyn RerankProvider>,
}

impl Reranker {
    pub fn new(provider: Arc<dyn RerankProvider>) -> Self {
        Self { provider }
    }

    /// 후보 재정렬
    ///
    /// 후보가 비어 있으면 프로바이더를 호출하지 않습니다.
    /// 프로바이더가 범위를 벗어난 인덱스를 반환하면 `Rerank` 에러입니다.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>> {
        if candidates.is_empty() {
            tracing::debug!("No candidates to rerank");
            return Ok(vec![]);
        }

        let documents: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let scores = self
            .provider
            .rerank(query, &documents, documents.len())
            .await
            .map_err(VideoSearchError::rerank)?;

        let mut scored = Vec::with_capacity(scores.len());
        for score in scores {
            let candidate = candidates.get(score.index).ok_or_else(|| {
                VideoSearchError::Rerank(format!(
                    "index {} out of range for {} candidates",
                    score.index,
                    candidates.len()
                ))
            })?;

            let mut result = candidate.clone();
            result.relevance_score = Some(score.relevance_score);
            scored.push(result);
        }

        scored.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut seen = HashSet::new();
        let total = scored.len();
        let results: Vec<SearchResult> = scored
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .filter(|r| r.relevance_score.unwrap_or(0.0) >= RELEVANCE_FLOOR)
            .collect();

        tracing::info!(
            "Reranked {} candidate(s) with {}: kept {}",
            total,
            self.provider.name(),
            results.len()
        );

        Ok(results)
    }
}

// ============================================================================
// Tests
// ============================================================================
