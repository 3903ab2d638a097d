//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 청크/요약 텍스트와 검색어를 고정 차원 벡터로 변환합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env()?;
//! let embedding = embedder.embed("A cat jumps onto the sofa.").await?;
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

// ============================================================================
// Text Input
// ============================================================================

/// 임베딩 입력 텍스트
///
/// 분석 문서의 텍스트 필드는 문자열이거나 `{"text": ...}` 형태의 객체입니다.
/// 수집 경계에서 한 번만 해석하고, 이후에는 다시 검사하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextInput {
    /// 일반 문자열
    PlainText(String),
    /// 명시적 `text` 필드를 가진 구조화 입력
    StructuredText { text: String },
}

impl TextInput {
    /// JSON 값에서 해석
    ///
    /// - 문자열 → `PlainText`
    /// - 문자열 `text` 필드를 가진 객체 → `StructuredText`
    /// - `null` → 빈 `PlainText`
    /// - 그 외 → JSON 직렬화 문자열
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::PlainText(String::new()),
            Value::String(s) => Self::PlainText(s.clone()),
            Value::Object(map) => match map.get("text").and_then(Value::as_str) {
                Some(text) => Self::StructuredText {
                    text: text.to_string(),
                },
                None => Self::PlainText(value.to_string()),
            },
            other => Self::PlainText(other.to_string()),
        }
    }

    /// 텍스트 참조
    pub fn as_str(&self) -> &str {
        match self {
            Self::PlainText(text) => text,
            Self::StructuredText { text } => text,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl Default for TextInput {
    fn default() -> Self {
        Self::PlainText(String::new())
    }
}

impl From<&str> for TextInput {
    fn from(text: &str) -> Self {
        Self::PlainText(text.to_string())
    }
}

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
/// 빈 입력은 빈 벡터를 반환합니다 (검색 키로 사용할 수 없음).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩 (문서용)
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색어 임베딩 (기본 구현: `embed`)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 구조화 입력 임베딩
pub async fn embed_input(provider: &dyn EmbeddingProvider, input: &TextInput) -> Result<Vec<f32>> {
    provider.embed(input.as_str()).await
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001, MRL 차원 축소 지원)
/// ref: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";
const GEMINI_MODEL: &str = "models/gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 지원 차원 (MRL)
pub const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 분당 최대 요청 수 (무료 티어)
const REQUESTS_PER_MINUTE: usize = 60;
/// 연속 요청 간 최소 간격
const MIN_REQUEST_GAP: Duration = Duration::from_millis(1000);
/// 429/전송 실패 시 추가 시도 횟수
const MAX_RETRIES: u32 = 3;
/// 첫 재시도 대기 (이후 2배씩)
const BASE_BACKOFF: Duration = Duration::from_secs(2);

/// 요청 간격 조절기
///
/// 최근 1분 요청 시각을 보관하고, 최소 간격과 분당 한도 중 더 긴 대기를 적용합니다.
#[derive(Debug, Default)]
struct RequestPacer {
    recent: VecDeque<Instant>,
}

impl RequestPacer {
    const WINDOW: Duration = Duration::from_secs(60);

    /// 다음 요청까지 기다려야 하는 시간
    fn delay(&mut self, now: Instant) -> Duration {
        while self
            .recent
            .front()
            .is_some_and(|t| now.duration_since(*t) >= Self::WINDOW)
        {
            self.recent.pop_front();
        }

        let gap_wait = self
            .recent
            .back()
            .map(|last| MIN_REQUEST_GAP.saturating_sub(now.duration_since(*last)))
            .unwrap_or_default();

        let window_wait = if self.recent.len() >= REQUESTS_PER_MINUTE {
            self.recent
                .front()
                .map(|oldest| Self::WINDOW.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };

        gap_wait.max(window_wait)
    }

    async fn wait_turn(&mut self) {
        let wait = self.delay(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Pacing embedding request: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.recent.push_back(Instant::now());
    }
}

/// Gemini 태스크 타입
#[derive(Debug, Clone, Copy)]
enum TaskType {
    Document,
    Query,
}

impl TaskType {
    fn as_str(self) -> &'static str {
        match self {
            TaskType::Document => "RETRIEVAL_DOCUMENT",
            TaskType::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// 단일 요청 결과
enum Attempt {
    Done(Vec<f32>),
    /// 재시도 가능한 실패 (429, 전송 에러)
    Retry(anyhow::Error),
}

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    endpoint: String,
    /// 수집 경로 전용
    pacer: Arc<Mutex<RequestPacer>>,
}

impl GeminiEmbedding {
    /// 기본 차원(768)으로 생성
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be one of {:?}",
                dimension,
                SUPPORTED_DIMENSIONS
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension,
            endpoint: GEMINI_EMBED_URL.to_string(),
            pacer: Arc::new(Mutex::new(RequestPacer::default())),
        })
    }

    /// 환경변수 API 키 + 차원 지정
    pub fn from_env_with_dimension(dimension: usize) -> Result<Self> {
        Self::with_dimension(get_api_key()?, dimension)
    }

    /// 환경변수 API 키 + 기본 차원
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_dimension(DEFAULT_DIMENSION)
    }

    fn request_body<'a>(&self, text: &'a str, task_type: TaskType) -> EmbedRequest<'a> {
        EmbedRequest {
            model: GEMINI_MODEL,
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
            task_type: task_type.as_str(),
            output_dimensionality: self.dimension,
        }
    }

    /// 문서 임베딩 (수집 경로)
    ///
    /// 요청 간격을 조절하고, 429/전송 실패는 지수 백오프로 최대 `MAX_RETRIES`회 재시도합니다.
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트는 빈 벡터 (네트워크 호출 없음)
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let body = self.request_body(text, TaskType::Document);

        let mut attempt = 0;
        loop {
            self.pacer.lock().await.wait_turn().await;

            match self.send_once(&body).await? {
                Attempt::Done(values) => return Ok(values),
                Attempt::Retry(err) if attempt < MAX_RETRIES => {
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "{:#}; retrying in {:?} ({}/{})",
                        err,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                }
                Attempt::Retry(err) => {
                    return Err(err.context(format!("Embedding failed after {} retries", MAX_RETRIES)))
                }
            }
        }
    }

    /// 검색어 임베딩 (질의 경로)
    ///
    /// 1회만 시도하며 간격 조절기를 거치지 않습니다. 요청 사이에 공유 상태가 없습니다.
    async fn embed_search_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        match self.send_once(&self.request_body(text, TaskType::Query)).await? {
            Attempt::Done(values) => Ok(values),
            Attempt::Retry(err) => Err(err),
        }
    }

    /// 요청 1회 전송
    ///
    /// 재시도 불가능한 API 에러는 `Err`, 429와 전송 실패는 `Attempt::Retry`로 돌려줍니다.
    async fn send_once(&self, body: &EmbedRequest<'_>) -> Result<Attempt> {
        let response = match self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return Ok(Attempt::Retry(anyhow::anyhow!("Embedding request failed: {}", e))),
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read embedding response")?;

        if status.is_success() {
            return parse_embedding_response(&text, self.dimension).map(Attempt::Done);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::Retry(anyhow::anyhow!("Rate limit exceeded (429)")));
        }

        match serde_json::from_str::<GeminiError>(&text) {
            Ok(api) => anyhow::bail!("Gemini API error ({}): {}", api.error.status, api.error.message),
            Err(_) => anyhow::bail!("Gemini API error ({}): {}", status, text),
        }
    }
}

/// embedContent 요청 본문
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    task_type: &'a str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// 응답 본문 파싱 및 차원 검증
fn parse_embedding_response(body: &str, dimension: usize) -> Result<Vec<f32>> {
    let response: EmbedResponse =
        serde_json::from_str(body).context("Failed to parse embedding response")?;
    let values = response.embedding.values;

    if values.len() != dimension {
        anyhow::bail!(
            "Malformed embedding: expected {} dimensions, got {}",
            dimension,
            values.len()
        );
    }

    Ok(values)
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_document(text).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_search_query(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // embedContent는 단건 API
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding {}/{}", i + 1, texts.len());
            results.push(self.embed_document(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

/// 임베딩 프로바이더 생성 (Gemini API)
pub fn create_embedder(dimension: usize) -> Result<GeminiEmbedding> {
    let embedder = GeminiEmbedding::from_env_with_dimension(dimension)?;
    tracing::info!(
        "Using Gemini API embedding (dimension: {})",
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================
