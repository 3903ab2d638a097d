//! vidsearch-rag - 비디오 분석 결과 하이브리드 검색
//!
//! 비디오 분석 문서(요약, 챕터, 트랜스크립트)를 검색 레코드로 평탄화하고,
//! LanceDB 벡터 검색 + SQLite FTS5 키워드 검색 결과를 병합한 뒤
//! 리랭크 서비스로 최종 순위를 매깁니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod rerank;
pub mod search;
pub mod server;

// Re-exports
pub use config::{AppConfig, RetryPolicy};
pub use embedding::{
    create_embedder, embed_input, get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding,
    TextInput,
};
pub use error::{Result, VideoSearchError};
pub use knowledge::{
    default_chunker, flatten, get_data_dir, merge, sentence_chunker, AnalysisDocument,
    ChunkConfig, Chunker, FlatRecord, HybridResults, HybridRetriever, IngestReport, Ingestor,
    KnowledgeStore, LanceVectorStore, MemoryVectorStore, SearchMode, SearchResult, SearchType,
    StoreSession, VectorStore,
};
pub use rerank::{CohereRerank, RerankProvider, RerankScore, Reranker, RELEVANCE_FLOOR};
pub use search::{validate_request, SearchRequest, SearchResponse, VideoSearch};
