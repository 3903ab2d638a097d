//! Knowledge 모듈 - 비디오 분석 결과 저장 및 하이브리드 검색
//!
//! - Document: 분석 문서 해석
//! - Chunker: 문장 경계 트랜스크립트 분할
//! - Flatten: 문서 → 독립 검색 레코드
//! - SQLite: 레코드 저장 + FTS5 키워드 검색
//! - LanceDB: 벡터 검색 (코사인)
//! - Hybrid: 두 경로 동시 검색, Merge: 레코드 ID 기준 중복 제거

mod chunker;
mod document;
mod flatten;
mod hybrid;
mod ingest;
mod lance;
mod merge;
mod record;
mod session;
mod store;
mod vector;

// Re-exports
pub use chunker::{
    chunk_text, default_chunker, sentence_chunker, split_sentences, ChunkConfig, Chunker,
    SentenceChunker,
};
pub use document::{video_name_from_key, AnalysisDocument, Chapter};
pub use flatten::{flatten, EmbeddedChapter, EmbeddedDocument, EmbeddedText, TextChunk};
pub use hybrid::{HybridResults, HybridRetriever, VECTOR_OVERFETCH};
pub use ingest::{IngestReport, Ingestor};
pub use lance::LanceVectorStore;
pub use merge::merge;
pub use record::{FlatRecord, RecordSource, SearchMode, SearchResult, SearchType};
pub use session::{SessionStats, StoreSession};
pub use store::{get_data_dir, KnowledgeStore, StoreStats, VideoSummary};
pub use vector::{cosine_similarity, MemoryVectorStore, VectorEntry, VectorHit, VectorStore};
