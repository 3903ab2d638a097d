//! 검색 결과 병합 및 중복 제거
//!
//! 벡터 결과 뒤에 텍스트 결과를 이어 붙인 뒤 레코드 ID로 중복을 제거합니다.
//! 같은 레코드가 양쪽에 있으면 나중 위치(텍스트 결과)의 사본을 남기고,
//! 살아남은 항목의 상대 순서는 유지합니다.

use std::collections::HashSet;

use super::record::SearchResult;

/// 두 결과 목록 병합
pub fn merge(vector: Vec<SearchResult>, text: Vec<SearchResult>) -> Vec<SearchResult> {
    let combined: Vec<SearchResult> = vector.into_iter().chain(text).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(combined.len());

    // 뒤에서부터 첫 등장만 남김
    let mut kept: Vec<SearchResult> = combined
        .into_iter()
        .rev()
        .filter(|r| seen.insert(r.id.clone()))
        .collect();
    kept.reverse();

    kept
}
