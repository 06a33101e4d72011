//! In-memory document index
//!
//! Holds every extracted text fragment for the lifetime of the process and answers
//! owner-scoped lexical queries. Scoring is a word-overlap heuristic: a fragment scores
//! one point per query token (lower-cased, whitespace split, repeats counted) that
//! appears anywhere in its lower-cased text.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

pub type FragmentAttributes = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexFragment {
    pub text: String,
    pub owner_id: i64,
    pub source_id: i64,
    pub source_label: String,
    /// Position within the insert call that produced this fragment
    pub sequence_index: usize,
    pub locator: Option<String>,
    pub attributes: FragmentAttributes,
}

#[derive(Debug, Clone)]
struct StoredFragment {
    fragment: IndexFragment,
    lowered: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub fragments: Vec<IndexFragment>,
    /// Every candidate with a non-zero score, before `limit` is applied
    pub total_match_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source_id: i64,
    pub source_label: String,
    pub locator: Option<String>,
    pub fragment_count: usize,
    pub total_text_length: usize,
}

#[derive(Clone, Default)]
pub struct DocumentIndex {
    inner: Arc<RwLock<Vec<StoredFragment>>>,
}

impl DocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fragment per input element. Returns the number inserted.
    pub async fn insert(
        &self,
        fragments: Vec<(String, FragmentAttributes)>,
        owner_id: i64,
        source_id: i64,
        source_label: &str,
        locator: Option<&str>,
    ) -> usize {
        let stored: Vec<StoredFragment> = fragments
            .into_iter()
            .enumerate()
            .map(|(sequence_index, (text, attributes))| StoredFragment {
                lowered: text.to_lowercase(),
                fragment: IndexFragment {
                    text,
                    owner_id,
                    source_id,
                    source_label: source_label.to_string(),
                    sequence_index,
                    locator: locator.map(str::to_string),
                    attributes,
                },
            })
            .collect();

        let count = stored.len();
        let total = {
            let mut guard = self.inner.write().await;
            guard.extend(stored);
            guard.len()
        };

        tracing::debug!(owner_id, source_id, count, total, "Indexed fragments");
        count
    }

    pub async fn query(&self, text: &str, owner_id: Option<i64>, limit: usize) -> QueryResult {
        let lowered_query = text.to_lowercase();
        let tokens: Vec<&str> = lowered_query.split_whitespace().collect();

        let guard = self.inner.read().await;
        let mut scored: Vec<(usize, &StoredFragment)> = guard
            .iter()
            .filter(|stored| owner_id.map_or(true, |owner| stored.fragment.owner_id == owner))
            .filter_map(|stored| {
                let score = tokens
                    .iter()
                    .filter(|token| stored.lowered.contains(*token))
                    .count();
                (score > 0).then_some((score, stored))
            })
            .collect();

        // sort_by is stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        QueryResult {
            total_match_count: scored.len(),
            fragments: scored
                .into_iter()
                .take(limit)
                .map(|(_, stored)| stored.fragment.clone())
                .collect(),
        }
    }

    /// Per-source summary of an owner's fragments, in order of first appearance
    pub async fn list_by_owner(&self, owner_id: i64) -> Vec<SourceSummary> {
        let guard = self.inner.read().await;
        let mut summaries: Vec<SourceSummary> = Vec::new();

        for stored in guard.iter().filter(|s| s.fragment.owner_id == owner_id) {
            let fragment = &stored.fragment;
            let length = fragment.text.chars().count();
            match summaries.iter_mut().find(|s| s.source_id == fragment.source_id) {
                Some(summary) => {
                    summary.fragment_count += 1;
                    summary.total_text_length += length;
                }
                None => summaries.push(SourceSummary {
                    source_id: fragment.source_id,
                    source_label: fragment.source_label.clone(),
                    locator: fragment.locator.clone(),
                    fragment_count: 1,
                    total_text_length: length,
                }),
            }
        }

        summaries
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
