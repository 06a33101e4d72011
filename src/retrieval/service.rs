use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::llm::LLM;
use crate::retrieval::index::{DocumentIndex, IndexFragment};

pub const NO_DOCUMENTS_MESSAGE: &str = "No documents found for this patient.";
pub const GENERATOR_FALLBACK_NOTE: &str = "Answer generator unavailable - showing retrieved text";

const ANSWER_SYSTEM_PROMPT: &str = "You are a medical records assistant. Answer the question using only the \
provided record excerpts. If the excerpts do not contain the answer, say so. Never make diagnoses.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCitation {
    pub source_label: String,
    pub source_id: i64,
    pub locator: Option<String>,
    pub sequence_index: usize,
}

impl From<&IndexFragment> for SourceCitation {
    fn from(fragment: &IndexFragment) -> Self {
        Self {
            source_label: fragment.source_label.clone(),
            source_id: fragment.source_id,
            locator: fragment.locator.clone(),
            sequence_index: fragment.sequence_index,
        }
    }
}

/// Ranked fragments for a query, used as raw context
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub fragments: Vec<IndexFragment>,
    pub match_count: usize,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn sources(&self) -> Vec<SourceCitation> {
        self.fragments.iter().map(SourceCitation::from).collect()
    }

    pub fn joined_text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalAnswer {
    pub query: String,
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub match_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct RetrievalService {
    index: Arc<DocumentIndex>,
    generator: Option<LLM>,
}

impl RetrievalService {
    pub fn new(index: Arc<DocumentIndex>, generator: Option<LLM>) -> Self {
        Self { index, generator }
    }

    pub fn index(&self) -> &Arc<DocumentIndex> {
        &self.index
    }

    pub async fn retrieve(&self, query: &str, owner_id: i64, top_k: usize) -> Retrieval {
        let result = self.index.query(query, Some(owner_id), top_k).await;
        debug!(
            owner_id,
            top_k,
            returned = result.fragments.len(),
            matches = result.total_match_count,
            "Retrieved fragments"
        );
        Retrieval {
            fragments: result.fragments,
            match_count: result.total_match_count,
        }
    }

    /// Answer a question from an owner's indexed documents. Never fails: missing data
    /// yields the fixed no-documents answer, generator errors fall back to raw text.
    pub async fn answer(&self, query: &str, owner_id: i64, top_k: usize) -> RetrievalAnswer {
        let retrieval = self.retrieve(query, owner_id, top_k).await;

        if retrieval.is_empty() {
            return RetrievalAnswer {
                query: query.to_string(),
                answer: NO_DOCUMENTS_MESSAGE.to_string(),
                sources: Vec::new(),
                match_count: 0,
                note: None,
            };
        }

        let joined = retrieval.joined_text();
        let (answer, note) = match &self.generator {
            None => (joined, None),
            Some(llm) => {
                let prompt = format!("Question:\n{}\n\nRecord excerpts:\n{}", query, joined);
                match llm.complete(ANSWER_SYSTEM_PROMPT, &prompt).await {
                    Ok(text) if !text.trim().is_empty() => (text, None),
                    Ok(_) => {
                        warn!(owner_id, "Answer generator returned empty text, using retrieved text");
                        (joined, Some(GENERATOR_FALLBACK_NOTE.to_string()))
                    }
                    Err(e) => {
                        warn!(owner_id, error = %e, "Answer generator failed, using retrieved text");
                        (joined, Some(GENERATOR_FALLBACK_NOTE.to_string()))
                    }
                }
            }
        };

        RetrievalAnswer {
            query: query.to_string(),
            answer,
            sources: retrieval.sources(),
            match_count: retrieval.match_count,
            note,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::testing::ScriptedAdapter;
    use crate::retrieval::index::FragmentAttributes;

    async fn seeded_index() -> Arc<DocumentIndex> {
        let index = Arc::new(DocumentIndex::new());
        index
            .insert(
                vec![
                    ("Metformin 500mg twice daily".to_string(), FragmentAttributes::new()),
                    ("HbA1c 7.2% on metformin".to_string(), FragmentAttributes::new()),
                ],
                1,
                10,
                "labs.pdf",
                Some("https://bucket/labs.pdf"),
            )
            .await;
        index
    }

    #[tokio::test]
    async fn test_answer_without_generator_joins_text() {
        let service = RetrievalService::new(seeded_index().await, None);
        let answer = service.answer("metformin", 1, 5).await;

        assert_eq!(answer.answer, "Metformin 500mg twice daily\n\nHbA1c 7.2% on metformin");
        assert_eq!(answer.match_count, 2);
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].source_label, "labs.pdf");
        assert_eq!(answer.sources[1].sequence_index, 1);
        assert!(answer.note.is_none());
    }

    #[tokio::test]
    async fn test_answer_for_owner_without_documents() {
        let service = RetrievalService::new(seeded_index().await, None);
        let answer = service.answer("metformin", 999, 5).await;

        assert_eq!(answer.answer, NO_DOCUMENTS_MESSAGE);
        assert!(answer.sources.is_empty());
        assert_eq!(answer.match_count, 0);
    }

    #[tokio::test]
    async fn test_answer_uses_generator_output() {
        let adapter = Arc::new(ScriptedAdapter::replying("Patient takes metformin."));
        let llm = LLM::with_adapter(adapter.clone(), "test");
        let service = RetrievalService::new(seeded_index().await, Some(llm));

        let answer = service.answer("metformin dose", 1, 5).await;
        assert_eq!(answer.answer, "Patient takes metformin.");
        assert!(answer.note.is_none());

        let requests = adapter.requests.lock().unwrap();
        let prompt = &requests[0].messages[0].content;
        assert!(prompt.contains("metformin dose"));
        assert!(prompt.contains("HbA1c 7.2%"));
    }

    #[tokio::test]
    async fn test_generator_failure_falls_back() {
        let llm = LLM::with_adapter(Arc::new(ScriptedAdapter::failing("rate limited")), "test");
        let service = RetrievalService::new(seeded_index().await, Some(llm));

        let answer = service.answer("metformin", 1, 1).await;
        assert_eq!(answer.answer, "Metformin 500mg twice daily");
        assert_eq!(answer.note.as_deref(), Some(GENERATOR_FALLBACK_NOTE));
        assert_eq!(answer.match_count, 2);
    }
}
