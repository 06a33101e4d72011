//! Specialist summary generation.
//!
//! Two retrievals feed every summary: a short demographic query and a larger
//! specialist (or custom) query over the owner's records. The combined context goes to
//! the answer generator; without one, or when it fails, the raw records context is
//! returned instead.

use serde::Serialize;
use tracing::{info, warn};

use crate::llm::LLM;
use crate::retrieval::{Retrieval, RetrievalService, SourceCitation};

pub const DEMOGRAPHIC_TOP_K: usize = 5;
pub const RECORDS_TOP_K: usize = 20;
pub const DEMOGRAPHIC_CONTEXT_CHARS: usize = 2000;
pub const RECORDS_CONTEXT_CHARS: usize = 6000;
pub const QUALITY_CHECK_MAX_TOKENS: u32 = 2000;

pub const NO_RECORDS_MESSAGE: &str = "No medical records found for this patient.";
pub const FALLBACK_NOTE: &str = "LLM not available - showing raw retrieved text";

const DEFAULT_SPECIALIST: &str = "general";

const SPECIALISTS: &[(&str, &str)] = &[
    (
        "dermatologist",
        "Extract information relevant to dermatology:\n\
         - Skin conditions, rashes, lesions\n\
         - Dermatological diagnoses\n\
         - Skin-related medications\n\
         - Allergies (especially skin-related)\n\
         - Recent skin procedures or treatments",
    ),
    (
        "ophthalmologist",
        "Extract information relevant to ophthalmology:\n\
         - Eye conditions, vision problems\n\
         - Eye-related diagnoses\n\
         - Eye medications\n\
         - Recent eye exams or procedures\n\
         - Vision-related symptoms",
    ),
    (
        "immunologist",
        "Extract information relevant to immunology:\n\
         - Allergies and allergic reactions\n\
         - Immune system conditions\n\
         - Immunosuppressant medications\n\
         - Recent infections\n\
         - Autoimmune conditions",
    ),
    (
        "neurologist",
        "Extract information relevant to neurology:\n\
         - Neurological symptoms\n\
         - Neurological diagnoses\n\
         - Neurological medications\n\
         - Headaches, seizures, cognitive issues\n\
         - Recent neurological exams",
    ),
    (
        "cardiologist",
        "Extract information relevant to cardiology:\n\
         - Heart conditions\n\
         - Cardiovascular medications\n\
         - Blood pressure readings\n\
         - Cardiac test results\n\
         - Heart-related symptoms",
    ),
    (
        "general",
        "Extract general medical information:\n\
         - Active medications\n\
         - Allergies\n\
         - Recent diagnoses\n\
         - Lab results\n\
         - Current symptoms",
    ),
];

const DEMOGRAPHIC_QUERY: &str = "Extract patient basic information: patient name, age or date of birth, \
gender, general health overview, chief complaint or reason for visit";

const RECORD_CHECKLIST: &str = "Include:\n\
- Active medications\n\
- Allergies\n\
- Recent diagnoses\n\
- Lab results\n\
- Imaging findings\n\
- Current symptoms\n\
- Relevant medical history";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a medical assistant creating patient health summaries. \
Always cite sources using [Source: filename] format. Never make diagnoses. Summarize and organize \
information clearly.";

const QUALITY_SYSTEM_PROMPT: &str =
    "You are a medical document verifier. Check that all statements are supported by sources.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarySection {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub summary: String,
    pub sections: Vec<SummarySection>,
    pub sources: Vec<SourceCitation>,
    pub specialist_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

pub fn available_specialists() -> Vec<&'static str> {
    SPECIALISTS.iter().map(|(name, _)| *name).collect()
}

/// Focus prompt for a specialist; unknown names get the general focus
pub fn specialist_focus(specialist_type: &str) -> &'static str {
    let wanted = specialist_type.trim().to_lowercase();
    SPECIALISTS
        .iter()
        .find(|(name, _)| *name == wanted)
        .or_else(|| SPECIALISTS.iter().find(|(name, _)| *name == DEFAULT_SPECIALIST))
        .map(|(_, focus)| *focus)
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct SummaryGenerator {
    retrieval: RetrievalService,
    generator: Option<LLM>,
    quality_check: bool,
}

impl SummaryGenerator {
    pub fn new(retrieval: RetrievalService, generator: Option<LLM>, quality_check: bool) -> Self {
        Self {
            retrieval,
            generator,
            quality_check,
        }
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Build a summary for an owner. `None` when the owner has no matching records.
    pub async fn generate(
        &self,
        owner_id: i64,
        specialist_type: &str,
        custom_prompt: Option<&str>,
    ) -> Option<Summary> {
        let custom_prompt = custom_prompt.map(str::trim).filter(|p| !p.is_empty());

        let demographics = self
            .retrieval
            .retrieve(DEMOGRAPHIC_QUERY, owner_id, DEMOGRAPHIC_TOP_K)
            .await;
        let records = self
            .retrieval
            .retrieve(&records_query(specialist_type, custom_prompt), owner_id, RECORDS_TOP_K)
            .await;

        if records.is_empty() {
            info!(owner_id, specialist_type, "No records matched summary query");
            return None;
        }

        let demographic_context = format_context(&demographics);
        let records_context = format_context(&records);
        let sources = records.sources();

        let Some(llm) = &self.generator else {
            warn!(owner_id, "No answer generator configured, returning raw records context");
            return Some(fallback_summary(records_context, sources, specialist_type));
        };

        let focus = match custom_prompt {
            Some(prompt) => prompt.to_string(),
            None => format!("{} visit", specialist_type),
        };
        let prompt = summary_prompt(
            &focus,
            specialist_type,
            truncate_chars(&demographic_context, DEMOGRAPHIC_CONTEXT_CHARS),
            truncate_chars(&records_context, RECORDS_CONTEXT_CHARS),
        );

        let mut text = match llm.complete(SUMMARY_SYSTEM_PROMPT, &prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(owner_id, "Answer generator returned an empty summary, using records context");
                return Some(fallback_summary(records_context, sources, specialist_type));
            }
            Err(e) => {
                warn!(owner_id, error = %e, "Summary generation failed, using records context");
                return Some(fallback_summary(records_context, sources, specialist_type));
            }
        };

        if self.quality_check {
            text = self.verify(llm, text, &records).await;
        }

        info!(owner_id, specialist_type, chars = text.chars().count(), "Generated summary");
        Some(Summary {
            sections: parse_sections(&text),
            summary: text,
            sources,
            specialist_type: specialist_type.to_string(),
            note: None,
        })
    }

    /// Ask the generator to flag unsupported statements. Keeps the draft on any failure.
    async fn verify(&self, llm: &LLM, summary: String, records: &Retrieval) -> String {
        let prompt = format!(
            "Review the following patient summary and verify that each statement is supported by \
             the source documents.\n\nIf any statement cannot be verified or contradicts the sources, \
             mark it with [VERIFICATION NEEDED].\nIf a statement is not in the sources, mark it with \
             [NOT IN SOURCES].\n\nSummary to verify:\n{}\n\nSource Documents:\n{}\n\nReturn the \
             verified summary with any necessary annotations.",
            summary,
            records.joined_text()
        );

        match llm
            .complete_with_limit(QUALITY_SYSTEM_PROMPT, &prompt, QUALITY_CHECK_MAX_TOKENS)
            .await
        {
            Ok(verified) if !verified.trim().is_empty() => verified,
            Ok(_) => summary,
            Err(e) => {
                warn!(error = %e, "Quality check failed, keeping unverified summary");
                summary
            }
        }
    }
}

fn records_query(specialist_type: &str, custom_prompt: Option<&str>) -> String {
    match custom_prompt {
        Some(prompt) => format!(
            "Extract all relevant medical information based on this focus:\n{}\n\n{}",
            prompt, RECORD_CHECKLIST
        ),
        None => format!(
            "Extract all relevant medical information for a {} visit:\n{}\n\n{}",
            specialist_type,
            specialist_focus(specialist_type),
            RECORD_CHECKLIST
        ),
    }
}

fn summary_prompt(focus: &str, specialist_type: &str, demographics: &str, records: &str) -> String {
    format!(
        "You are a medical assistant creating a concise patient health summary for a {focus}.\n\n\
         CRITICAL RULES:\n\
         1. Do NOT make diagnoses - only report what is in the source documents\n\
         2. Do NOT provide medical recommendations or treatment advice\n\
         3. Only include information explicitly stated in the source documents\n\
         4. Cite sources using format: [Source: filename] at the end of each fact\n\
         5. Keep summary concise and well-organized (1-2 pages maximum)\n\
         6. Focus ONLY on information relevant to {specialist_type}\n\
         7. Use clear section headers with ## (plain text, no bold or italic markers)\n\
         8. Use bullet points (•) for lists\n\
         9. If information is not available, state \"Not documented\" rather than guessing\n\
         10. Summarize and organize the information; do not copy raw text\n\n\
         Patient Basic Information:\n{demographics}\n\n\
         Patient Medical Records:\n{records}\n\n\
         Create a well-structured summary with these sections: ## Patient Overview (name, age or \
         date of birth, gender, a brief general health summary, chief complaint), ## Active \
         Medications, ## Allergies, ## Recent Diagnoses, ## Lab Results (if relevant to {focus}), \
         ## Imaging Findings (if relevant to {focus}), ## Current Symptoms, ## Relevant Medical \
         History. Include a [Source: filename] citation for each fact."
    )
}

fn fallback_summary(records_context: String, sources: Vec<SourceCitation>, specialist_type: &str) -> Summary {
    Summary {
        sections: vec![SummarySection {
            title: "raw_text".to_string(),
            content: records_context.clone(),
        }],
        summary: records_context,
        sources,
        specialist_type: specialist_type.to_string(),
        note: Some(FALLBACK_NOTE.to_string()),
    }
}

/// `[Source: label]` blocks separated by blank lines
pub fn format_context(retrieval: &Retrieval) -> String {
    retrieval
        .fragments
        .iter()
        .map(|f| format!("[Source: {}]\n{}", f.source_label, f.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Longest prefix of at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Split summary text into sections on `#` headers or short all-caps lines.
/// Lines before the first header go to an "introduction" section.
pub fn parse_sections(text: &str) -> Vec<SummarySection> {
    let mut sections: Vec<SummarySection> = Vec::new();
    let mut introduction: Vec<&str> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if is_section_header(line) {
            if let Some((title, content)) = current.take() {
                sections.push(SummarySection {
                    title,
                    content: content.join("\n"),
                });
            }
            current = Some((line.replace('#', "").trim().to_string(), Vec::new()));
        } else if let Some((_, content)) = current.as_mut() {
            content.push(line);
        } else {
            introduction.push(line);
        }
    }

    if let Some((title, content)) = current {
        sections.push(SummarySection {
            title,
            content: content.join("\n"),
        });
    }

    if !introduction.is_empty() {
        sections.insert(
            0,
            SummarySection {
                title: "introduction".to_string(),
                content: introduction.join("\n"),
            },
        );
    }
    sections
}

fn is_section_header(line: &str) -> bool {
    if line.starts_with('#') {
        return true;
    }
    let has_cased = line.chars().any(|c| c.is_uppercase() || c.is_lowercase());
    has_cased && !line.chars().any(char::is_lowercase) && line.chars().count() < 50
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::llm::provider::testing::ScriptedAdapter;
    use crate::retrieval::{DocumentIndex, FragmentAttributes};
    use crate::types::AppError;

    async fn seeded_retrieval() -> RetrievalService {
        let index = Arc::new(DocumentIndex::new());
        index
            .insert(
                vec![
                    ("Patient is a 54 year old male".to_string(), FragmentAttributes::new()),
                    ("Blood pressure 150/95, started lisinopril".to_string(), FragmentAttributes::new()),
                ],
                1,
                10,
                "visit.txt",
                None,
            )
            .await;
        RetrievalService::new(index, None)
    }

    #[test]
    fn test_specialist_focus_defaults_to_general() {
        assert!(specialist_focus("Cardiologist").contains("cardiology"));
        assert_eq!(specialist_focus("podiatrist"), specialist_focus("general"));
        assert_eq!(available_specialists().len(), 6);
        assert!(available_specialists().contains(&"immunologist"));
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_parse_sections() {
        let text = "Prepared for review\n\n## Active Medications\n• Lisinopril 10mg\n\nALLERGIES\n• None\n# Notes";
        let sections = parse_sections(text);
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["introduction", "Active Medications", "ALLERGIES", "Notes"]);
        assert_eq!(sections[0].content, "Prepared for review");
        assert_eq!(sections[1].content, "• Lisinopril 10mg");
        assert_eq!(sections[3].content, "");
    }

    #[test]
    fn test_long_caps_line_is_not_a_header() {
        let line = "THIS LINE IS WRITTEN IN CAPITALS BUT IS FAR TOO LONG TO BE A HEADER";
        assert!(!is_section_header(line));
        assert!(!is_section_header("120/80"));
    }

    #[tokio::test]
    async fn test_no_records_yields_none() {
        let generator = SummaryGenerator::new(seeded_retrieval().await, None, false);
        assert!(generator.generate(999, "general", None).await.is_none());
    }

    #[tokio::test]
    async fn test_fallback_without_generator() {
        let generator = SummaryGenerator::new(seeded_retrieval().await, None, false);
        let summary = generator.generate(1, "cardiologist", None).await.unwrap();

        assert!(summary.summary.starts_with("[Source: visit.txt]\n"));
        assert!(summary.summary.contains("lisinopril"));
        assert_eq!(summary.note.as_deref(), Some(FALLBACK_NOTE));
        assert_eq!(summary.sections[0].title, "raw_text");
        assert!(!summary.sources.is_empty());
    }

    #[tokio::test]
    async fn test_generated_summary_is_parsed() {
        let adapter = Arc::new(ScriptedAdapter::replying(
            "## Patient Overview\n• 54 year old male [Source: visit.txt]",
        ));
        let llm = LLM::with_adapter(adapter.clone(), "test");
        let retrieval = seeded_retrieval().await;
        retrieval
            .index()
            .insert(
                vec![("Hypertension follow-up in 3 months".to_string(), FragmentAttributes::new())],
                1,
                11,
                "plan.txt",
                None,
            )
            .await;
        let generator = SummaryGenerator::new(retrieval, Some(llm), false);

        let summary = generator
            .generate(1, "cardiologist", Some("hypertension follow-up"))
            .await
            .unwrap();
        assert!(summary.note.is_none());
        assert_eq!(summary.sections[0].title, "Patient Overview");

        let requests = adapter.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let prompt = &requests[0].messages[0].content;
        assert!(prompt.contains("hypertension follow-up"));
        assert!(prompt.contains("[Source: plan.txt]"));
    }

    #[tokio::test]
    async fn test_generator_error_falls_back() {
        let llm = LLM::with_adapter(Arc::new(ScriptedAdapter::failing("timeout")), "test");
        let generator = SummaryGenerator::new(seeded_retrieval().await, Some(llm), false);
        let summary = generator.generate(1, "general", None).await.unwrap();
        assert_eq!(summary.note.as_deref(), Some(FALLBACK_NOTE));
    }

    #[tokio::test]
    async fn test_quality_check_failure_keeps_summary() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            Ok("## Allergies\n• None documented".to_string()),
            Err(AppError::LLMApi("overloaded".to_string())),
        ]));
        let llm = LLM::with_adapter(adapter.clone(), "test");
        let generator = SummaryGenerator::new(seeded_retrieval().await, Some(llm), true);

        let summary = generator.generate(1, "immunologist", None).await.unwrap();
        assert_eq!(summary.summary, "## Allergies\n• None documented");
        assert_eq!(adapter.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_quality_check_replaces_summary() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            Ok("## Allergies\n• Penicillin".to_string()),
            Ok("## Allergies\n• Penicillin [NOT IN SOURCES]".to_string()),
        ]));
        let llm = LLM::with_adapter(adapter, "test");
        let generator = SummaryGenerator::new(seeded_retrieval().await, Some(llm), true);

        let summary = generator.generate(1, "immunologist", None).await.unwrap();
        assert!(summary.summary.ends_with("[NOT IN SOURCES]"));
    }
}
