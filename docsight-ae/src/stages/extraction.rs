//! Extraction stage
//!
//! Raw artifact text → structured intermediate form. Purely local and
//! deterministic: same bytes always produce the same document. Fails on an
//! unreadable artifact (fatal, no retry).

use std::collections::BTreeMap;

use crate::artifact::RawArtifact;
use crate::models::{ExtractedDocument, StagePayload};
use crate::stages::StageExecution;

/// Words shorter than this never become topics
const MIN_TOPIC_LEN: usize = 5;

/// Maximum number of topic terms extracted per document
const MAX_TOPICS: usize = 8;

/// Common words excluded from topic extraction
const STOPWORDS: &[&str] = &[
    "about", "after", "although", "because", "before", "being", "between", "could", "during",
    "however", "other", "should", "their", "there", "these", "those", "through", "under", "where",
    "which", "while", "would",
];

/// Run extraction on a loaded artifact
pub fn run(raw: &RawArtifact) -> StageExecution {
    let body = normalize_whitespace(&raw.text);
    if body.is_empty() {
        return StageExecution::failed(format!(
            "Artifact contains no extractable text: {}",
            raw.artifact_ref
        ));
    }

    let title = extract_title(&raw.text);
    let word_count = body.split_whitespace().count();
    let topics = extract_topics(&body);

    StageExecution::success(StagePayload::Extracted(ExtractedDocument {
        title,
        body,
        word_count,
        topics,
        content_hash: raw.content_hash.clone(),
    }))
}

/// First non-empty line, stripped of markdown heading markers, if it is
/// short enough to plausibly be a title
fn extract_title(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let title = line.trim_start_matches('#').trim();
    if title.is_empty() || title.len() > 120 {
        None
    } else {
        Some(title.to_string())
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Most frequent long words, alphabetically sorted (set semantics: topic
/// order never depends on text position)
fn extract_topics(body: &str) -> Vec<String> {
    let mut frequency: BTreeMap<String, usize> = BTreeMap::new();
    for word in body.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.len() >= MIN_TOPIC_LEN && !STOPWORDS.contains(&cleaned.as_str()) {
            *frequency.entry(cleaned).or_insert(0) += 1;
        }
    }

    // Pick by frequency (BTreeMap iteration makes ties alphabetical), then
    // emit in sorted order
    let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut topics: Vec<String> = ranked
        .into_iter()
        .take(MAX_TOPICS)
        .map(|(word, _)| word)
        .collect();
    topics.sort();
    topics
}
