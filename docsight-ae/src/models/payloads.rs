//! Stage payload contracts
//!
//! Each stage's output is a distinct tagged variant with an explicit schema,
//! so the coordinator can validate shape without runtime type inspection.
//! All payloads serialize to JSON for the deterministic cache and the
//! execution snapshot.

use serde::{Deserialize, Serialize};

// ============================================================================
// Extraction
// ============================================================================

/// Structured intermediate form produced from the raw artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// First heading line, if the document has one
    pub title: Option<String>,
    /// Full body text, whitespace-normalized
    pub body: String,
    pub word_count: usize,
    /// Salient terms, sorted and deduplicated (set semantics)
    pub topics: Vec<String>,
    /// SHA-256 of the raw artifact bytes
    pub content_hash: String,
}

// ============================================================================
// Primary Analysis
// ============================================================================

/// Per-dimension scores from the inference service, fixed precision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisScores {
    pub clarity: f64,
    pub evidence: f64,
    pub consistency: f64,
}

/// A single claim identified by the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub salience: f64,
}

/// Structured output of the deterministic inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: String,
    pub claims: Vec<Claim>,
    pub scores: AnalysisScores,
}

// ============================================================================
// Signal Scoring
// ============================================================================

/// Deterministic signal scores derived from the committed analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    pub credibility: f64,
    pub rigor: f64,
    pub transparency: f64,
    /// Weighted aggregate of the above
    pub composite: f64,
}

// ============================================================================
// Enrichment
// ============================================================================

/// One ranked web search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSnippet {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub rank: u32,
}

/// Web enrichment output; `degraded` marks a Fallback substitute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebEvidence {
    pub results: Vec<WebSnippet>,
    pub degraded: bool,
}

impl WebEvidence {
    /// Neutral payload used when the web gateway is unavailable
    pub fn degraded() -> Self {
        Self {
            results: Vec::new(),
            degraded: true,
        }
    }
}

/// One social post snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub author: String,
    pub text: String,
    pub engagement: u64,
}

/// Social enrichment output; `degraded` marks a Fallback substitute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialEvidence {
    pub posts: Vec<SocialPost>,
    pub degraded: bool,
}

impl SocialEvidence {
    /// Neutral payload used when the social gateway is unavailable
    pub fn degraded() -> Self {
        Self {
            posts: Vec::new(),
            degraded: true,
        }
    }
}

// ============================================================================
// Knowledge Retrieval
// ============================================================================

/// One similarity store match with a stable identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub id: String,
    pub score: f64,
}

/// Ranked matches, ordered by (score desc, id asc)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMatches {
    pub matches: Vec<SimilarMatch>,
}

// ============================================================================
// Persistence
// ============================================================================

/// Receipt returned by the persistence stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistReceipt {
    pub overall_score: f64,
    /// True when the record already existed (idempotent re-run)
    pub duplicate: bool,
}

/// Final composite record written to the durable store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub execution_id: uuid::Uuid,
    pub artifact_ref: String,
    pub overall_score: f64,
    pub signals: SignalScores,
    pub summary: String,
    pub web_evidence: WebEvidence,
    pub social_evidence: SocialEvidence,
    pub related: KnowledgeMatches,
}

// ============================================================================
// Tagged payload
// ============================================================================

/// Tagged union of all stage outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    Extracted(ExtractedDocument),
    Analysis(AnalysisReport),
    Signals(SignalScores),
    WebEvidence(WebEvidence),
    SocialEvidence(SocialEvidence),
    Knowledge(KnowledgeMatches),
    Persisted(PersistReceipt),
}

impl StagePayload {
    pub fn as_extracted(&self) -> Option<&ExtractedDocument> {
        match self {
            StagePayload::Extracted(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_analysis(&self) -> Option<&AnalysisReport> {
        match self {
            StagePayload::Analysis(report) => Some(report),
            _ => None,
        }
    }

    pub fn as_signals(&self) -> Option<&SignalScores> {
        match self {
            StagePayload::Signals(scores) => Some(scores),
            _ => None,
        }
    }

    pub fn as_web_evidence(&self) -> Option<&WebEvidence> {
        match self {
            StagePayload::WebEvidence(evidence) => Some(evidence),
            _ => None,
        }
    }

    pub fn as_social_evidence(&self) -> Option<&SocialEvidence> {
        match self {
            StagePayload::SocialEvidence(evidence) => Some(evidence),
            _ => None,
        }
    }

    pub fn as_knowledge(&self) -> Option<&KnowledgeMatches> {
        match self {
            StagePayload::Knowledge(matches) => Some(matches),
            _ => None,
        }
    }

    pub fn as_persisted(&self) -> Option<&PersistReceipt> {
        match self {
            StagePayload::Persisted(receipt) => Some(receipt),
            _ => None,
        }
    }
}
