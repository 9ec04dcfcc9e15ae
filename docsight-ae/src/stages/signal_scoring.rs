//! Signal scoring stage
//!
//! Deterministic local computation over the committed analysis report.
//! Weights are fixed; every score is clamped to 4 fractional digits so
//! repeated runs are byte-identical.

use crate::canonical::round4;
use crate::models::{AnalysisReport, SignalScores, StagePayload};
use crate::stages::StageExecution;

pub fn run(report: &AnalysisReport) -> StageExecution {
    let scores = &report.scores;
    if !in_range(scores.clarity) || !in_range(scores.evidence) || !in_range(scores.consistency) {
        return StageExecution::failed(format!(
            "Analysis scores out of range: clarity={} evidence={} consistency={}",
            scores.clarity, scores.evidence, scores.consistency
        ));
    }

    let claim_factor = (report.claims.len().min(10) as f64) / 10.0;

    let credibility = round4(0.5 * scores.evidence + 0.3 * scores.consistency + 0.2 * scores.clarity);
    let rigor = round4(0.6 * scores.evidence + 0.4 * scores.consistency);
    let transparency = round4(0.5 * scores.clarity + 0.3 * scores.consistency + 0.2 * claim_factor);
    let composite = round4(0.4 * credibility + 0.35 * rigor + 0.25 * transparency);

    StageExecution::success(StagePayload::Signals(SignalScores {
        credibility,
        rigor,
        transparency,
        composite,
    }))
}

fn in_range(score: f64) -> bool {
    (0.0..=1.0).contains(&score)
}
