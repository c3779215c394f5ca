//! Combining per-segment tiers into one decision.

use chrono::Utc;

use super::decision::{ClassificationResult, Decision, Tier};

/// Combine segment classifications into a decision. Worst tier wins.
///
/// The rationale lists every non-Allow result, one per line, so the human
/// always sees which segment caused the pause or refusal. For an Allow
/// outcome it lists the allow reasons instead. No results at all is Ask.
pub fn aggregate(results: Vec<ClassificationResult>) -> Decision {
    let outcome = results
        .iter()
        .map(|r| r.tier)
        .max()
        .unwrap_or(Tier::Ask);

    let lines: Vec<String> = results
        .iter()
        .filter(|r| outcome == Tier::Allow || r.tier != Tier::Allow)
        .map(|r| format!("[{}] -> {}: {}", r.label(), r.tier.label(), r.reason))
        .collect();
    let rationale = if results.is_empty() {
        "empty command; defaulting to ask".to_string()
    } else {
        lines.join("\n")
    };

    Decision {
        outcome,
        breakdown: results,
        rationale,
        timestamp: Utc::now(),
    }
}
