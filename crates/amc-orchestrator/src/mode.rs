//! Intent → mode detection and the fixed per-mode sub-budget tables.

use amc_core::{Mode, SectionName};
use std::collections::BTreeMap;

/// Below this confidence the builder falls back to `Mode::General` and
/// records why.
pub const MODE_CONFIDENCE_THRESHOLD: f64 = 0.7;

struct ModeCue {
    mode: Mode,
    keywords: &'static [&'static str],
    confidence: f64,
}

const CUES: &[ModeCue] = &[
    ModeCue { mode: Mode::Debugging, keywords: &["debug", "bug", "error", "crash", "fix", "broken", "fails", "failing"], confidence: 0.9 },
    ModeCue { mode: Mode::Task, keywords: &["task", "implement", "build", "ship", "continue_work", "feature"], confidence: 0.85 },
    ModeCue { mode: Mode::Learning, keywords: &["learn", "explain", "understand", "teach", "how does"], confidence: 0.8 },
    ModeCue { mode: Mode::Exploration, keywords: &["explore", "onboarding", "repo_onboarding", "what is", "what this project", "overview"], confidence: 0.8 },
];

/// Returns the detected mode and a confidence in `[0, 1]`. An intent
/// matching no cue gets `Mode::General` with confidence `1.0` (general is
/// always a legitimate answer, never a fallback-from-failure in that case).
pub fn detect_mode(intent: &str) -> (Mode, f64) {
    let lowered = intent.to_lowercase();
    let mut best: Option<(Mode, f64)> = None;
    for cue in CUES {
        if cue.keywords.iter().any(|kw| lowered.contains(kw)) {
            match best {
                Some((_, existing_confidence)) if existing_confidence >= cue.confidence => {}
                _ => best = Some((cue.mode, cue.confidence)),
            }
        }
    }
    best.unwrap_or((Mode::General, 1.0))
}

/// Resolves `intent` to a mode, falling back to `General` with a recorded
/// reason when confidence is below threshold.
pub fn resolve_mode(intent: &str) -> (Mode, Option<String>) {
    let (mode, confidence) = detect_mode(intent);
    if confidence < MODE_CONFIDENCE_THRESHOLD {
        return (
            Mode::General,
            Some(format!("mode detection confidence {confidence:.2} below threshold for intent {intent:?}")),
        );
    }
    (mode, None)
}

/// Fraction of `max_tokens` each section gets under a given mode. Always
/// sums to `1.0` across the eight fixed sections.
fn weights(mode: Mode) -> BTreeMap<SectionName, f64> {
    use SectionName::*;
    let table: &[(SectionName, f64)] = match mode {
        Mode::Task => &[
            (StickyInvariants, 0.10), (Rules, 0.05), (RelevantDecisions, 0.15),
            (TaskState, 0.30), (Capsules, 0.10), (RecentWindow, 0.15),
            (RetrievedEvidence, 0.10), (Handoff, 0.05),
        ],
        Mode::Debugging => &[
            (StickyInvariants, 0.15), (Rules, 0.05), (RelevantDecisions, 0.10),
            (TaskState, 0.10), (Capsules, 0.05), (RecentWindow, 0.30),
            (RetrievedEvidence, 0.20), (Handoff, 0.05),
        ],
        Mode::Exploration => &[
            (StickyInvariants, 0.05), (Rules, 0.05), (RelevantDecisions, 0.15),
            (TaskState, 0.05), (Capsules, 0.10), (RecentWindow, 0.10),
            (RetrievedEvidence, 0.40), (Handoff, 0.10),
        ],
        Mode::Learning => &[
            (StickyInvariants, 0.05), (Rules, 0.05), (RelevantDecisions, 0.20),
            (TaskState, 0.05), (Capsules, 0.10), (RecentWindow, 0.10),
            (RetrievedEvidence, 0.40), (Handoff, 0.05),
        ],
        Mode::General => &[
            (StickyInvariants, 0.10), (Rules, 0.10), (RelevantDecisions, 0.15),
            (TaskState, 0.15), (Capsules, 0.10), (RecentWindow, 0.20),
            (RetrievedEvidence, 0.15), (Handoff, 0.05),
        ],
    };
    table.iter().copied().collect()
}

/// Per-section token sub-budgets for `max_tokens`, under `mode`. Rounds
/// down per section; leftover from rounding is folded into
/// `RetrievedEvidence` so the table never exceeds `max_tokens`.
pub fn sub_budgets(mode: Mode, max_tokens: u32) -> BTreeMap<SectionName, u32> {
    let weights = weights(mode);
    let mut budgets = BTreeMap::new();
    let mut allocated = 0u32;
    for name in SectionName::ALL {
        let weight = weights.get(&name).copied().unwrap_or(0.0);
        let tokens = (max_tokens as f64 * weight).floor() as u32;
        allocated += tokens;
        budgets.insert(name, tokens);
    }
    let leftover = max_tokens.saturating_sub(allocated);
    if leftover > 0 {
        *budgets.entry(SectionName::RetrievedEvidence).or_insert(0) += leftover;
    }
    budgets
}

/// Mode weight used to distribute a section's unspent leftover tokens
/// across the other sections (packing step 4).
pub fn weight_of(mode: Mode, name: SectionName) -> f64 {
    weights(mode).get(&name).copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debugging_keywords_detect_debugging_mode() {
        let (mode, confidence) = detect_mode("help me debug this crash");
        assert_eq!(mode, Mode::Debugging);
        assert!(confidence >= MODE_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn unknown_intent_falls_back_to_general_without_reason() {
        let (mode, reason) = resolve_mode("xyz_unmatched_intent");
        assert_eq!(mode, Mode::General);
        assert!(reason.is_none());
    }

    #[test]
    fn sub_budgets_never_exceed_max_tokens() {
        for mode in [Mode::Task, Mode::Debugging, Mode::Exploration, Mode::Learning, Mode::General] {
            let budgets = sub_budgets(mode, 65_000);
            let total: u32 = budgets.values().sum();
            assert!(total <= 65_000, "{mode:?} total {total} exceeds ceiling");
        }
    }
}
