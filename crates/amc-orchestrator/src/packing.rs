//! Deterministic packing: per-section greedy admission under a sub-budget,
//! leftover-token donation proportional to mode weights, then a hard
//! ceiling eviction pass if the donated total still overshoots.

use amc_core::{AcbItem, Mode, SectionName};
use std::collections::BTreeMap;

use crate::mode::weight_of;

struct SectionState {
    name: SectionName,
    admitted: Vec<AcbItem>,
    waiting: Vec<AcbItem>,
    budget: u32,
}

fn admit_into(budget: u32, candidates: &mut Vec<AcbItem>) -> (Vec<AcbItem>, u32) {
    let mut admitted = Vec::new();
    let mut spent = 0u32;
    let mut remaining = Vec::new();
    for item in candidates.drain(..) {
        if spent.saturating_add(item.token_est) <= budget {
            spent += item.token_est;
            admitted.push(item);
        } else {
            remaining.push(item);
        }
    }
    *candidates = remaining;
    (admitted, budget.saturating_sub(spent))
}

/// Runs packing steps 3-5 over candidates already sorted by rank within
/// each section (caller's responsibility — §4.5's rank order for chunks,
/// scope precedence for decisions, priority/ts for tasks).
pub fn pack(
    mode: Mode,
    max_tokens: u32,
    mut candidates_by_section: BTreeMap<SectionName, Vec<AcbItem>>,
    budgets: &BTreeMap<SectionName, u32>,
) -> (Vec<(SectionName, Vec<AcbItem>)>, bool) {
    let mut sections: Vec<SectionState> = SectionName::ALL
        .into_iter()
        .map(|name| {
            let mut waiting = candidates_by_section.remove(&name).unwrap_or_default();
            let budget = budgets.get(&name).copied().unwrap_or(0);
            let (admitted, unspent) = admit_into(budget, &mut waiting);
            SectionState { name, admitted, waiting, budget: unspent }
        })
        .collect();

    // Step 4: donate leftover tokens proportional to mode weights, to
    // sections that still have unadmitted candidates.
    let total_leftover: u32 = sections.iter().map(|s| s.budget).sum();
    if total_leftover > 0 {
        let weight_sum: f64 = sections
            .iter()
            .filter(|s| !s.waiting.is_empty())
            .map(|s| weight_of(mode, s.name).max(0.0001))
            .sum();
        if weight_sum > 0.0 {
            for section in sections.iter_mut().filter(|s| !s.waiting.is_empty()) {
                let share = (total_leftover as f64 * weight_of(mode, section.name).max(0.0001) / weight_sum) as u32;
                let (more, _unspent) = admit_into(share, &mut section.waiting);
                section.admitted.extend(more);
            }
        }
    }

    // Step 5: hard ceiling. Evict lowest-priority non-sticky items first.
    let total_used: u32 = sections.iter().map(|s| s.admitted.iter().map(|i| i.token_est).sum::<u32>()).sum();
    let sticky_total: u32 = sections
        .iter()
        .find(|s| s.name == SectionName::StickyInvariants)
        .map(|s| s.admitted.iter().map(|i| i.token_est).sum())
        .unwrap_or(0);

    let budget_exceeded = sticky_total > max_tokens;
    if !budget_exceeded && total_used > max_tokens {
        evict_to_ceiling(&mut sections, max_tokens);
    }

    let result = sections.into_iter().map(|s| (s.name, s.admitted)).collect();
    (result, budget_exceeded)
}

fn evict_to_ceiling(sections: &mut [SectionState], max_tokens: u32) {
    loop {
        let total: u32 = sections.iter().map(|s| s.admitted.iter().map(|i| i.token_est).sum::<u32>()).sum();
        if total <= max_tokens {
            return;
        }
        let mut worst: Option<(usize, usize, u32)> = None;
        for (section_idx, section) in sections.iter().enumerate() {
            if section.name == SectionName::StickyInvariants {
                continue;
            }
            for (item_idx, item) in section.admitted.iter().enumerate() {
                if worst.map(|(_, _, p)| item.priority < p).unwrap_or(true) {
                    worst = Some((section_idx, item_idx, item.priority));
                }
            }
        }
        match worst {
            Some((section_idx, item_idx, _)) => {
                sections[section_idx].admitted.remove(item_idx);
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::SourceKind;

    fn item(text: &str, tokens: u32, priority: u32) -> AcbItem {
        AcbItem { text: text.to_string(), token_est: tokens, refs: vec!["e1".to_string()], source_kind: SourceKind::Chunk, priority }
    }

    #[test]
    fn within_budget_everything_is_admitted() {
        let mut candidates = BTreeMap::new();
        candidates.insert(SectionName::RecentWindow, vec![item("a", 10, 50), item("b", 10, 40)]);
        let mut budgets = BTreeMap::new();
        for name in SectionName::ALL {
            budgets.insert(name, 0);
        }
        budgets.insert(SectionName::RecentWindow, 100);
        let (result, budget_exceeded) = pack(Mode::General, 65_000, candidates, &budgets);
        assert!(!budget_exceeded);
        let recent = result.iter().find(|(n, _)| *n == SectionName::RecentWindow).unwrap();
        assert_eq!(recent.1.len(), 2);
    }

    #[test]
    fn hard_ceiling_evicts_lowest_priority_non_sticky_first() {
        let mut candidates = BTreeMap::new();
        candidates.insert(SectionName::StickyInvariants, vec![item("sticky", 100, 1000)]);
        candidates.insert(SectionName::RecentWindow, vec![item("low", 50, 10), item("high", 50, 900)]);
        let mut budgets = BTreeMap::new();
        for name in SectionName::ALL {
            budgets.insert(name, 0);
        }
        budgets.insert(SectionName::StickyInvariants, 100);
        budgets.insert(SectionName::RecentWindow, 100);
        let (result, budget_exceeded) = pack(Mode::General, 150, candidates, &budgets);
        assert!(!budget_exceeded);
        let total: u32 = result.iter().flat_map(|(_, items)| items.iter()).map(|i| i.token_est).sum();
        assert!(total <= 150);
        let recent = result.iter().find(|(n, _)| *n == SectionName::RecentWindow).unwrap();
        assert!(recent.1.iter().any(|i| i.text == "high"));
        assert!(!recent.1.iter().any(|i| i.text == "low"));
    }

    #[test]
    fn sticky_alone_over_ceiling_is_reported_not_evicted() {
        let mut candidates = BTreeMap::new();
        candidates.insert(SectionName::StickyInvariants, vec![item("sticky", 200, 1000)]);
        let mut budgets = BTreeMap::new();
        for name in SectionName::ALL {
            budgets.insert(name, 0);
        }
        budgets.insert(SectionName::StickyInvariants, 200);
        let (result, budget_exceeded) = pack(Mode::General, 100, candidates, &budgets);
        assert!(budget_exceeded);
        let sticky = result.iter().find(|(n, _)| *n == SectionName::StickyInvariants).unwrap();
        assert_eq!(sticky.1.len(), 1);
    }
}
