//! List-level rule cleanup before compilation
//!
//! Applies `$badfilter` cancellations and drops rules that repeat an
//! earlier rule of the same list.

use std::collections::HashSet;

use serde::Serialize;

use crate::parser::NetworkRule;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    pub badfilter_rules: usize,
    pub badfiltered_rules: usize,
}

/// Remove badfilter rules, the rules they cancel, and duplicates.
///
/// Rules are `(line, rule)` pairs; relative order is preserved.
pub fn optimize_rules(rules: &mut Vec<(usize, NetworkRule)>) -> OptimizeStats {
    let before = rules.len();
    let mut badfilter_keys: HashSet<RuleKey> = HashSet::new();
    let mut badfilter_rules = 0usize;

    for (_, rule) in rules.iter() {
        if rule.badfilter {
            badfilter_rules += 1;
            badfilter_keys.insert(RuleKey::from(rule));
        }
    }

    let mut badfiltered_rules = 0usize;
    if !badfilter_keys.is_empty() {
        rules.retain(|(_, rule)| {
            if rule.badfilter {
                return false;
            }
            if badfilter_keys.contains(&RuleKey::from(rule)) {
                badfiltered_rules += 1;
                return false;
            }
            true
        });
    }

    let mut seen: HashSet<RuleKey> = HashSet::new();
    let mut deduped = 0usize;
    rules.retain(|(_, rule)| {
        if seen.insert(RuleKey::from(rule)) {
            true
        } else {
            deduped += 1;
            false
        }
    });

    OptimizeStats {
        before,
        after: rules.len(),
        deduped,
        badfilter_rules,
        badfiltered_rules,
    }
}

/// Everything that affects matching. Raw text and the badfilter bit do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RuleKey {
    flags: u8,
    is_regex: bool,
    type_mask: u32,
    party_mask: u8,
    pattern: String,
    domain_opt: String,
}

impl From<&NetworkRule> for RuleKey {
    fn from(rule: &NetworkRule) -> Self {
        Self {
            flags: rule.flags.bits(),
            is_regex: rule.is_regex,
            type_mask: rule.type_mask.bits(),
            party_mask: rule.party_mask.bits(),
            pattern: rule.pattern.clone(),
            domain_opt: rule.domain_opt.clone(),
        }
    }
}
