//! Post-processing correction chain.
//!
//! An ordered set of independently toggleable passes that rewrite predicted
//! annotations after the core pipeline has produced them. The order is
//! load-bearing: simple text filters run first so the expensive passes see
//! already-cleaned predictions, coordination runs before abbreviation
//! revision, and consistency voting runs last so its tallies reflect the
//! abbreviation-corrected identifiers.

pub mod abbreviation;
pub mod consistency;
pub mod coordination;
pub mod filters;

pub use abbreviation::AbbreviationRevision;
pub use consistency::{AbsoluteConsistency, ConsistencyTally, RelativeConsistency};
pub use coordination::CoordinationMerge;
pub use filters::{FalseModifierRemover, MentionTextFilter, PatternFilter};

use crate::abbrev::ContextSet;
use crate::error::Result;
use crate::offset::byte_to_char;
use crate::types::ProcessingUnit;

/// The configured correction passes, applied in their fixed order.
#[derive(Default)]
pub struct CorrectionChain {
    /// Pass 1: negating modifier phrase removal.
    pub false_modifier: Option<FalseModifierRemover>,
    /// Pass 2: exact surface text denylist.
    pub text_filter: Option<MentionTextFilter>,
    /// Pass 3: glob-style surface pattern denylist.
    pub pattern_filter: Option<PatternFilter>,
    /// Pass 4: coordination reconciliation.
    pub coordination: Option<CoordinationMerge>,
    /// Pass 5: abbreviation-driven revision.
    pub abbreviation: Option<AbbreviationRevision>,
    /// Pass 6a: relative (voting) consistency.
    pub consistency: Option<RelativeConsistency>,
    /// Pass 6b: absolute (placeholder baseline) consistency.
    pub absolute_consistency: Option<AbsoluteConsistency>,
}

impl CorrectionChain {
    /// A chain with every pass disabled.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Apply the enabled passes, in order, to the materialized batch.
    pub fn apply(&self, units: &mut [ProcessingUnit], contexts: &ContextSet) -> Result<()> {
        if let Some(pass) = &self.false_modifier {
            pass.apply(units);
        }
        if let Some(pass) = &self.text_filter {
            pass.apply(units);
        }
        if let Some(pass) = &self.pattern_filter {
            pass.apply(units);
        }
        if let Some(pass) = &self.coordination {
            pass.apply(units);
        }
        if let Some(pass) = &self.abbreviation {
            pass.apply(units, contexts);
        }
        if let Some(pass) = &self.consistency {
            pass.apply_batch(units);
        }
        if let Some(pass) = &self.absolute_consistency {
            pass.apply(units);
        }
        Ok(())
    }
}

/// Word-bounded occurrences of `needle` in `text`, as character ranges.
pub(crate) fn find_occurrences(text: &str, needle: &str) -> Vec<(usize, usize)> {
    if needle.is_empty() {
        return Vec::new();
    }
    let needle_chars = needle.chars().count();
    let mut out = Vec::new();
    for (byte_pos, _) in text.match_indices(needle) {
        let start = byte_to_char(text, byte_pos);
        let end = start + needle_chars;
        let before = text[..byte_pos].chars().next_back();
        let after = text[byte_pos + needle.len()..].chars().next();
        let bounded = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
        if bounded(before) && bounded(after) {
            out.push((start, end));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurrences_are_word_bounded() {
        assert_eq!(find_occurrences("CHF and CHFX and CHF", "CHF"), vec![(0, 3), (17, 20)]);
        assert_eq!(find_occurrences("no match", "CHF"), vec![]);
    }

    #[test]
    fn occurrences_use_char_offsets() {
        assert_eq!(find_occurrences("αβ CHF", "CHF"), vec![(3, 6)]);
    }
}
