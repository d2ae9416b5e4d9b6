//! Sentence fan-out.
//!
//! Splitting is a pure partition of the unit text: every character of the
//! original unit lands in exactly one sentence unit, so concatenating the
//! fanned-out units' covered ranges reconstructs the original range with no
//! gap or overlap. Trailing whitespace after a sentence terminator stays with
//! the sentence it ends.
//!
//! The boundary heuristic itself is deliberately simple; it is an opaque
//! collaborator as far as the rest of the pipeline is concerned.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::offset::{byte_to_char, char_slice};
use crate::types::ProcessingUnit;

static BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]["')\]]*\s+"#).expect("sentence boundary regex"));

/// Splits units into sentence-scoped units while preserving offsets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SentenceBreaker;

impl SentenceBreaker {
    /// Create a breaker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Fan a batch of units out into sentence units.
    #[must_use]
    pub fn break_units(&self, units: Vec<ProcessingUnit>) -> Vec<ProcessingUnit> {
        units.into_iter().flat_map(|u| self.break_unit(u)).collect()
    }

    /// Fan one unit out into sentence units.
    ///
    /// Gold annotations are redistributed to the sentence containing them;
    /// a candidate boundary falling strictly inside a gold span is discarded
    /// so no annotation is ever split across units.
    #[must_use]
    pub fn break_unit(&self, unit: ProcessingUnit) -> Vec<ProcessingUnit> {
        let total = unit.char_len();
        let mut boundaries: Vec<usize> = BOUNDARY
            .find_iter(&unit.text)
            .map(|m| byte_to_char(&unit.text, m.end()))
            .filter(|&b| b > 0 && b < total)
            .collect();
        if let Some(gold) = &unit.gold {
            boundaries.retain(|&b| !gold.iter().any(|g| g.start < b && b < g.end));
        }
        boundaries.dedup();
        if boundaries.is_empty() {
            return vec![unit];
        }

        let mut pieces = Vec::with_capacity(boundaries.len() + 1);
        let mut prev = 0;
        for end in boundaries.into_iter().chain(std::iter::once(total)) {
            let text = char_slice(&unit.text, prev, end).to_string();
            let mut piece = ProcessingUnit::new(&unit.doc_id, text, unit.offset + prev);
            if let Some(gold) = &unit.gold {
                let mut piece_gold = Vec::new();
                for span in gold {
                    if span.start >= prev && span.start < end {
                        let mut rebased = span.clone();
                        rebased.start -= prev;
                        rebased.end -= prev;
                        piece_gold.push(rebased);
                    }
                }
                piece.gold = Some(piece_gold);
            }
            pieces.push(piece);
            prev = end;
        }
        pieces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnnotatedSpan;

    #[test]
    fn fan_out_partitions_the_text() {
        let unit = ProcessingUnit::new("d1", "First sentence. Second one! Third?", 100);
        let pieces = SentenceBreaker::new().break_unit(unit);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].text, "First sentence. ");
        assert_eq!(pieces[0].offset, 100);
        assert_eq!(pieces[1].text, "Second one! ");
        assert_eq!(pieces[1].offset, 116);
        assert_eq!(pieces[2].text, "Third?");
        assert_eq!(pieces[2].offset, 128);
        // No gaps, no overlaps
        let mut cursor = 100;
        for p in &pieces {
            assert_eq!(p.offset, cursor);
            cursor = p.covered_range().1;
        }
        assert_eq!(cursor, 134);
    }

    #[test]
    fn no_terminator_returns_unit_unchanged() {
        let unit = ProcessingUnit::new("d1", "no terminator here", 5);
        let pieces = SentenceBreaker::new().break_unit(unit);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].offset, 5);
    }

    #[test]
    fn gold_spans_are_rebased_into_their_sentence() {
        let mut unit = ProcessingUnit::new("d1", "One here. CHF there.", 0);
        unit.gold = Some(vec![AnnotatedSpan::new(10, 13, "CHF", "Disease", vec![], 1.0)]);
        let pieces = SentenceBreaker::new().break_unit(unit);
        assert_eq!(pieces.len(), 2);
        let gold = pieces[1].gold.as_ref().unwrap();
        assert_eq!(gold.len(), 1);
        assert_eq!((gold[0].start, gold[0].end), (0, 3));
        assert_eq!(char_slice(&pieces[1].text, 0, 3), "CHF");
    }

    #[test]
    fn boundary_inside_gold_span_is_suppressed() {
        let mut unit = ProcessingUnit::new("d1", "See E. coli infection.", 0);
        // Gold span covering "E. coli" straddles the candidate boundary
        unit.gold = Some(vec![AnnotatedSpan::new(4, 11, "E. coli", "Species", vec![], 1.0)]);
        let pieces = SentenceBreaker::new().break_unit(unit);
        assert_eq!(pieces.len(), 1);
    }
}
