//! Core processing types.
//!
//! A document is ingested into [`ProcessingUnit`]s (one per sentence, title,
//! abstract, or mention), each anchored to its parent document by an absolute
//! character offset. The pipeline fills tokens, candidate segments, and ranked
//! prediction sets; the correction chain rewrites the rank-0 prediction set in
//! place; emission re-projects span offsets back to document coordinates.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::lexicon::Entity;
use crate::offset::char_len;

// =============================================================================
// Sparse feature vectors
// =============================================================================

/// Sparse feature vector over a trained vocabulary.
///
/// Entries are kept sorted by feature index with no duplicates, so dot
/// products are a single merge pass and equality is structural.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(u32, f64)>,
}

impl SparseVector {
    /// Build from (index, value) pairs; duplicate indices are summed.
    #[must_use]
    pub fn from_pairs(mut pairs: Vec<(u32, f64)>) -> Self {
        pairs.sort_unstable_by_key(|&(i, _)| i);
        let mut entries: Vec<(u32, f64)> = Vec::with_capacity(pairs.len());
        for (i, v) in pairs {
            match entries.last_mut() {
                Some(last) if last.0 == i => last.1 += v,
                _ => entries.push((i, v)),
            }
        }
        entries.retain(|&(_, v)| v != 0.0);
        Self { entries }
    }

    /// Whether the vector has no non-zero entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted (index, value) entries.
    #[must_use]
    pub fn entries(&self) -> &[(u32, f64)] {
        &self.entries
    }

    /// Dot product with another vector.
    #[must_use]
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut a, mut b) = (self.entries.iter().peekable(), other.entries.iter().peekable());
        let mut sum = 0.0;
        while let (Some(&&(ia, va)), Some(&&(ib, vb))) = (a.peek(), b.peek()) {
            match ia.cmp(&ib) {
                std::cmp::Ordering::Less => {
                    a.next();
                }
                std::cmp::Ordering::Greater => {
                    b.next();
                }
                std::cmp::Ordering::Equal => {
                    sum += va * vb;
                    a.next();
                    b.next();
                }
            }
        }
        sum
    }

    /// Stable hashable key for result caching.
    #[must_use]
    pub fn cache_key(&self) -> Vec<(u32, u64)> {
        self.entries.iter().map(|&(i, v)| (i, v.to_bits())).collect()
    }
}

// =============================================================================
// Ranked lists
// =============================================================================

/// Bounded best-first list of (score, item) pairs.
///
/// Insertion keeps entries sorted by descending score and drops anything past
/// the capacity. Rank 0 is the best entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedList<T> {
    capacity: usize,
    entries: Vec<(f64, T)>,
}

impl<T> RankedList<T> {
    /// Create an empty list with the given capacity (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Vec::new(),
        }
    }

    /// Insert an item; returns false if it fell off the end.
    pub fn add(&mut self, score: f64, item: T) -> bool {
        let pos = self
            .entries
            .iter()
            .position(|&(s, _)| score > s)
            .unwrap_or(self.entries.len());
        if pos >= self.capacity {
            return false;
        }
        self.entries.insert(pos, (score, item));
        self.entries.truncate(self.capacity);
        true
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Score at `rank`.
    #[must_use]
    pub fn score(&self, rank: usize) -> Option<f64> {
        self.entries.get(rank).map(|&(s, _)| s)
    }

    /// Item at `rank`.
    #[must_use]
    pub fn item(&self, rank: usize) -> Option<&T> {
        self.entries.get(rank).map(|(_, t)| t)
    }

    /// Best (rank 0) entry.
    #[must_use]
    pub fn best(&self) -> Option<(f64, &T)> {
        self.entries.first().map(|(s, t)| (*s, t))
    }

    /// Mutable access to the best item.
    pub fn best_mut(&mut self) -> Option<&mut T> {
        self.entries.first_mut().map(|(_, t)| t)
    }

    /// Drop every entry except rank 0.
    pub fn truncate_to_best(&mut self) {
        self.entries.truncate(1);
    }

    /// Iterate entries in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &T)> {
        self.entries.iter().map(|(s, t)| (*s, t))
    }
}

// =============================================================================
// Tokens, segments, mentions
// =============================================================================

/// A token within a unit, with unit-relative character offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Start character offset (inclusive).
    pub start: usize,
    /// End character offset (exclusive).
    pub end: usize,
    /// Token surface text.
    pub text: String,
    /// Per-token feature vector; dropped by the reclaim stage.
    pub features: Option<SparseVector>,
}

/// A mention surface form plus its processed representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionName {
    /// Mention text (possibly abbreviation-expanded).
    pub text: String,
    /// Lowercased token strings of `text`.
    pub tokens: Vec<String>,
    /// Feature vector produced by the mention featurizer.
    pub vector: Option<SparseVector>,
}

impl MentionName {
    /// Create an unprocessed mention.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: Vec::new(),
            vector: None,
        }
    }
}

/// A candidate mention segment within a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Start character offset (inclusive, unit-relative).
    pub start: usize,
    /// End character offset (exclusive, unit-relative).
    pub end: usize,
    /// Index of the first token covered.
    pub first_token: usize,
    /// Index one past the last token covered.
    pub last_token: usize,
    /// The mention representation for this segment.
    pub mention: MentionName,
    /// Per-segment recognition features; dropped by the reclaim stage.
    pub features: Option<SparseVector>,
}

// =============================================================================
// Annotated spans
// =============================================================================

/// A predicted or gold annotation within a unit.
///
/// Offsets are unit-relative characters and satisfy
/// `start <= end <= unit length`; they are re-projected to absolute document
/// coordinates only at emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedSpan {
    /// Start character offset (inclusive, unit-relative).
    pub start: usize,
    /// End character offset (exclusive, unit-relative).
    pub end: usize,
    /// Surface text covered by the span.
    pub text: String,
    /// Entity class label (e.g. "Disease", "Chemical").
    pub entity_class: String,
    /// Candidate entities, best first.
    pub entities: Vec<Arc<Entity>>,
    /// Confidence score of the normalization.
    pub score: f64,
}

impl AnnotatedSpan {
    /// Create a span.
    #[must_use]
    pub fn new(
        start: usize,
        end: usize,
        text: impl Into<String>,
        entity_class: impl Into<String>,
        entities: Vec<Arc<Entity>>,
        score: f64,
    ) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            entity_class: entity_class.into(),
            entities,
            score,
        }
    }

    /// Span length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether this span shares any character with `other`.
    #[must_use]
    pub fn overlaps(&self, other: &AnnotatedSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether this span covers the character range `[start, end)`.
    #[must_use]
    pub fn covers(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }

    /// Whether both boundaries match `other` exactly.
    #[must_use]
    pub fn same_bounds(&self, other: &AnnotatedSpan) -> bool {
        self.start == other.start && self.end == other.end
    }
}

// =============================================================================
// Processing units
// =============================================================================

/// One sentence/title/abstract/mention-scoped slice of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingUnit {
    /// Identifier of the parent document.
    pub doc_id: String,
    /// Raw unit text.
    pub text: String,
    /// Absolute character offset of `text` within the parent document.
    pub offset: usize,
    /// Ordered tokens; filled by the tokenizer stage.
    pub tokens: Vec<Token>,
    /// Ordered candidate segments; filled by the segmenter stage.
    pub segments: Vec<Segment>,
    /// Gold annotations, when the unit came from an annotated dataset.
    pub gold: Option<Vec<AnnotatedSpan>>,
    /// Ranked predicted annotation sets; rank 0 is consumed everywhere.
    pub predictions: RankedList<Vec<AnnotatedSpan>>,
}

impl ProcessingUnit {
    /// Create a unit with no gold annotations.
    #[must_use]
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>, offset: usize) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            offset,
            tokens: Vec::new(),
            segments: Vec::new(),
            gold: None,
            predictions: RankedList::new(1),
        }
    }

    /// Unit length in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        char_len(&self.text)
    }

    /// Absolute character range `[offset, offset + len)` covered by this unit.
    #[must_use]
    pub fn covered_range(&self) -> (usize, usize) {
        (self.offset, self.offset + self.char_len())
    }

    /// The rank-0 predicted annotation set, empty if nothing was predicted.
    #[must_use]
    pub fn best_prediction(&self) -> &[AnnotatedSpan] {
        self.predictions.best().map_or(&[], |(_, spans)| spans.as_slice())
    }

    /// Mutable access to the rank-0 predicted annotation set.
    pub fn best_prediction_mut(&mut self) -> Option<&mut Vec<AnnotatedSpan>> {
        self.predictions.best_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranked_list_orders_by_score() {
        let mut list = RankedList::new(2);
        assert!(list.add(0.3, "c"));
        assert!(list.add(0.9, "a"));
        assert!(list.add(0.5, "b"));
        assert_eq!(list.len(), 2);
        assert_eq!(list.capacity(), 2);
        assert_eq!(list.best(), Some((0.9, &"a")));
        assert_eq!(list.item(1), Some(&"b"));
        // Below the cut
        assert!(!list.add(0.1, "d"));
    }

    #[test]
    fn sparse_vector_dot_merges_indices() {
        let a = SparseVector::from_pairs(vec![(1, 1.0), (3, 2.0)]);
        let b = SparseVector::from_pairs(vec![(3, 0.5), (4, 9.0)]);
        assert!((a.dot(&b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sparse_vector_merges_duplicates() {
        let v = SparseVector::from_pairs(vec![(2, 1.0), (2, 1.0), (5, 0.0)]);
        assert_eq!(v.entries(), &[(2, 2.0)]);
    }

    #[test]
    fn unit_covered_range_counts_chars() {
        let unit = ProcessingUnit::new("d1", "αβγ", 10);
        assert_eq!(unit.covered_range(), (10, 13));
    }

    #[test]
    fn span_overlap() {
        let e = |s, t| AnnotatedSpan::new(s, t, "x", "Disease", vec![], 0.0);
        assert!(e(0, 4).overlaps(&e(3, 6)));
        assert!(!e(0, 4).overlaps(&e(4, 6)));
    }
}
