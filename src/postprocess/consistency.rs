//! Corpus-consistency correction.
//!
//! The relative variant is an explicit two-phase operation: a pure tally
//! over the materialized batch produces the vote counts, and only after the
//! tally is complete does the apply phase rewrite any unit. Streaming the
//! two together would make the outcome depend on unit order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::lexicon::{join_identifiers, Lexicon};
use crate::postprocess::find_occurrences;
use crate::types::{AnnotatedSpan, ProcessingUnit};

/// An (entity class, joined identifier set) vote.
pub type Pair = (String, String);

/// Vote counts per surface text.
#[derive(Debug, Default, Clone)]
pub struct ConsistencyTally {
    by_text: HashMap<String, HashMap<Pair, usize>>,
}

impl ConsistencyTally {
    /// Count of one (class, identifier) pair for a surface text.
    #[must_use]
    pub fn count(&self, text: &str, pair: &Pair) -> usize {
        self.by_text
            .get(text)
            .and_then(|votes| votes.get(pair))
            .copied()
            .unwrap_or(0)
    }

    /// The winning pair and its count for a surface text.
    ///
    /// Ties are broken deterministically by pair ordering.
    #[must_use]
    pub fn majority(&self, text: &str) -> Option<(&Pair, usize)> {
        let votes = self.by_text.get(text)?;
        votes
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(pair, &n)| (pair, n))
    }

    /// Surface texts with at least one vote.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.by_text.keys().map(String::as_str)
    }
}

/// Pure collect phase: tally (class, identifier) votes per surface text.
#[must_use]
pub fn tally(units: &[ProcessingUnit]) -> ConsistencyTally {
    let mut result = ConsistencyTally::default();
    for unit in units {
        for span in unit.best_prediction() {
            if let Some(ids) = join_identifiers(&span.entities) {
                *result
                    .by_text
                    .entry(span.text.clone())
                    .or_default()
                    .entry((span.entity_class.clone(), ids))
                    .or_insert(0) += 1;
            }
        }
    }
    result
}

/// Relative consistency: majority voting over identical surface texts.
pub struct RelativeConsistency {
    change_threshold: usize,
    add_threshold: usize,
    lexicon: Arc<Lexicon>,
}

impl RelativeConsistency {
    /// Create the pass.
    #[must_use]
    pub fn new(change_threshold: usize, add_threshold: usize, lexicon: Arc<Lexicon>) -> Self {
        Self {
            change_threshold,
            add_threshold,
            lexicon,
        }
    }

    /// Tally, then rewrite minority and missing occurrences.
    pub fn apply_batch(&self, units: &mut [ProcessingUnit]) {
        let votes = tally(units);
        self.apply(units, &votes);
    }

    /// Pure apply phase against an already-computed tally.
    pub fn apply(&self, units: &mut [ProcessingUnit], votes: &ConsistencyTally) {
        for unit in units.iter_mut() {
            let text = unit.text.clone();
            let Some(spans) = unit.best_prediction_mut() else {
                continue;
            };

            // Replace minority pairs.
            for span in spans.iter_mut() {
                let Some(ids) = join_identifiers(&span.entities) else {
                    continue;
                };
                let current: Pair = (span.entity_class.clone(), ids);
                let current_count = votes.count(&span.text, &current);
                let Some((majority, majority_count)) = votes.majority(&span.text) else {
                    continue;
                };
                if *majority != current
                    && current_count < self.change_threshold
                    && majority_count > current_count
                {
                    log::debug!(
                        "Consistency: '{}' {:?} ({}x) -> {:?} ({}x)",
                        span.text,
                        current,
                        current_count,
                        majority,
                        majority_count
                    );
                    rewrite(span, majority, &self.lexicon);
                }
            }

            // Annotate unannotated occurrences of well-supported texts.
            for surface in votes.texts() {
                let Some((majority, majority_count)) = votes.majority(surface) else {
                    continue;
                };
                if majority_count < self.add_threshold {
                    continue;
                }
                for (start, end) in find_occurrences(&text, surface) {
                    if spans.iter().any(|s| s.covers(start, end)) {
                        continue;
                    }
                    let mut span = AnnotatedSpan::new(
                        start,
                        end,
                        surface,
                        majority.0.clone(),
                        Vec::new(),
                        0.0,
                    );
                    rewrite(&mut span, majority, &self.lexicon);
                    spans.push(span);
                }
            }
            spans.sort_by_key(|s| (s.start, s.end));
        }
    }
}

fn rewrite(span: &mut AnnotatedSpan, pair: &Pair, lexicon: &Lexicon) {
    span.entity_class = pair.0.clone();
    let entities: Vec<_> = pair
        .1
        .split('|')
        .filter_map(|id| lexicon.get(id).cloned())
        .collect();
    span.entities = if entities.is_empty() {
        vec![lexicon.unknown_for(&pair.0)]
    } else {
        entities
    };
}

/// Absolute consistency: snap every annotation that resolves to no real
/// identifier onto its class's placeholder state.
pub struct AbsoluteConsistency {
    lexicon: Arc<Lexicon>,
}

impl AbsoluteConsistency {
    /// Create the pass.
    #[must_use]
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    /// Apply to the whole batch.
    pub fn apply(&self, units: &mut [ProcessingUnit]) {
        for unit in units.iter_mut() {
            if let Some(spans) = unit.best_prediction_mut() {
                for span in spans.iter_mut() {
                    if join_identifiers(&span.entities).is_none() {
                        span.entities = vec![self.lexicon.unknown_for(&span.entity_class)];
                        span.score = 0.0;
                    }
                }
            }
        }
    }
}
