//! Boundary/identity-crossed annotation scorers.

use std::collections::HashMap;

use crate::lexicon::is_sentinel_id;
use crate::types::{AnnotatedSpan, ProcessingUnit};

/// Boundary matching semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMatch {
    /// Both boundaries must match exactly.
    Exact,
    /// Any character overlap counts.
    Overlap,
}

impl BoundaryMatch {
    /// Name for reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            BoundaryMatch::Exact => "exact",
            BoundaryMatch::Overlap => "overlap",
        }
    }
}

/// Identity matching semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMatch {
    /// Entity class must match.
    Class,
    /// Entity class must match and the non-sentinel identifier sets must
    /// intersect.
    ClassAndId,
}

impl IdentityMatch {
    /// Name for reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            IdentityMatch::Class => "class",
            IdentityMatch::ClassAndId => "class+id",
        }
    }
}

fn identifier_sets_intersect(a: &AnnotatedSpan, b: &AnnotatedSpan) -> bool {
    a.entities.iter().any(|ea| {
        !is_sentinel_id(&ea.primary_identifier)
            && b.entities
                .iter()
                .any(|eb| eb.primary_identifier == ea.primary_identifier)
    })
}

/// Whether a predicted span matches a gold span under the given semantics.
#[must_use]
pub fn spans_match(
    pred: &AnnotatedSpan,
    gold: &AnnotatedSpan,
    boundary: BoundaryMatch,
    identity: IdentityMatch,
) -> bool {
    let bounds_ok = match boundary {
        BoundaryMatch::Exact => pred.same_bounds(gold),
        BoundaryMatch::Overlap => pred.overlaps(gold),
    };
    if !bounds_ok || pred.entity_class != gold.entity_class {
        return false;
    }
    match identity {
        IdentityMatch::Class => true,
        IdentityMatch::ClassAndId => identifier_sets_intersect(pred, gold),
    }
}

/// True/false positive/negative counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Matched predictions.
    pub tp: usize,
    /// Spurious predictions.
    pub fp: usize,
    /// Missed gold annotations.
    pub fn_: usize,
}

impl Counts {
    /// Precision; 0 when nothing was predicted.
    #[must_use]
    pub fn precision(&self) -> f64 {
        if self.tp + self.fp == 0 {
            0.0
        } else {
            self.tp as f64 / (self.tp + self.fp) as f64
        }
    }

    /// Recall; 0 when there is no gold.
    #[must_use]
    pub fn recall(&self) -> f64 {
        if self.tp + self.fn_ == 0 {
            0.0
        } else {
            self.tp as f64 / (self.tp + self.fn_) as f64
        }
    }

    /// F1; 0 when precision + recall is 0.
    #[must_use]
    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Merge another count set into this one.
    pub fn merge(&mut self, other: Counts) {
        self.tp += other.tp;
        self.fp += other.fp;
        self.fn_ += other.fn_;
    }
}

/// Greedy one-to-one matching of predicted against gold spans.
#[must_use]
pub fn count_unit(
    predicted: &[AnnotatedSpan],
    gold: &[AnnotatedSpan],
    boundary: BoundaryMatch,
    identity: IdentityMatch,
) -> Counts {
    let mut gold_matched = vec![false; gold.len()];
    let mut counts = Counts::default();
    for pred in predicted {
        let hit = gold.iter().enumerate().find(|(i, g)| {
            !gold_matched[*i] && spans_match(pred, g, boundary, identity)
        });
        match hit {
            Some((i, _)) => {
                gold_matched[i] = true;
                counts.tp += 1;
            }
            None => counts.fp += 1,
        }
    }
    counts.fn_ = gold_matched.iter().filter(|&&m| !m).count();
    counts
}

/// Incremental scorer over a unit stream.
pub trait Scorer {
    /// Accumulate one unit. Units without gold annotations are ignored.
    fn add_unit(&mut self, unit: &ProcessingUnit);

    /// The scorer's headline metric.
    fn f1(&self) -> f64;

    /// Human-readable score detail.
    fn detail(&self) -> String;
}

/// Annotation-level scorer under one (boundary, identity) combination.
#[derive(Debug, Clone)]
pub struct AnnotationScorer {
    boundary: BoundaryMatch,
    identity: IdentityMatch,
    counts: Counts,
}

impl AnnotationScorer {
    /// Create a scorer for one semantics combination.
    #[must_use]
    pub fn new(boundary: BoundaryMatch, identity: IdentityMatch) -> Self {
        Self {
            boundary,
            identity,
            counts: Counts::default(),
        }
    }

    /// Accumulated counts.
    #[must_use]
    pub fn counts(&self) -> Counts {
        self.counts
    }
}

impl Scorer for AnnotationScorer {
    fn add_unit(&mut self, unit: &ProcessingUnit) {
        if let Some(gold) = &unit.gold {
            self.counts.merge(count_unit(
                unit.best_prediction(),
                gold,
                self.boundary,
                self.identity,
            ));
        }
    }

    fn f1(&self) -> f64 {
        self.counts.f1()
    }

    fn detail(&self) -> String {
        format!(
            "annotation [{}/{}]: p={:.4} r={:.4} f1={:.4} (tp={} fp={} fn={})",
            self.boundary.name(),
            self.identity.name(),
            self.counts.precision(),
            self.counts.recall(),
            self.counts.f1(),
            self.counts.tp,
            self.counts.fp,
            self.counts.fn_
        )
    }
}

/// Instance-level scorer: strictest semantics, counts pooled per document.
#[derive(Debug, Clone, Default)]
pub struct InstanceScorer {
    by_doc: HashMap<String, Counts>,
}

impl InstanceScorer {
    /// Create the scorer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scorer for InstanceScorer {
    fn add_unit(&mut self, unit: &ProcessingUnit) {
        if let Some(gold) = &unit.gold {
            self.by_doc.entry(unit.doc_id.clone()).or_default().merge(count_unit(
                unit.best_prediction(),
                gold,
                BoundaryMatch::Exact,
                IdentityMatch::ClassAndId,
            ));
        }
    }

    fn f1(&self) -> f64 {
        let mut total = Counts::default();
        for counts in self.by_doc.values() {
            total.merge(*counts);
        }
        total.f1()
    }

    fn detail(&self) -> String {
        let mut total = Counts::default();
        for counts in self.by_doc.values() {
            total.merge(*counts);
        }
        format!(
            "instance [{} documents]: p={:.4} r={:.4} f1={:.4}",
            self.by_doc.len(),
            total.precision(),
            total.recall(),
            total.f1()
        )
    }
}

/// Macro instance-level scorer: per-instance F1 averaged, not pooled.
#[derive(Debug, Clone, Default)]
pub struct MacroInstanceScorer {
    f1_sum: f64,
    instances: usize,
}

impl MacroInstanceScorer {
    /// Create the scorer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scorer for MacroInstanceScorer {
    fn add_unit(&mut self, unit: &ProcessingUnit) {
        if let Some(gold) = &unit.gold {
            let counts = count_unit(
                unit.best_prediction(),
                gold,
                BoundaryMatch::Exact,
                IdentityMatch::ClassAndId,
            );
            // Instances with neither gold nor predictions are vacuously
            // perfect; scoring them as 0 would drag the average down.
            let f1 = if counts == Counts::default() { 1.0 } else { counts.f1() };
            self.f1_sum += f1;
            self.instances += 1;
        }
    }

    fn f1(&self) -> f64 {
        if self.instances == 0 {
            0.0
        } else {
            self.f1_sum / self.instances as f64
        }
    }

    fn detail(&self) -> String {
        format!("macro instance [{} instances]: f1={:.4}", self.instances, self.f1())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::Entity;
    use std::sync::Arc;

    fn span(start: usize, end: usize, class: &str, id: Option<&str>) -> AnnotatedSpan {
        let entities = id
            .map(|id| vec![Arc::new(Entity::new(id, "name", class))])
            .unwrap_or_default();
        AnnotatedSpan::new(start, end, "t", class, entities, 1.0)
    }

    #[test]
    fn exact_vs_overlap_boundary() {
        let pred = span(0, 5, "Disease", None);
        let gold = span(0, 4, "Disease", None);
        assert!(!spans_match(&pred, &gold, BoundaryMatch::Exact, IdentityMatch::Class));
        assert!(spans_match(&pred, &gold, BoundaryMatch::Overlap, IdentityMatch::Class));
    }

    #[test]
    fn class_and_id_requires_shared_identifier() {
        let pred = span(0, 5, "Disease", Some("MESH:D001"));
        let gold_same = span(0, 5, "Disease", Some("MESH:D001"));
        let gold_other = span(0, 5, "Disease", Some("MESH:D002"));
        assert!(spans_match(&pred, &gold_same, BoundaryMatch::Exact, IdentityMatch::ClassAndId));
        assert!(!spans_match(&pred, &gold_other, BoundaryMatch::Exact, IdentityMatch::ClassAndId));
        // Class-only ignores identifiers
        assert!(spans_match(&pred, &gold_other, BoundaryMatch::Exact, IdentityMatch::Class));
    }

    #[test]
    fn sentinel_identifiers_never_match() {
        let pred = span(0, 5, "Disease", Some("UNKNOWN:Disease"));
        let gold = span(0, 5, "Disease", Some("UNKNOWN:Disease"));
        assert!(!spans_match(&pred, &gold, BoundaryMatch::Exact, IdentityMatch::ClassAndId));
    }

    #[test]
    fn counting_is_one_to_one() {
        // Two identical predictions can only consume one gold span
        let predicted = vec![span(0, 5, "Disease", None), span(0, 5, "Disease", None)];
        let gold = vec![span(0, 5, "Disease", None)];
        let counts = count_unit(&predicted, &gold, BoundaryMatch::Exact, IdentityMatch::Class);
        assert_eq!(counts, Counts { tp: 1, fp: 1, fn_: 0 });
    }

    #[test]
    fn metrics_are_bounded() {
        let counts = Counts { tp: 3, fp: 1, fn_: 2 };
        for v in [counts.precision(), counts.recall(), counts.f1()] {
            assert!((0.0..=1.0).contains(&v));
        }
        assert_eq!(Counts::default().f1(), 0.0);
    }
}
