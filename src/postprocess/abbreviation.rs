//! Abbreviation-driven revision of predicted annotations.

use std::sync::Arc;

use crate::abbrev::{ContextSet, DocContext};
use crate::lexicon::Lexicon;
use crate::model::{MentionFeaturizer, NormalizerSet};
use crate::postprocess::find_occurrences;
use crate::types::{AnnotatedSpan, ProcessingUnit};

/// Re-normalizes short-form mentions through their document-local expansion.
///
/// Three independent effects, each gated by its own parameter:
/// - replace an annotation when the expanded-form prediction beats the
///   original by at least `change_threshold`;
/// - add an annotation for a short form the annotator missed, when the
///   expanded-form prediction exceeds `add_threshold`;
/// - drop a short-form annotation whose expansion yields no prediction at
///   all, when `drop_if_no_expanded_prediction` is set.
pub struct AbbreviationRevision {
    change_threshold: f64,
    add_threshold: f64,
    drop_if_no_expanded_prediction: bool,
    featurizer: Arc<MentionFeaturizer>,
    normalizers: Arc<NormalizerSet>,
    lexicon: Arc<Lexicon>,
}

impl AbbreviationRevision {
    /// Create the pass.
    #[must_use]
    pub fn new(
        change_threshold: f64,
        add_threshold: f64,
        drop_if_no_expanded_prediction: bool,
        featurizer: Arc<MentionFeaturizer>,
        normalizers: Arc<NormalizerSet>,
        lexicon: Arc<Lexicon>,
    ) -> Self {
        Self {
            change_threshold,
            add_threshold,
            drop_if_no_expanded_prediction,
            featurizer,
            normalizers,
            lexicon,
        }
    }

    /// Apply the pass to the whole batch, resolving abbreviations under
    /// each unit's own document context.
    pub fn apply(&self, units: &mut [ProcessingUnit], contexts: &ContextSet) {
        for unit in units.iter_mut() {
            let ctx = contexts.get(&unit.doc_id);
            if !ctx.abbreviations.is_empty() {
                self.revise_unit(unit, ctx);
            }
        }
    }

    fn revise_unit(&self, unit: &mut ProcessingUnit, ctx: &DocContext) {
        let text = unit.text.clone();
        let Some(spans) = unit.best_prediction_mut() else {
            return;
        };

        // Replace or drop existing short-form annotations.
        let mut i = 0;
        while i < spans.len() {
            let span = &spans[i];
            let Some(long) = ctx.abbreviations.lookup(&span.text) else {
                i += 1;
                continue;
            };
            let vector = self.featurizer.vectorize(long);
            let expanded = self
                .normalizers
                .get(&span.entity_class)
                .and_then(|n| {
                    let ranked = n.find_best(&vector, &self.lexicon, 1);
                    ranked.best().map(|(s, e)| (s, Arc::clone(e)))
                });
            match expanded {
                None => {
                    if self.drop_if_no_expanded_prediction {
                        log::debug!(
                            "Dropping '{}' ({}): expansion '{}' has no prediction",
                            span.text,
                            span.entity_class,
                            long
                        );
                        spans.remove(i);
                        continue;
                    }
                    i += 1;
                }
                Some((score, entity)) => {
                    if score > spans[i].score + self.change_threshold {
                        log::debug!(
                            "Revising '{}' via '{}': {} -> {}",
                            spans[i].text,
                            long,
                            spans[i].score,
                            score
                        );
                        spans[i].entities = vec![entity];
                        spans[i].score = score;
                    }
                    i += 1;
                }
            }
        }

        // Add expansion-only findings for short forms the annotator missed.
        for (short, long) in ctx.abbreviations.iter() {
            for (start, end) in find_occurrences(&text, short) {
                if spans.iter().any(|s| s.covers(start, end)) {
                    continue;
                }
                let vector = self.featurizer.vectorize(long);
                let Some((class, score, entity)) =
                    self.normalizers.find_best_any(&vector, &self.lexicon)
                else {
                    continue;
                };
                if score > self.add_threshold {
                    log::debug!("Adding '{short}' ({class}) from expansion '{long}'");
                    spans.push(AnnotatedSpan::new(
                        start,
                        end,
                        short,
                        class,
                        vec![entity],
                        score,
                    ));
                }
            }
        }
        spans.sort_by_key(|s| (s.start, s.end));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::Entity;
    use crate::model::{CachedNormalizer, NameEntry, NormalizationModel};
    use std::collections::HashMap;

    fn fixture() -> (Arc<MentionFeaturizer>, Arc<NormalizerSet>, Arc<Lexicon>) {
        let vocab: HashMap<String, u32> = ["congestive", "heart", "failure"]
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32))
            .collect();
        let featurizer = MentionFeaturizer::new(vocab);

        let mut lexicon = Lexicon::new();
        lexicon.register_class("Disease");
        lexicon.insert(Entity::new("MESH:D006333", "congestive heart failure", "Disease"));

        let normalizer = CachedNormalizer::new(
            NormalizationModel::averaged(vec![NameEntry {
                vector: featurizer.vectorize("congestive heart failure"),
                entity_id: "MESH:D006333".into(),
            }]),
            16,
        );
        let set = NormalizerSet::new([("Disease".to_string(), normalizer)].into_iter().collect());
        (Arc::new(featurizer), Arc::new(set), Arc::new(lexicon))
    }

    fn unit_with_chf(score: f64) -> ProcessingUnit {
        let mut unit = ProcessingUnit::new("d", "CHF worsened", 0);
        unit.predictions.add(
            score,
            vec![AnnotatedSpan::new(0, 3, "CHF", "Disease", vec![], score)],
        );
        unit
    }

    fn ctx() -> ContextSet {
        let mut ctx = DocContext::empty("d");
        ctx.abbreviations.insert("CHF", "congestive heart failure");
        ContextSet::from_single(ctx)
    }

    #[test]
    fn replaces_when_delta_exceeds_change_threshold() {
        let (f, n, l) = fixture();
        // Expanded form scores 1.0 (exact name match); original is 0.40.
        let pass = AbbreviationRevision::new(0.30, 10.0, false, f, n, l);
        let mut units = vec![unit_with_chf(0.40)];
        pass.apply(&mut units, &ctx());
        let span = &units[0].best_prediction()[0];
        assert_eq!(span.entities[0].primary_identifier, "MESH:D006333");
        assert!((span.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn keeps_original_when_delta_is_too_small() {
        let (f, n, l) = fixture();
        let pass = AbbreviationRevision::new(0.60, 10.0, false, f, n, l);
        let mut units = vec![unit_with_chf(0.95)];
        pass.apply(&mut units, &ctx());
        let span = &units[0].best_prediction()[0];
        assert!(span.entities.is_empty());
        assert!((span.score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn drops_short_form_without_expanded_prediction() {
        let (f, n, l) = fixture();
        let pass = AbbreviationRevision::new(0.30, 10.0, true, f, n, l);
        let mut unit = ProcessingUnit::new("d", "XYZ level", 0);
        unit.predictions.add(
            0.2,
            vec![AnnotatedSpan::new(0, 3, "XYZ", "Disease", vec![], 0.2)],
        );
        let mut ctx = DocContext::empty("d");
        // Expansion exists but normalizes to nothing
        ctx.abbreviations.insert("XYZ", "completely unknown phrase");
        let mut units = vec![unit];
        pass.apply(&mut units, &ContextSet::from_single(ctx));
        assert!(units[0].best_prediction().is_empty());
    }

    #[test]
    fn adds_expansion_only_finding_above_add_threshold() {
        let (f, n, l) = fixture();
        let pass = AbbreviationRevision::new(0.30, 0.5, false, f, n, l);
        let mut unit = ProcessingUnit::new("d", "History of CHF noted", 0);
        unit.predictions.add(0.0, vec![]);
        let mut units = vec![unit];
        pass.apply(&mut units, &ctx());
        let spans = units[0].best_prediction();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "CHF");
        assert_eq!((spans[0].start, spans[0].end), (11, 14));
    }
}
