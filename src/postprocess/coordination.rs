//! Coordination reconciliation.
//!
//! A coordinated mention like "breast and ovarian cancer" is one predicted
//! span but names several entities. This pass splits such spans into
//! conjuncts, re-normalizes each conjunct independently, and replaces the
//! span's entity set with the per-conjunct results when every conjunct
//! resolves. Like the relative consistency pass it is two-phase: decisions
//! are collected over the whole batch before any span is rewritten.

use std::sync::Arc;

use crate::lexicon::{Entity, Lexicon};
use crate::model::{MentionFeaturizer, NormalizerSet};
use crate::types::ProcessingUnit;

const COORDINATORS: [&str; 3] = [" and ", " or ", "/"];

/// Minimum conjuncts for a span to count as coordinated.
const MIN_CONJUNCTS: usize = 2;

struct Decision {
    unit_idx: usize,
    span_idx: usize,
    entities: Vec<Arc<Entity>>,
    score: f64,
}

/// Coordination merge pass.
pub struct CoordinationMerge {
    min_conjunct_score: f64,
    featurizer: Arc<MentionFeaturizer>,
    normalizers: Arc<NormalizerSet>,
    lexicon: Arc<Lexicon>,
}

impl CoordinationMerge {
    /// Create the pass; conjuncts scoring below `min_conjunct_score` veto
    /// the merge for their span.
    #[must_use]
    pub fn new(
        min_conjunct_score: f64,
        featurizer: Arc<MentionFeaturizer>,
        normalizers: Arc<NormalizerSet>,
        lexicon: Arc<Lexicon>,
    ) -> Self {
        Self {
            min_conjunct_score,
            featurizer,
            normalizers,
            lexicon,
        }
    }

    /// Apply the pass to the whole batch.
    pub fn apply(&self, units: &mut [ProcessingUnit]) {
        let decisions = self.collect(units);
        for d in decisions {
            if let Some(spans) = units[d.unit_idx].best_prediction_mut() {
                if let Some(span) = spans.get_mut(d.span_idx) {
                    span.entities = d.entities;
                    span.score = d.score;
                }
            }
        }
    }

    fn collect(&self, units: &[ProcessingUnit]) -> Vec<Decision> {
        let mut decisions = Vec::new();
        for (unit_idx, unit) in units.iter().enumerate() {
            for (span_idx, span) in unit.best_prediction().iter().enumerate() {
                let conjuncts = split_conjuncts(&span.text);
                if conjuncts.len() < MIN_CONJUNCTS {
                    continue;
                }
                let Some(normalizer) = self.normalizers.get(&span.entity_class) else {
                    continue;
                };
                let mut entities: Vec<Arc<Entity>> = Vec::new();
                let mut worst = f64::INFINITY;
                let mut complete = true;
                for conjunct in &conjuncts {
                    let vector = self.featurizer.vectorize(conjunct);
                    let ranked = normalizer.find_best(&vector, &self.lexicon, 1);
                    match ranked.best() {
                        Some((score, entity)) if score >= self.min_conjunct_score => {
                            if !entities
                                .iter()
                                .any(|e| e.primary_identifier == entity.primary_identifier)
                            {
                                entities.push(Arc::clone(entity));
                            }
                            worst = worst.min(score);
                        }
                        _ => {
                            complete = false;
                            break;
                        }
                    }
                }
                if complete && entities.len() >= MIN_CONJUNCTS {
                    log::debug!(
                        "Coordination: '{}' -> {} entities",
                        span.text,
                        entities.len()
                    );
                    decisions.push(Decision {
                        unit_idx,
                        span_idx,
                        entities,
                        score: worst,
                    });
                }
            }
        }
        decisions
    }
}

fn split_conjuncts(text: &str) -> Vec<String> {
    let mut parts = vec![text.to_string()];
    for sep in COORDINATORS {
        parts = parts
            .into_iter()
            .flat_map(|p| {
                p.split(sep)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
    }
    parts
        .into_iter()
        .flat_map(|p| p.split(", ").map(str::to_string).collect::<Vec<_>>())
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::join_identifiers;
    use crate::model::{CachedNormalizer, NameEntry, NormalizationModel};
    use crate::types::AnnotatedSpan;
    use std::collections::HashMap;

    #[test]
    fn split_handles_mixed_coordinators() {
        assert_eq!(
            split_conjuncts("breast and ovarian cancer"),
            vec!["breast", "ovarian cancer"]
        );
        assert_eq!(split_conjuncts("renal/hepatic"), vec!["renal", "hepatic"]);
        assert_eq!(split_conjuncts("single"), vec!["single"]);
    }

    #[test]
    fn merge_replaces_entity_set_with_conjunct_entities() {
        let vocab: HashMap<String, u32> = ["renal", "hepatic", "failure"]
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32))
            .collect();
        let featurizer = Arc::new(MentionFeaturizer::new(vocab));

        let mut lexicon = Lexicon::new();
        lexicon.register_class("Disease");
        lexicon.insert(Entity::new("MESH:D051437", "renal failure", "Disease"));
        lexicon.insert(Entity::new("MESH:D017093", "hepatic failure", "Disease"));
        let lexicon = Arc::new(lexicon);

        let entries = vec![
            NameEntry {
                vector: featurizer.vectorize("renal"),
                entity_id: "MESH:D051437".into(),
            },
            NameEntry {
                vector: featurizer.vectorize("hepatic"),
                entity_id: "MESH:D017093".into(),
            },
        ];
        let set = Arc::new(NormalizerSet::new(
            [(
                "Disease".to_string(),
                CachedNormalizer::new(NormalizationModel::averaged(entries), 8),
            )]
            .into_iter()
            .collect(),
        ));

        let mut unit = ProcessingUnit::new("d", "renal/hepatic", 0);
        unit.predictions.add(
            0.3,
            vec![AnnotatedSpan::new(0, 13, "renal/hepatic", "Disease", vec![], 0.3)],
        );
        let mut units = vec![unit];

        CoordinationMerge::new(0.1, featurizer, set, lexicon).apply(&mut units);
        let span = &units[0].best_prediction()[0];
        assert_eq!(
            join_identifiers(&span.entities).as_deref(),
            Some("MESH:D017093|MESH:D051437")
        );
    }
}
