//! Prediction models: recognition, normalization, caching, compilation.
//!
//! Predictors exist in two operational variants. The trainable form carries
//! the full averaged weight structure; `compile()` is a one-way transform
//! producing an inference-only form that scores identically but faster
//! (pruned weights for recognition, an inverted index for normalization).
//! The variant set is closed — models are stored as tagged enums, so an
//! unresolvable predictor type is a deserialization failure at load time,
//! not a latent runtime surprise.

pub mod store;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::lexicon::Lexicon;
use crate::types::{MentionName, RankedList, SparseVector};

/// Weights below this magnitude are dropped when compiling recognition.
const PRUNE_EPSILON: f64 = 1e-9;

/// Scores within this factor of the best are kept as tied candidates.
const TIE_EPSILON: f64 = 1e-9;

// =============================================================================
// Mention featurization
// =============================================================================

/// Maps mention text onto a sparse vector over a trained vocabulary.
///
/// The vocabulary is fixed at training time and shipped inside the model
/// blob; unknown tokens simply contribute nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionFeaturizer {
    vocabulary: HashMap<String, u32>,
}

impl MentionFeaturizer {
    /// Create a featurizer over a fixed vocabulary.
    #[must_use]
    pub fn new(vocabulary: HashMap<String, u32>) -> Self {
        Self { vocabulary }
    }

    /// Lowercased alphanumeric tokens of `text`.
    #[must_use]
    pub fn split_tokens(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        for c in text.chars() {
            if c.is_alphanumeric() {
                current.extend(c.to_lowercase());
            } else if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }

    /// Bag-of-tokens vector for `text`, scaled by total token count so that
    /// out-of-vocabulary tokens dilute the vector instead of vanishing.
    ///
    /// An exact match against an equally-built name vector scores 1.0.
    #[must_use]
    pub fn vectorize(&self, text: &str) -> SparseVector {
        let tokens = Self::split_tokens(text);
        if tokens.is_empty() {
            return SparseVector::default();
        }
        let scale = 1.0 / (tokens.len() as f64).sqrt();
        let pairs = tokens
            .iter()
            .filter_map(|t| self.vocabulary.get(t).map(|&i| (i, scale)))
            .collect();
        SparseVector::from_pairs(pairs)
    }

    /// Fill a mention's tokens and feature vector in place.
    pub fn process(&self, mention: &mut MentionName) {
        mention.tokens = Self::split_tokens(&mention.text);
        mention.vector = Some(self.vectorize(&mention.text));
    }

    /// Vocabulary size.
    #[must_use]
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }
}

// =============================================================================
// Recognition
// =============================================================================

/// Per-class linear weights for mention recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionWeights {
    classes: Vec<String>,
    weights: HashMap<String, SparseVector>,
}

impl RecognitionWeights {
    /// Create weights for the given classes.
    #[must_use]
    pub fn new(weights: HashMap<String, SparseVector>) -> Self {
        let mut classes: Vec<String> = weights.keys().cloned().collect();
        classes.sort_unstable();
        Self { classes, weights }
    }
}

/// Recognition predictor in its trainable or compiled form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecognitionModel {
    /// Trainable (averaged-weight) form.
    Averaged(RecognitionWeights),
    /// Inference-only form with near-zero weights pruned.
    Compiled(RecognitionWeights),
}

impl RecognitionModel {
    /// Entity classes this predictor can assign.
    #[must_use]
    pub fn entity_classes(&self) -> &[String] {
        match self {
            RecognitionModel::Averaged(w) | RecognitionModel::Compiled(w) => &w.classes,
        }
    }

    /// Score a feature vector for one entity class.
    #[must_use]
    pub fn score(&self, class: &str, features: &SparseVector) -> f64 {
        match self {
            RecognitionModel::Averaged(w) | RecognitionModel::Compiled(w) => {
                w.weights.get(class).map_or(0.0, |wv| wv.dot(features))
            }
        }
    }

    /// One-way transform into the inference-only form.
    #[must_use]
    pub fn compile(&self) -> RecognitionModel {
        match self {
            RecognitionModel::Compiled(w) => RecognitionModel::Compiled(w.clone()),
            RecognitionModel::Averaged(w) => {
                let pruned = w
                    .weights
                    .iter()
                    .map(|(class, wv)| {
                        let entries = wv
                            .entries()
                            .iter()
                            .copied()
                            .filter(|&(_, v)| v.abs() > PRUNE_EPSILON)
                            .collect();
                        (class.clone(), SparseVector::from_pairs(entries))
                    })
                    .collect();
                RecognitionModel::Compiled(RecognitionWeights {
                    classes: w.classes.clone(),
                    weights: pruned,
                })
            }
        }
    }

    /// Whether this is the inference-only form.
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        matches!(self, RecognitionModel::Compiled(_))
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// One lexicon name's feature vector and owning entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameEntry {
    /// Feature vector of the entity name.
    pub vector: SparseVector,
    /// Primary identifier of the owning entity.
    pub entity_id: String,
}

/// Trainable normalization form: scored by linear scan over name vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AveragedNormalizer {
    entries: Vec<NameEntry>,
}

/// Compiled normalization form: scored through an inverted feature index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledNormalizer {
    entries: Vec<NameEntry>,
    index: HashMap<u32, Vec<(u32, f64)>>,
}

/// Normalization predictor in its trainable or compiled form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NormalizationModel {
    /// Trainable (averaged) form.
    Averaged(AveragedNormalizer),
    /// Inference-only form.
    Compiled(CompiledNormalizer),
}

impl NormalizationModel {
    /// Trainable model over the given name entries.
    #[must_use]
    pub fn averaged(entries: Vec<NameEntry>) -> Self {
        NormalizationModel::Averaged(AveragedNormalizer { entries })
    }

    fn entries(&self) -> &[NameEntry] {
        match self {
            NormalizationModel::Averaged(m) => &m.entries,
            NormalizationModel::Compiled(m) => &m.entries,
        }
    }

    fn scores(&self, vector: &SparseVector) -> Vec<(usize, f64)> {
        match self {
            NormalizationModel::Averaged(m) => m
                .entries
                .iter()
                .enumerate()
                .filter_map(|(i, e)| {
                    let s = e.vector.dot(vector);
                    (s > 0.0).then_some((i, s))
                })
                .collect(),
            NormalizationModel::Compiled(m) => {
                let mut acc: HashMap<u32, f64> = HashMap::new();
                for &(feature, value) in vector.entries() {
                    if let Some(postings) = m.index.get(&feature) {
                        for &(entry, weight) in postings {
                            *acc.entry(entry).or_insert(0.0) += weight * value;
                        }
                    }
                }
                acc.into_iter()
                    .filter(|&(_, s)| s > 0.0)
                    .map(|(i, s)| (i as usize, s))
                    .collect()
            }
        }
    }

    /// Fill `best` with the top entities for a mention vector.
    ///
    /// An empty result is a normal outcome (the mention is unknown), not an
    /// error.
    pub fn find_best(
        &self,
        vector: &SparseVector,
        lexicon: &Lexicon,
        best: &mut RankedList<Arc<crate::lexicon::Entity>>,
    ) {
        let entries = self.entries();
        let mut scored = self.scores(vector);
        // Deterministic order for equal scores
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| entries[a.0].entity_id.cmp(&entries[b.0].entity_id))
        });
        for (idx, score) in scored {
            if let Some(entity) = lexicon.get(&entries[idx].entity_id) {
                if !best.add(score, Arc::clone(entity)) {
                    break;
                }
            }
        }
    }

    /// One-way transform into the inference-only form.
    #[must_use]
    pub fn compile(&self) -> NormalizationModel {
        match self {
            NormalizationModel::Compiled(m) => NormalizationModel::Compiled(m.clone()),
            NormalizationModel::Averaged(m) => {
                let mut index: HashMap<u32, Vec<(u32, f64)>> = HashMap::new();
                for (entry_idx, entry) in m.entries.iter().enumerate() {
                    for &(feature, weight) in entry.vector.entries() {
                        index
                            .entry(feature)
                            .or_default()
                            .push((entry_idx as u32, weight));
                    }
                }
                NormalizationModel::Compiled(CompiledNormalizer {
                    entries: m.entries.clone(),
                    index,
                })
            }
        }
    }

    /// Whether this is the inference-only form.
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        matches!(self, NormalizationModel::Compiled(_))
    }
}

// =============================================================================
// Result caching
// =============================================================================

type CacheKey = Vec<(u32, u64)>;
type CachedResult = Vec<(f64, String)>;

/// A normalization predictor behind a bounded result cache.
///
/// The cache is keyed on the input feature vector. When it reaches capacity
/// it is dropped wholesale rather than evicted entry by entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedNormalizer {
    model: NormalizationModel,
    capacity: usize,
    #[serde(skip)]
    cache: Mutex<HashMap<CacheKey, CachedResult>>,
}

impl CachedNormalizer {
    /// Wrap a model with a cache of the given capacity.
    #[must_use]
    pub fn new(model: NormalizationModel, capacity: usize) -> Self {
        Self {
            model,
            capacity,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Cache capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The wrapped model.
    #[must_use]
    pub fn model(&self) -> &NormalizationModel {
        &self.model
    }

    /// Unwrap, compile, and rewrap in a fresh cache of identical capacity.
    #[must_use]
    pub fn compile(&self) -> CachedNormalizer {
        CachedNormalizer::new(self.model.compile(), self.capacity)
    }

    /// Top candidates for a mention vector, at most `max_rank` of them.
    pub fn find_best(
        &self,
        vector: &SparseVector,
        lexicon: &Lexicon,
        max_rank: usize,
    ) -> RankedList<Arc<crate::lexicon::Entity>> {
        let key = vector.cache_key();
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                let mut best = RankedList::new(max_rank);
                for (score, id) in hit {
                    if let Some(entity) = lexicon.get(id) {
                        best.add(*score, Arc::clone(entity));
                    }
                }
                return best;
            }
        }
        let mut best = RankedList::new(max_rank);
        self.model.find_best(vector, lexicon, &mut best);
        if let Ok(mut cache) = self.cache.lock() {
            if cache.len() >= self.capacity {
                cache.clear();
            }
            cache.insert(
                key,
                best.iter()
                    .map(|(s, e)| (s, e.primary_identifier.clone()))
                    .collect(),
            );
        }
        best
    }
}

/// The per-entity-class normalization predictors of a loaded model.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NormalizerSet {
    models: HashMap<String, CachedNormalizer>,
}

impl NormalizerSet {
    /// Build from per-class cached normalizers.
    #[must_use]
    pub fn new(models: HashMap<String, CachedNormalizer>) -> Self {
        Self { models }
    }

    /// Normalizer for one entity class.
    #[must_use]
    pub fn get(&self, class: &str) -> Option<&CachedNormalizer> {
        self.models.get(class)
    }

    /// Registered entity classes, sorted.
    #[must_use]
    pub fn classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self.models.keys().map(String::as_str).collect();
        classes.sort_unstable();
        classes
    }

    /// Best candidate across all classes, for class-free lookups.
    pub fn find_best_any(
        &self,
        vector: &SparseVector,
        lexicon: &Lexicon,
    ) -> Option<(String, f64, Arc<crate::lexicon::Entity>)> {
        let mut best: Option<(String, f64, Arc<crate::lexicon::Entity>)> = None;
        for class in self.classes() {
            let ranked = self.models[class].find_best(vector, lexicon, 1);
            if let Some((score, entity)) = ranked.best() {
                let better = best.as_ref().map_or(true, |(_, s, _)| score > *s);
                if better {
                    best = Some((class.to_string(), score, Arc::clone(entity)));
                }
            }
        }
        best
    }
}

/// Candidates whose score ties the best, for building a span's entity set.
#[must_use]
pub fn tied_best(ranked: &RankedList<Arc<crate::lexicon::Entity>>) -> Vec<Arc<crate::lexicon::Entity>> {
    let Some((top, _)) = ranked.best() else {
        return Vec::new();
    };
    ranked
        .iter()
        .take_while(|(s, _)| (top - s).abs() <= TIE_EPSILON * top.abs().max(1.0))
        .map(|(_, e)| Arc::clone(e))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::Entity;

    fn featurizer() -> MentionFeaturizer {
        let vocab: HashMap<String, u32> = ["congestive", "heart", "failure", "chf", "diabetes"]
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32))
            .collect();
        MentionFeaturizer::new(vocab)
    }

    fn lexicon() -> Lexicon {
        let mut lex = Lexicon::new();
        lex.register_class("Disease");
        lex.insert(Entity::new("MESH:D006333", "congestive heart failure", "Disease"));
        lex.insert(Entity::new("MESH:D003920", "diabetes mellitus", "Disease"));
        lex
    }

    fn normalizer(f: &MentionFeaturizer) -> NormalizationModel {
        NormalizationModel::averaged(vec![
            NameEntry {
                vector: f.vectorize("congestive heart failure"),
                entity_id: "MESH:D006333".into(),
            },
            NameEntry {
                vector: f.vectorize("diabetes mellitus"),
                entity_id: "MESH:D003920".into(),
            },
        ])
    }

    #[test]
    fn averaged_and_compiled_score_identically() {
        let f = featurizer();
        let lex = lexicon();
        let trainable = normalizer(&f);
        let compiled = trainable.compile();
        assert!(compiled.is_compiled());

        let query = f.vectorize("heart failure");
        let mut a = RankedList::new(5);
        let mut b = RankedList::new(5);
        trainable.find_best(&query, &lex, &mut a);
        compiled.find_best(&query, &lex, &mut b);

        assert_eq!(a.len(), b.len());
        for rank in 0..a.len() {
            assert!((a.score(rank).unwrap() - b.score(rank).unwrap()).abs() < 1e-12);
            assert_eq!(
                a.item(rank).unwrap().primary_identifier,
                b.item(rank).unwrap().primary_identifier
            );
        }
    }

    #[test]
    fn cache_round_trip_returns_same_result() {
        let f = featurizer();
        let lex = lexicon();
        let cached = CachedNormalizer::new(normalizer(&f), 16);
        let query = f.vectorize("congestive heart failure");

        let first = cached.find_best(&query, &lex, 3);
        let second = cached.find_best(&query, &lex, 3);
        assert_eq!(first.len(), second.len());
        assert_eq!(
            first.item(0).unwrap().primary_identifier,
            second.item(0).unwrap().primary_identifier
        );
    }

    #[test]
    fn compile_keeps_cache_capacity() {
        let f = featurizer();
        let cached = CachedNormalizer::new(normalizer(&f), 77);
        let compiled = cached.compile();
        assert_eq!(compiled.capacity(), 77);
        assert!(compiled.model().is_compiled());
    }

    #[test]
    fn unknown_mention_yields_empty_candidates() {
        let f = featurizer();
        let lex = lexicon();
        let cached = CachedNormalizer::new(normalizer(&f), 4);
        let ranked = cached.find_best(&f.vectorize("zzz unrelated"), &lex, 3);
        assert!(ranked.is_empty());
    }
}
