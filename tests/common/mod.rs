//! Shared fixtures: a tiny but fully functional stored model.

use std::collections::HashMap;
use std::path::Path;

use biotag::lexicon::{Entity, Lexicon};
use biotag::model::store::{self, AnnotatorSpec, SegmenterSpec, StoredModel, SCHEMA_VERSION};
use biotag::model::{
    CachedNormalizer, MentionFeaturizer, NameEntry, NormalizationModel, RecognitionModel,
    RecognitionWeights,
};
use biotag::types::SparseVector;

pub const VOCAB: &[&str] = &[
    "congestive",
    "heart",
    "failure",
    "diabetes",
    "mellitus",
    "arrhythmia",
];

/// A model that recognizes disease-vocabulary mentions and normalizes
/// "congestive heart failure" and "diabetes mellitus". "arrhythmia" is
/// recognized but has no normalization target, so it surfaces with only the
/// unknown-state placeholder.
pub fn stored_model() -> StoredModel {
    let vocabulary: HashMap<String, u32> = VOCAB
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), i as u32))
        .collect();
    let featurizer = MentionFeaturizer::new(vocabulary);

    let mut lexicon = Lexicon::new();
    lexicon.register_class("Disease");
    lexicon.insert(Entity::new("MESH:D006333", "congestive heart failure", "Disease"));
    lexicon.insert(Entity::new("MESH:D003920", "diabetes mellitus", "Disease"));

    let weights: SparseVector =
        SparseVector::from_pairs((0..VOCAB.len() as u32).map(|i| (i, 1.0)).collect());
    let recognition = RecognitionModel::Averaged(RecognitionWeights::new(
        [("Disease".to_string(), weights)].into_iter().collect(),
    ));

    let normalizer = CachedNormalizer::new(
        NormalizationModel::averaged(vec![
            NameEntry {
                vector: featurizer.vectorize("congestive heart failure"),
                entity_id: "MESH:D006333".into(),
            },
            NameEntry {
                vector: featurizer.vectorize("diabetes mellitus"),
                entity_id: "MESH:D003920".into(),
            },
        ]),
        64,
    );

    StoredModel {
        schema_version: SCHEMA_VERSION,
        segmenter: SegmenterSpec {
            max_segment_length: 3,
        },
        featurizer,
        lexicon,
        annotator: AnnotatorSpec {
            recognition,
            normalizers: [("Disease".to_string(), normalizer)].into_iter().collect(),
        },
    }
}

/// Write the fixture model under `dir` and return its path.
pub fn write_model(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("model.gz");
    store::save(&path, &stored_model()).expect("write fixture model");
    path
}
