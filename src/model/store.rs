//! Loading and saving the serialized prediction pipeline.
//!
//! The model file is gzip-compressed bincode of [`StoredModel`]. The stored
//! shape is a strongly-typed structure with named fields — the segmenter, the
//! featurizer, the lexicon, and the annotator are addressed by name, and a
//! shape problem surfaces as a named-field diagnostic at load time. An
//! explicit schema version tag guards against loading a blob written by an
//! incompatible build; mismatches are rejected outright rather than migrated.
//!
//! Loading never returns a partial pipeline: every validation runs before the
//! first stage is constructed.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::model::{CachedNormalizer, MentionFeaturizer, NormalizerSet, RecognitionModel};
use crate::pipeline::stages::{
    AbbreviationExpander, Annotator, Segmenter, SegmentMentionFeaturizer, Tokenizer,
};
use crate::pipeline::ProcessingPipeline;

/// Current model blob schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Stored segmenter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterSpec {
    /// Maximum segment length in tokens.
    pub max_segment_length: usize,
}

/// Stored annotator: the recognition predictor plus the per-entity-class
/// normalization predictors, each behind its result cache.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnnotatorSpec {
    /// Recognition predictor.
    pub recognition: RecognitionModel,
    /// Per-entity-class normalization predictors.
    pub normalizers: HashMap<String, CachedNormalizer>,
}

/// The full serialized pipeline.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredModel {
    /// Blob schema version; must equal [`SCHEMA_VERSION`].
    pub schema_version: u32,
    /// Segmenter configuration.
    pub segmenter: SegmenterSpec,
    /// Mention featurizer with its trained vocabulary.
    pub featurizer: MentionFeaturizer,
    /// Shared entity lexicon.
    pub lexicon: Lexicon,
    /// The annotator predictors.
    pub annotator: AnnotatorSpec,
}

/// Options controlling how a stored model becomes a runnable pipeline.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Replace trainable predictors with compiled equivalents.
    pub compile: bool,
    /// Requested maximum segment length; only ever widens the stored value.
    pub max_segment_length: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            compile: true,
            max_segment_length: None,
        }
    }
}

/// A runnable pipeline plus the shared references other components need.
pub struct LoadedModel {
    /// The ordered annotation pipeline.
    pub pipeline: ProcessingPipeline,
    /// Shared entity lexicon.
    pub lexicon: Arc<Lexicon>,
    /// Shared mention featurizer.
    pub featurizer: Arc<MentionFeaturizer>,
    /// Shared per-class normalization predictors.
    pub normalizers: Arc<NormalizerSet>,
    /// Maximum segment length in effect after widening.
    pub max_segment_length: usize,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("max_segment_length", &self.max_segment_length)
            .finish_non_exhaustive()
    }
}

/// Write a model blob.
pub fn save(path: &Path, model: &StoredModel) -> Result<()> {
    let bytes = bincode::serialize(model)
        .map_err(|e| Error::model_load(format!("failed to encode model: {e}")))?;
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&bytes)?;
    encoder.finish()?;
    Ok(())
}

/// Load, validate, optionally widen, and optionally compile a model blob.
pub fn load(path: &Path, options: &LoadOptions) -> Result<LoadedModel> {
    log::info!("Loading model from {}", path.display());
    let file = File::open(path)
        .map_err(|e| Error::model_load(format!("cannot open {}: {e}", path.display())))?;
    let mut decoder = GzDecoder::new(file);
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| Error::model_load(format!("cannot decompress {}: {e}", path.display())))?;
    let mut stored: StoredModel = bincode::deserialize(&bytes)
        .map_err(|e| Error::model_load(format!("corrupt model blob {}: {e}", path.display())))?;

    if stored.schema_version != SCHEMA_VERSION {
        return Err(Error::model_load(format!(
            "schema version mismatch in {}: found {}, expected {}",
            path.display(),
            stored.schema_version,
            SCHEMA_VERSION
        )));
    }
    validate(&stored)?;

    // Segment length may only widen.
    if let Some(requested) = options.max_segment_length {
        let current = stored.segmenter.max_segment_length;
        if requested > current {
            log::info!("Increasing maximum segment length from {current} to {requested}");
            stored.segmenter.max_segment_length = requested;
        } else {
            log::info!("Retaining current maximum segment length ({current})");
        }
    }

    let recognition;
    let normalizers;
    if options.compile {
        log::info!("Compiling model");
        recognition = stored.annotator.recognition.compile();
        normalizers = NormalizerSet::new(
            stored
                .annotator
                .normalizers
                .iter()
                .map(|(class, cached)| (class.clone(), cached.compile()))
                .collect(),
        );
    } else {
        recognition = stored.annotator.recognition;
        normalizers = NormalizerSet::new(stored.annotator.normalizers);
    }

    let lexicon = Arc::new(stored.lexicon);
    let featurizer = Arc::new(stored.featurizer);
    let normalizers = Arc::new(normalizers);
    let max_segment_length = stored.segmenter.max_segment_length;

    let pipeline = ProcessingPipeline::new(vec![
        Box::new(Tokenizer),
        Box::new(Segmenter::new(max_segment_length)),
        Box::new(AbbreviationExpander),
        Box::new(SegmentMentionFeaturizer::new(Arc::clone(&featurizer))),
        Box::new(Annotator::new(
            Arc::clone(&lexicon),
            recognition,
            Arc::clone(&normalizers),
        )),
    ]);
    log::debug!("Pipeline stages: {:?}", pipeline.stage_names());
    log::info!(
        "Model ready: {} entity classes, {} lexicon entries, {} vocabulary terms, \
         max segment length {}",
        normalizers.classes().len(),
        lexicon.len(),
        featurizer.vocabulary_len(),
        max_segment_length
    );

    Ok(LoadedModel {
        pipeline,
        lexicon,
        featurizer,
        normalizers,
        max_segment_length,
    })
}

fn validate(stored: &StoredModel) -> Result<()> {
    if stored.segmenter.max_segment_length == 0 {
        return Err(Error::model_load("segmenter: max_segment_length must be positive"));
    }
    if stored.annotator.normalizers.is_empty() {
        return Err(Error::model_load("annotator: no normalization predictors"));
    }
    for class in stored.annotator.normalizers.keys() {
        if !stored
            .annotator
            .recognition
            .entity_classes()
            .iter()
            .any(|c| c == class)
        {
            return Err(Error::model_load(format!(
                "annotator: normalizer class '{class}' unknown to the recognition predictor"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::Entity;
    use crate::model::{NameEntry, NormalizationModel};
    use crate::types::SparseVector;

    fn tiny_model() -> StoredModel {
        let vocab: HashMap<String, u32> = [("heart", 0u32), ("failure", 1), ("chf", 2)]
            .iter()
            .map(|(t, i)| (t.to_string(), *i))
            .collect();
        let featurizer = MentionFeaturizer::new(vocab);

        let mut lexicon = Lexicon::new();
        lexicon.register_class("Disease");
        lexicon.insert(Entity::new("MESH:D006333", "heart failure", "Disease"));

        let normalizer = CachedNormalizer::new(
            NormalizationModel::averaged(vec![NameEntry {
                vector: featurizer.vectorize("heart failure"),
                entity_id: "MESH:D006333".into(),
            }]),
            32,
        );
        let recognition = RecognitionModel::Averaged(crate::model::RecognitionWeights::new(
            [(
                "Disease".to_string(),
                SparseVector::from_pairs(vec![(0, 1.0), (1, 1.0), (2, 1.0)]),
            )]
            .into_iter()
            .collect(),
        ));

        StoredModel {
            schema_version: SCHEMA_VERSION,
            segmenter: SegmenterSpec {
                max_segment_length: 5,
            },
            featurizer,
            lexicon,
            annotator: AnnotatorSpec {
                recognition,
                normalizers: [("Disease".to_string(), normalizer)].into_iter().collect(),
            },
        }
    }

    #[test]
    fn round_trip_and_compile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gz");
        save(&path, &tiny_model()).unwrap();

        let loaded = load(&path, &LoadOptions::default()).unwrap();
        assert_eq!(loaded.max_segment_length, 5);
        assert_eq!(loaded.normalizers.classes(), vec!["Disease"]);
        assert!(loaded.normalizers.get("Disease").unwrap().model().is_compiled());
        assert_eq!(loaded.normalizers.get("Disease").unwrap().capacity(), 32);
    }

    #[test]
    fn uncompiled_load_retains_trainable_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gz");
        save(&path, &tiny_model()).unwrap();

        let options = LoadOptions {
            compile: false,
            ..LoadOptions::default()
        };
        let loaded = load(&path, &options).unwrap();
        assert!(!loaded.normalizers.get("Disease").unwrap().model().is_compiled());
    }

    #[test]
    fn segment_length_only_widens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gz");
        save(&path, &tiny_model()).unwrap();

        let shrink = LoadOptions {
            max_segment_length: Some(2),
            ..LoadOptions::default()
        };
        assert_eq!(load(&path, &shrink).unwrap().max_segment_length, 5);

        let widen = LoadOptions {
            max_segment_length: Some(9),
            ..LoadOptions::default()
        };
        assert_eq!(load(&path, &widen).unwrap().max_segment_length, 9);
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gz");
        let mut model = tiny_model();
        model.schema_version = SCHEMA_VERSION + 1;
        save(&path, &model).unwrap();

        let err = load(&path, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
        assert!(err.to_string().contains("schema version"));
    }

    #[test]
    fn unreadable_blob_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gz");
        std::fs::write(&path, b"not a gzip stream").unwrap();
        assert!(matches!(
            load(&path, &LoadOptions::default()),
            Err(Error::ModelLoad(_))
        ));
    }
}
