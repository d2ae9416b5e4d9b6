//! Document annotation runner.
//!
//! Bundles the loaded pipeline, the correction chain, and the abbreviation
//! sources behind one call per document: build the document context, run the
//! pipeline over the units, then apply the correction chain to the batch.

use std::sync::Arc;

use crate::abbrev::{build_context, AbbreviationSource, ContextSet, DocContext};
use crate::error::Result;
use crate::lexicon::Lexicon;
use crate::model::store::LoadedModel;
use crate::model::{MentionFeaturizer, NormalizerSet};
use crate::pipeline::stages::FeatureReclaimer;
use crate::pipeline::{PipelineStage, StageTimer};
use crate::postprocess::CorrectionChain;
use crate::sentence::SentenceBreaker;
use crate::types::ProcessingUnit;

/// Runs the annotation pipeline and correction chain per document.
pub struct AnnotationRunner {
    pipeline: StageTimer,
    reclaimer: FeatureReclaimer,
    chain: CorrectionChain,
    sources: Vec<Box<dyn AbbreviationSource>>,
    breaker: Option<SentenceBreaker>,
    lexicon: Arc<Lexicon>,
    featurizer: Arc<MentionFeaturizer>,
    normalizers: Arc<NormalizerSet>,
}

impl AnnotationRunner {
    /// Assemble a runner from a loaded model.
    #[must_use]
    pub fn new(
        model: LoadedModel,
        chain: CorrectionChain,
        sources: Vec<Box<dyn AbbreviationSource>>,
        use_sentence_breaker: bool,
    ) -> Self {
        Self {
            pipeline: StageTimer::new("annotation-pipeline", Box::new(model.pipeline)),
            reclaimer: FeatureReclaimer,
            chain,
            sources,
            breaker: use_sentence_breaker.then(SentenceBreaker::new),
            lexicon: model.lexicon,
            featurizer: model.featurizer,
            normalizers: model.normalizers,
        }
    }

    /// Shared entity lexicon.
    #[must_use]
    pub fn lexicon(&self) -> &Arc<Lexicon> {
        &self.lexicon
    }

    /// Shared mention featurizer.
    #[must_use]
    pub fn featurizer(&self) -> &Arc<MentionFeaturizer> {
        &self.featurizer
    }

    /// Shared normalization predictors.
    #[must_use]
    pub fn normalizers(&self) -> &Arc<NormalizerSet> {
        &self.normalizers
    }

    /// Notify sources that a new input file is about to be converted.
    pub fn prepare_file(&mut self, file_name: &str) -> Result<()> {
        for source in &mut self.sources {
            source.prepare_file(file_name)?;
        }
        Ok(())
    }

    /// Build the abbreviation context for one document.
    pub fn context_for(&self, doc_id: &str) -> Result<DocContext> {
        let ctx = build_context(&self.sources, doc_id)?;
        if !ctx.abbreviations.is_empty() {
            log::debug!(
                "Document {}: {} abbreviations in scope",
                doc_id,
                ctx.abbreviations.len()
            );
        }
        Ok(ctx)
    }

    /// Fan units out into sentences when sentence breaking is enabled.
    #[must_use]
    pub fn fan_out(&self, units: Vec<ProcessingUnit>) -> Vec<ProcessingUnit> {
        match &self.breaker {
            Some(breaker) => breaker.break_units(units),
            None => units,
        }
    }

    /// Annotate one document's units: pipeline, correction chain, reclaim.
    pub fn annotate_document(&self, doc_id: &str, units: &mut [ProcessingUnit]) -> Result<()> {
        let ctx = self.context_for(doc_id)?;
        self.pipeline.process_all(units, &ctx)?;
        let contexts = ContextSet::from_single(ctx);
        self.chain.apply(units, &contexts)?;
        self.reclaimer.process_all(units, contexts.get(doc_id))?;
        Ok(())
    }
}
