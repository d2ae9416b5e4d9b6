//! Evaluation assembly.
//!
//! A single ordered batch of scoring and analysis stages shares one pass
//! over the processed unit stream — each unit is visited exactly once per
//! stage, and the memory-reclaiming stage always runs last.

pub mod analysis;
pub mod bootstrap;
pub mod scorers;

pub use bootstrap::BootstrapScorer;
pub use scorers::{
    AnnotationScorer, BoundaryMatch, Counts, IdentityMatch, InstanceScorer, MacroInstanceScorer,
    Scorer,
};

use std::path::PathBuf;

use crate::abbrev::DocContext;
use crate::error::Result;
use crate::pipeline::stages::FeatureReclaimer;
use crate::pipeline::PipelineStage;
use crate::types::ProcessingUnit;

/// One stage of the evaluation batch.
pub trait EvalStage {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Visit the batch once.
    fn process_batch(&mut self, units: &mut [ProcessingUnit]);

    /// Called after the pass completes, for stages that write artifacts.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Report line(s) for the log, if any.
    fn report(&self) -> Option<String>;
}

/// Adapter exposing any [`Scorer`] as an [`EvalStage`].
pub struct ScorerStage<S: Scorer> {
    scorer: S,
}

impl<S: Scorer> ScorerStage<S> {
    /// Wrap a scorer.
    #[must_use]
    pub fn new(scorer: S) -> Self {
        Self { scorer }
    }
}

impl<S: Scorer> EvalStage for ScorerStage<S> {
    fn name(&self) -> &'static str {
        "scorer"
    }

    fn process_batch(&mut self, units: &mut [ProcessingUnit]) {
        for unit in units.iter() {
            self.scorer.add_unit(unit);
        }
    }

    fn report(&self) -> Option<String> {
        Some(self.scorer.detail())
    }
}

impl EvalStage for BootstrapScorer {
    fn name(&self) -> &'static str {
        "bootstrap"
    }

    fn process_batch(&mut self, units: &mut [ProcessingUnit]) {
        self.run(units);
    }

    fn report(&self) -> Option<String> {
        Some(self.detail())
    }
}

/// Final stage: drop per-token/per-segment feature state.
struct ReclaimStage;

impl EvalStage for ReclaimStage {
    fn name(&self) -> &'static str {
        "feature-reclaimer"
    }

    fn process_batch(&mut self, units: &mut [ProcessingUnit]) {
        // The reclaimer is context-free.
        let ctx = DocContext::empty("");
        if let Err(e) = FeatureReclaimer.process_all(units, &ctx) {
            log::warn!("Feature reclaim failed: {e}");
        }
    }

    fn report(&self) -> Option<String> {
        None
    }
}

/// Evaluation batch configuration.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Resample count for the bootstrap wrappers.
    pub bootstrap_iterations: usize,
    /// Seed for the bootstrap resampler.
    pub bootstrap_seed: u64,
    /// Optional HTML diff view target.
    pub analysis_file: Option<PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            bootstrap_iterations: 100,
            bootstrap_seed: 42,
            analysis_file: None,
        }
    }
}

/// The ordered evaluation stage batch.
pub struct EvalBatch {
    stages: Vec<Box<dyn EvalStage>>,
}

impl EvalBatch {
    /// Compose stages in order.
    #[must_use]
    pub fn new(stages: Vec<Box<dyn EvalStage>>) -> Self {
        Self { stages }
    }

    /// The reference assembly: annotation scorers crossed over boundary and
    /// identity semantics, instance and macro-instance scorers, bootstrap
    /// wrappers around the exact/class annotation scorer and the instance
    /// scorer, the frequency tabulations, the optional diff view, and the
    /// memory reclaimer last.
    #[must_use]
    pub fn standard(config: &EvalConfig) -> Self {
        let mut stages: Vec<Box<dyn EvalStage>> = Vec::new();
        for boundary in [BoundaryMatch::Exact, BoundaryMatch::Overlap] {
            for identity in [IdentityMatch::Class, IdentityMatch::ClassAndId] {
                stages.push(Box::new(ScorerStage::new(AnnotationScorer::new(
                    boundary, identity,
                ))));
            }
        }
        stages.push(Box::new(ScorerStage::new(InstanceScorer::new())));
        stages.push(Box::new(ScorerStage::new(MacroInstanceScorer::new())));
        stages.push(Box::new(BootstrapScorer::new(
            "annotation exact/class",
            config.bootstrap_iterations,
            config.bootstrap_seed,
            Box::new(|| {
                Box::new(AnnotationScorer::new(BoundaryMatch::Exact, IdentityMatch::Class))
            }),
        )));
        stages.push(Box::new(BootstrapScorer::new(
            "instance",
            config.bootstrap_iterations,
            config.bootstrap_seed,
            Box::new(|| Box::new(InstanceScorer::new())),
        )));
        stages.push(Box::new(analysis::MentionTextTabulator::default()));
        stages.push(Box::new(analysis::MentionEntityTabulator::default()));
        stages.push(Box::new(analysis::InstanceCounter::default()));
        if let Some(path) = &config.analysis_file {
            stages.push(Box::new(analysis::HtmlDiffWriter::new(path.clone())));
        }
        stages.push(Box::new(ReclaimStage));
        Self::new(stages)
    }

    /// Run every stage over the batch, then log the reports.
    pub fn run(&mut self, units: &mut [ProcessingUnit]) -> Result<()> {
        for stage in &mut self.stages {
            log::debug!("Evaluation stage: {}", stage.name());
            stage.process_batch(units);
        }
        for stage in &mut self.stages {
            stage.finish()?;
        }
        for stage in &self.stages {
            if let Some(report) = stage.report() {
                for line in report.lines() {
                    log::info!("{line}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnnotatedSpan;

    #[test]
    fn standard_batch_runs_and_reclaims() {
        let mut unit = ProcessingUnit::new("d", "CHF here", 0);
        let gold = AnnotatedSpan::new(0, 3, "CHF", "Disease", vec![], 1.0);
        unit.gold = Some(vec![gold.clone()]);
        unit.predictions.add(1.0, vec![gold]);
        unit.tokens = crate::pipeline::stages::tokenize("CHF here");
        unit.tokens[0].features =
            Some(crate::types::SparseVector::from_pairs(vec![(0, 1.0)]));
        let mut units = vec![unit];

        let mut batch = EvalBatch::standard(&EvalConfig {
            bootstrap_iterations: 5,
            bootstrap_seed: 1,
            analysis_file: None,
        });
        batch.run(&mut units).unwrap();
        // Reclaimer ran last
        assert!(units[0].tokens[0].features.is_none());
    }
}
