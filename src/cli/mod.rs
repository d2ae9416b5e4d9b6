//! Shared CLI argument structures and builders.
//!
//! Per-correction-pass parameters arrive as pipe-delimited argument strings
//! (e.g. `--abbreviation-args 0.3|0.6|true`) and are parsed here into typed
//! configuration before anything is constructed.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Args, ValueEnum};

use crate::abbrev::{create_source, AbbreviationSource};
use crate::error::{Error, Result};
use crate::formats::FileFormat;
use crate::model::store::{LoadedModel, LoadOptions};
use crate::postprocess::{
    AbbreviationRevision, AbsoluteConsistency, CoordinationMerge, CorrectionChain,
    FalseModifierRemover, MentionTextFilter, PatternFilter, RelativeConsistency,
};

/// Wire-format selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// Hierarchical passage collection (JSON).
    Collection,
    /// Streaming title/abstract pairs.
    Pubtator,
    /// Flat mention table.
    Tsv,
}

impl From<FormatArg> for FileFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Collection => FileFormat::Collection,
            FormatArg::Pubtator => FileFormat::Pubtator,
            FormatArg::Tsv => FileFormat::MentionTsv,
        }
    }
}

/// Model loading and pipeline options shared by both drivers.
#[derive(Debug, Args)]
pub struct ModelOpts {
    /// Path to the serialized model file.
    #[arg(long, value_name = "FILE")]
    pub model: PathBuf,

    /// Replace trainable predictors with compiled equivalents.
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    pub compile_model: bool,

    /// Widen the maximum segment length (requests to shrink are ignored).
    #[arg(long, value_name = "TOKENS")]
    pub max_segment_length: Option<usize>,

    /// Fan passage/abstract units out into sentences.
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    pub use_sentence_breaker: bool,

    /// Abbreviation source descriptor, repeatable (e.g. `file|abbr.tsv`).
    #[arg(long = "abbreviation-source", value_name = "TAG|ARGS")]
    pub abbreviation_sources: Vec<String>,
}

impl ModelOpts {
    /// Load options derived from the flags.
    #[must_use]
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            compile: self.compile_model,
            max_segment_length: self.max_segment_length,
        }
    }

    /// Load the model.
    pub fn load_model(&self) -> Result<LoadedModel> {
        crate::model::store::load(&self.model, &self.load_options())
    }

    /// Instantiate the configured abbreviation sources.
    pub fn create_sources(&self) -> Result<Vec<Box<dyn AbbreviationSource>>> {
        let mut sources = Vec::with_capacity(self.abbreviation_sources.len());
        for descriptor in &self.abbreviation_sources {
            let source = create_source(descriptor)?;
            log::info!("Abbreviation source: {}", source.name());
            sources.push(source);
        }
        Ok(sources)
    }
}

/// Correction chain options shared by both drivers.
#[derive(Debug, Args)]
pub struct CorrectionOpts {
    /// Enable the negating modifier phrase remover.
    #[arg(long, default_value_t = false, action = ArgAction::Set, value_name = "BOOL")]
    pub false_modifier_remover: bool,

    /// Exact surface text denylist, pipe-delimited.
    #[arg(long, value_name = "T1|T2|...")]
    pub mention_text_filter: Option<String>,

    /// Glob-style surface pattern denylist, pipe-delimited (`\*` is literal).
    #[arg(long, value_name = "P1|P2|...")]
    pub post_processing_patterns: Option<String>,

    /// Coordination merge arguments: minimum conjunct score.
    #[arg(long, value_name = "MIN_SCORE")]
    pub coordination_args: Option<String>,

    /// Abbreviation revision arguments.
    #[arg(long, value_name = "CHANGE|ADD|DROP")]
    pub abbreviation_args: Option<String>,

    /// Relative consistency arguments.
    #[arg(long, value_name = "CHANGE|ADD")]
    pub consistency_args: Option<String>,

    /// Enable absolute consistency (placeholder baseline snapping).
    #[arg(long, default_value_t = false, action = ArgAction::Set, value_name = "BOOL")]
    pub absolute_consistency: bool,
}

impl CorrectionOpts {
    /// Build the correction chain against a loaded model.
    pub fn build_chain(&self, model: &LoadedModel) -> Result<CorrectionChain> {
        let mut chain = CorrectionChain::none();

        if self.false_modifier_remover {
            log::info!("false modifier remover enabled");
            chain.false_modifier = Some(FalseModifierRemover::default());
        } else {
            log::info!("false modifier remover disabled");
        }

        if let Some(texts) = &self.mention_text_filter {
            log::info!("mention text filter enabled");
            chain.text_filter = Some(MentionTextFilter::new(
                texts.split('|').map(str::to_string),
            ));
        }

        if let Some(patterns) = &self.post_processing_patterns {
            log::info!("pattern filter enabled");
            let globs: Vec<String> = patterns.split('|').map(str::to_string).collect();
            chain.pattern_filter = Some(PatternFilter::from_globs(&globs)?);
        }

        if let Some(args) = &self.coordination_args {
            log::info!("coordination merge enabled");
            let min_score = parse_coordination_args(args)?;
            chain.coordination = Some(CoordinationMerge::new(
                min_score,
                Arc::clone(&model.featurizer),
                Arc::clone(&model.normalizers),
                Arc::clone(&model.lexicon),
            ));
        } else {
            log::info!("coordination merge disabled");
        }

        if let Some(args) = &self.abbreviation_args {
            log::info!("abbreviation revision enabled");
            let (change, add, drop) = parse_abbreviation_args(args)?;
            chain.abbreviation = Some(AbbreviationRevision::new(
                change,
                add,
                drop,
                Arc::clone(&model.featurizer),
                Arc::clone(&model.normalizers),
                Arc::clone(&model.lexicon),
            ));
        } else {
            log::info!("abbreviation revision disabled");
        }

        if let Some(args) = &self.consistency_args {
            log::info!("relative consistency enabled");
            let (change, add) = parse_consistency_args(args)?;
            chain.consistency = Some(RelativeConsistency::new(
                change,
                add,
                Arc::clone(&model.lexicon),
            ));
        } else {
            log::info!("relative consistency disabled");
        }

        if self.absolute_consistency {
            log::info!("absolute consistency enabled");
            chain.absolute_consistency =
                Some(AbsoluteConsistency::new(Arc::clone(&model.lexicon)));
        }

        Ok(chain)
    }
}

fn parse_abbreviation_args(args: &str) -> Result<(f64, f64, bool)> {
    let fields: Vec<&str> = args.split('|').collect();
    if fields.len() != 3 {
        return Err(Error::invalid_input(format!(
            "abbreviation-args must be CHANGE|ADD|DROP, got '{args}'"
        )));
    }
    let change = fields[0]
        .parse()
        .map_err(|_| Error::invalid_input(format!("bad change threshold '{}'", fields[0])))?;
    let add = fields[1]
        .parse()
        .map_err(|_| Error::invalid_input(format!("bad add threshold '{}'", fields[1])))?;
    let drop = fields[2]
        .parse()
        .map_err(|_| Error::invalid_input(format!("bad drop flag '{}'", fields[2])))?;
    Ok((change, add, drop))
}

fn parse_consistency_args(args: &str) -> Result<(usize, usize)> {
    let fields: Vec<&str> = args.split('|').collect();
    if fields.len() != 2 {
        return Err(Error::invalid_input(format!(
            "consistency-args must be CHANGE|ADD, got '{args}'"
        )));
    }
    let change = fields[0]
        .parse()
        .map_err(|_| Error::invalid_input(format!("bad change threshold '{}'", fields[0])))?;
    let add = fields[1]
        .parse()
        .map_err(|_| Error::invalid_input(format!("bad add threshold '{}'", fields[1])))?;
    Ok((change, add))
}

fn parse_coordination_args(args: &str) -> Result<f64> {
    args.parse()
        .map_err(|_| Error::invalid_input(format!("bad coordination min score '{args}'")))
}
