//! Evaluation driver.
//!
//! Annotates a gold dataset with a loaded model, applies the correction
//! chain, and scores the predictions under crossed boundary/identity
//! semantics, with bootstrap confidence estimates:
//!
//! ```bash
//! biotag-eval --model model.gz --dataset pubtator|gold.txt \
//!     --abbreviation-source file|abbr.tsv \
//!     --consistency-args 3|2 --analysis-file report.html
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use biotag::abbrev::{build_context, ContextSet};
use biotag::cli::{CorrectionOpts, ModelOpts};
use biotag::dataset::create_dataset;
use biotag::eval::{EvalBatch, EvalConfig};
use biotag::pipeline::{PipelineStage, ProgressReporter, StageTimer};
use biotag::sentence::SentenceBreaker;
use biotag::types::ProcessingUnit;
use biotag::Result;

#[derive(Debug, Parser)]
#[command(
    name = "biotag-eval",
    version,
    about = "Score a prediction pipeline against a gold dataset"
)]
struct Cli {
    /// Dataset descriptor, e.g. `pubtator|gold.txt`.
    #[arg(long, value_name = "TAG|PATH")]
    dataset: String,

    /// Write a gold-vs-predicted HTML diff view to this file.
    #[arg(long, value_name = "FILE")]
    analysis_file: Option<PathBuf>,

    /// Bootstrap resample count.
    #[arg(long, default_value_t = 100, value_name = "N")]
    bootstrap_iterations: usize,

    /// Bootstrap random seed.
    #[arg(long, default_value_t = 42, value_name = "SEED")]
    bootstrap_seed: u64,

    #[command(flatten)]
    model: ModelOpts,

    #[command(flatten)]
    corrections: CorrectionOpts,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    log::info!("Options: {cli:?}");

    let model = cli.model.load_model()?;
    let chain = cli.corrections.build_chain(&model)?;
    let sources = cli.model.create_sources()?;

    // Load and optionally fan out the gold dataset.
    let dataset = create_dataset(&cli.dataset)?;
    let mut units = dataset.load(&model.lexicon)?;
    if cli.model.use_sentence_breaker {
        units = SentenceBreaker::new().break_units(units);
    }
    log::info!("Evaluating over {} units", units.len());

    // One abbreviation context per document in the corpus.
    let mut contexts = ContextSet::default();
    for doc_id in doc_ids(&units) {
        contexts.insert(build_context(&sources, &doc_id)?);
    }

    // Annotate, document group by document group, under each group's context.
    let pipeline = StageTimer::new(
        "annotation-pipeline",
        Box::new(ProgressReporter::new("annotation-pipeline", 10, Box::new(model.pipeline))),
    );
    let mut start = 0;
    while start < units.len() {
        let doc_id = units[start].doc_id.clone();
        let end = units[start..]
            .iter()
            .position(|u| u.doc_id != doc_id)
            .map_or(units.len(), |p| start + p);
        pipeline.process_all(&mut units[start..end], contexts.get(&doc_id))?;
        start = end;
    }

    // Correction chain over the whole materialized corpus.
    chain.apply(&mut units, &contexts)?;

    // One pass of the scoring/analysis batch.
    let mut batch = EvalBatch::standard(&EvalConfig {
        bootstrap_iterations: cli.bootstrap_iterations,
        bootstrap_seed: cli.bootstrap_seed,
        analysis_file: cli.analysis_file.clone(),
    });
    batch.run(&mut units)?;
    Ok(())
}

fn doc_ids(units: &[ProcessingUnit]) -> Vec<String> {
    let mut ids = Vec::new();
    for unit in units {
        if ids.last().map(String::as_str) != Some(unit.doc_id.as_str()) {
            ids.push(unit.doc_id.clone());
        }
    }
    ids
}
