//! Batch annotation driver.
//!
//! Loads a serialized prediction pipeline and annotates documents in one of
//! the supported wire formats:
//!
//! ```bash
//! biotag --model model.gz --input corpus/ --output annotated/ \
//!     --file-format pubtator \
//!     --abbreviation-source folder|abbr/ \
//!     --abbreviation-args 0.3|0.6|true --consistency-args 3|2
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use biotag::batch::{self, BatchOptions};
use biotag::cli::{CorrectionOpts, FormatArg, ModelOpts};
use biotag::runner::AnnotationRunner;
use biotag::Result;

#[derive(Debug, Parser)]
#[command(
    name = "biotag",
    version,
    about = "Batch biomedical entity annotation and normalization"
)]
struct Cli {
    /// Input file, or a directory to process file by file.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// Output file, or a directory when the input is a directory.
    #[arg(long, value_name = "PATH")]
    output: PathBuf,

    /// Document wire format.
    #[arg(long, value_enum, value_name = "FORMAT")]
    file_format: FormatArg,

    /// Emit per-annotation confidence scores where supported.
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set, value_name = "BOOL")]
    show_entity_scores: bool,

    /// Reconvert inputs whose output file already exists (directory mode).
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, value_name = "BOOL")]
    reprocess_input: bool,

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
    let mut runner = AnnotationRunner::new(model, chain, sources, cli.model.use_sentence_breaker);

    batch::run(
        cli.file_format.into(),
        &cli.input,
        &cli.output,
        BatchOptions {
            reprocess: cli.reprocess_input,
            show_scores: cli.show_entity_scores,
        },
        &mut runner,
    )?;
    log::info!("Done");
    Ok(())
}
