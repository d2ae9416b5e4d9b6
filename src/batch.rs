//! Single-file and directory batch drivers.
//!
//! Directory mode isolates failures per input file: output is written to a
//! temp file in the output directory and only persisted to its final name
//! after the conversion succeeds, so a failed file never leaves a
//! partial-but-plausible output behind. The failure is logged and the batch
//! moves on; it does not affect the exit status.

use std::path::Path;

use tempfile::Builder;

use crate::error::{Error, Result};
use crate::formats::{convert_file, FileFormat};
use crate::runner::AnnotationRunner;

/// Batch driver options.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// When false, directory entries whose output already exists are skipped.
    pub reprocess: bool,
    /// Emit per-annotation scores where the format supports them.
    pub show_scores: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            reprocess: true,
            show_scores: false,
        }
    }
}

/// Convert a file or every file of a directory.
pub fn run(
    format: FileFormat,
    input: &Path,
    output: &Path,
    options: BatchOptions,
    runner: &mut AnnotationRunner,
) -> Result<()> {
    if input.is_dir() {
        if !output.is_dir() {
            return Err(Error::invalid_input(
                "if input is a directory, output must also be a directory",
            ));
        }
        run_directory(format, input, output, options, runner)
    } else {
        if output.is_dir() {
            return Err(Error::invalid_input(
                "if input is a file, output must also be a file",
            ));
        }
        if !options.reprocess {
            log::warn!("Option 'reprocess-input' is ignored for single files");
        }
        let file_name = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        runner.prepare_file(file_name)?;
        convert_file(format, options.show_scores, input, output, runner)
    }
}

fn run_directory(
    format: FileFormat,
    input: &Path,
    output: &Path,
    options: BatchOptions,
    runner: &mut AnnotationRunner,
) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(input)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|e| e.path().is_file())
        .collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let in_path = entry.path();
        let Some(file_name) = in_path.file_name().and_then(|n| n.to_str()).map(String::from)
        else {
            continue;
        };
        let out_path = output.join(&file_name);
        if !options.reprocess && out_path.exists() {
            log::info!("Ignoring {} because its output exists", in_path.display());
            continue;
        }
        log::info!("Processing {}", in_path.display());
        if let Err(e) = convert_one(format, &in_path, &out_path, output, options, runner, &file_name)
        {
            // Per-file isolation: log and continue; the temp file is gone.
            log::error!("Failed to process {}: {e}", in_path.display());
        }
    }
    Ok(())
}

fn convert_one(
    format: FileFormat,
    in_path: &Path,
    out_path: &Path,
    out_dir: &Path,
    options: BatchOptions,
    runner: &mut AnnotationRunner,
    file_name: &str,
) -> Result<()> {
    runner.prepare_file(file_name)?;
    let temp = Builder::new().prefix("tmp").tempfile_in(out_dir)?;
    convert_file(format, options.show_scores, in_path, temp.path(), runner)?;
    temp.persist(out_path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
