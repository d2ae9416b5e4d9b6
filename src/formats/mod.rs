//! Wire-format adapters.
//!
//! Each adapter converts an external document representation into
//! offset-anchored [`crate::types::ProcessingUnit`]s, hands them to the
//! runner, and converts the corrected predictions back. Two invariants are
//! shared by every adapter: predicted spans surface only after re-projection
//! to absolute document coordinates (`unit.offset + span.start`), and
//! non-annotation content of the input passes through unchanged.
//!
//! Identifier emission is uniform: sort the distinct non-sentinel primary
//! identifiers, join with `|`, and omit the field entirely when the set is
//! empty (see [`crate::lexicon::join_identifiers`]).

pub mod collection;
pub mod mention_tsv;
pub mod pubtator;

pub use collection::CollectionAdapter;
pub use mention_tsv::MentionTableAdapter;
pub use pubtator::PubtatorAdapter;

use std::path::Path;

use crate::error::Result;
use crate::runner::AnnotationRunner;

/// The supported document wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Hierarchical passage collection (JSON).
    Collection,
    /// Streaming title/abstract pairs.
    Pubtator,
    /// Flat mention table (normalization only).
    MentionTsv,
}

impl FileFormat {
    /// Format name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            FileFormat::Collection => "collection",
            FileFormat::Pubtator => "pubtator",
            FileFormat::MentionTsv => "tsv",
        }
    }
}

/// Convert one input file to one output file in the given format.
pub fn convert_file(
    format: FileFormat,
    show_scores: bool,
    input: &Path,
    output: &Path,
    runner: &AnnotationRunner,
) -> Result<()> {
    match format {
        FileFormat::Collection => CollectionAdapter::new(show_scores).convert(input, output, runner),
        FileFormat::Pubtator => PubtatorAdapter.convert(input, output, runner),
        FileFormat::MentionTsv => MentionTableAdapter.convert(input, output, runner),
    }
}
