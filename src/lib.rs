//! # biotag
//!
//! Batch annotation of biomedical text with entity mentions and their
//! normalized identifiers, driven by a previously trained, serialized
//! prediction pipeline.
//!
//! - **Three wire formats**: hierarchical passage collections (JSON),
//!   streaming title/abstract pairs, and a flat mention table — all
//!   preserving absolute character offsets through sentence fan-out and back.
//! - **Correction chain**: an ordered, independently toggleable set of
//!   post-processing passes (modifier filtering, pattern filtering,
//!   coordination reconciliation, abbreviation-driven revision, consistency
//!   voting) over the raw predictions.
//! - **Evaluation**: scorers crossed over boundary and identity semantics,
//!   with bootstrap-resampled confidence estimates.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use biotag::model::store::{load, LoadOptions};
//! use biotag::runner::AnnotationRunner;
//! use biotag::postprocess::CorrectionChain;
//! use biotag::types::ProcessingUnit;
//!
//! let model = load("model.gz".as_ref(), &LoadOptions::default())?;
//! let runner = AnnotationRunner::new(model, CorrectionChain::none(), vec![], true);
//! let mut units = runner.fan_out(vec![ProcessingUnit::new("doc1", text, 0)]);
//! runner.annotate_document("doc1", &mut units)?;
//! for span in units.iter().flat_map(|u| u.best_prediction()) {
//!     println!("{}..{} {}", span.start, span.end, span.text);
//! }
//! ```
//!
//! ## Design notes
//!
//! - Offsets are character offsets everywhere; spans stay unit-relative
//!   until emission re-projects them to document coordinates.
//! - Abbreviations are carried in a per-document context value, never in
//!   process-wide state, so nothing leaks between documents.
//! - The model blob is a strongly-typed, schema-versioned structure; loading
//!   fails fast with a named-field diagnostic and never yields a partial
//!   pipeline.

#![warn(missing_docs)]

pub mod abbrev;
pub mod batch;
pub mod cli;
pub mod dataset;
mod error;
pub mod eval;
pub mod formats;
pub mod lexicon;
pub mod model;
pub mod offset;
pub mod pipeline;
pub mod postprocess;
pub mod runner;
pub mod sentence;
pub mod types;

pub use error::{Error, Result};

pub mod prelude {
    //! Commonly used items, re-exported for convenience.
    pub use crate::abbrev::{AbbreviationResolver, ContextSet, DocContext};
    pub use crate::error::{Error, Result};
    pub use crate::lexicon::{join_identifiers, Entity, Lexicon};
    pub use crate::model::store::{LoadOptions, LoadedModel};
    pub use crate::postprocess::CorrectionChain;
    pub use crate::runner::AnnotationRunner;
    pub use crate::types::{AnnotatedSpan, ProcessingUnit, RankedList};
}
