//! Hierarchical passage collection format (JSON).
//!
//! Shape: collection → documents → passages → annotations. Unknown fields at
//! every level are captured and re-emitted untouched, so a round trip changes
//! nothing but each passage's annotation list, which is replaced wholesale.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lexicon::join_identifiers;
use crate::runner::AnnotationRunner;
use crate::types::ProcessingUnit;

/// A whole collection file.
#[derive(Debug, Serialize, Deserialize)]
pub struct Collection {
    /// The documents.
    pub documents: Vec<CollectionDocument>,
    /// Pass-through fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One document.
#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionDocument {
    /// Document identifier.
    pub id: String,
    /// The passages.
    pub passages: Vec<Passage>,
    /// Pass-through fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One passage.
#[derive(Debug, Serialize, Deserialize)]
pub struct Passage {
    /// Absolute character offset of the passage within the document.
    pub offset: usize,
    /// Passage text.
    pub text: String,
    /// Annotations; replaced wholesale on emit.
    #[serde(default)]
    pub annotations: Vec<PassageAnnotation>,
    /// Pass-through fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One emitted annotation.
#[derive(Debug, Serialize, Deserialize)]
pub struct PassageAnnotation {
    /// Annotation id; restarts at 0 for each document.
    pub id: String,
    /// Entity class label.
    #[serde(rename = "type")]
    pub annotation_type: String,
    /// Sorted pipe-joined identifier set; omitted when empty after sentinel
    /// exclusion, never emitted as an empty string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Normalization confidence; only present alongside an identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Absolute character offset of the span.
    pub offset: usize,
    /// Span length in characters.
    pub length: usize,
    /// Span surface text.
    pub text: String,
}

/// Units belonging to one passage, in document order.
pub struct PassageUnits {
    passage_idx: usize,
    units: Vec<ProcessingUnit>,
}

/// Adapter for the hierarchical passage collection format.
pub struct CollectionAdapter {
    show_scores: bool,
}

impl CollectionAdapter {
    /// Create an adapter; `show_scores` controls the optional score field.
    #[must_use]
    pub fn new(show_scores: bool) -> Self {
        Self { show_scores }
    }

    /// One unit per passage, optionally fanned into sentences.
    #[must_use]
    pub fn ingest(&self, doc: &CollectionDocument, runner: &AnnotationRunner) -> Vec<PassageUnits> {
        doc.passages
            .iter()
            .enumerate()
            .map(|(passage_idx, passage)| {
                let unit = ProcessingUnit::new(&doc.id, &passage.text, passage.offset);
                PassageUnits {
                    passage_idx,
                    units: runner.fan_out(vec![unit]),
                }
            })
            .collect()
    }

    /// Write corrected predictions back, replacing each passage's annotation
    /// list. Annotation ids restart at 0 per document.
    pub fn emit(&self, doc: &mut CollectionDocument, passages: &[PassageUnits]) {
        let mut next_id = 0usize;
        for pu in passages {
            let passage = &mut doc.passages[pu.passage_idx];
            passage.annotations.clear();
            for unit in &pu.units {
                for span in unit.best_prediction() {
                    let identifier = join_identifiers(&span.entities);
                    let score = match &identifier {
                        Some(_) if self.show_scores => Some(span.score),
                        _ => None,
                    };
                    passage.annotations.push(PassageAnnotation {
                        id: next_id.to_string(),
                        annotation_type: span.entity_class.clone(),
                        identifier,
                        score,
                        offset: unit.offset + span.start,
                        length: span.len(),
                        text: span.text.clone(),
                    });
                    next_id += 1;
                }
            }
        }
    }

    /// Convert one collection file.
    pub fn convert(&self, input: &Path, output: &Path, runner: &AnnotationRunner) -> Result<()> {
        let reader = BufReader::new(File::open(input)?);
        let mut collection: Collection = serde_json::from_reader(reader)
            .map_err(|e| Error::parse(format!("{}: {e}", input.display())))?;

        for doc in &mut collection.documents {
            log::info!("Document {}", doc.id);
            let mut passages = self.ingest(doc, runner);
            // The whole document is one batch so corpus-level correction
            // passes see every unit; unit count and order are stable across
            // annotation, so the flat batch splits back by count.
            let counts: Vec<usize> = passages.iter().map(|p| p.units.len()).collect();
            let mut units: Vec<ProcessingUnit> = passages
                .iter_mut()
                .flat_map(|p| std::mem::take(&mut p.units))
                .collect();
            runner.annotate_document(&doc.id, &mut units)?;
            let mut cursor = units.into_iter();
            for (pu, count) in passages.iter_mut().zip(counts) {
                pu.units = cursor.by_ref().take(count).collect();
            }
            self.emit(doc, &passages);
        }

        let writer = BufWriter::new(File::create(output)?);
        serde_json::to_writer_pretty(writer, &collection)
            .map_err(|e| Error::parse(format!("{}: {e}", output.display())))?;
        Ok(())
    }
}
