//! Analysis-only stages: frequency tabulations and a rendered diff view.
//!
//! These run in the same pass as the scorers but never affect scores.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::Result;
use crate::eval::EvalStage;
use crate::lexicon::join_identifiers;
use crate::types::{AnnotatedSpan, ProcessingUnit};

const TOP_N: usize = 20;

fn top_counts<K: Clone + Ord>(counts: &HashMap<K, usize>) -> Vec<(K, usize)> {
    let mut rows: Vec<(K, usize)> = counts.iter().map(|(k, &n)| (k.clone(), n)).collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows.truncate(TOP_N);
    rows
}

/// Tabulates predicted mention surface text frequencies.
#[derive(Debug, Default)]
pub struct MentionTextTabulator {
    counts: HashMap<String, usize>,
}

impl EvalStage for MentionTextTabulator {
    fn name(&self) -> &'static str {
        "mention-text-counts"
    }

    fn process_batch(&mut self, units: &mut [ProcessingUnit]) {
        for unit in units.iter() {
            for span in unit.best_prediction() {
                *self.counts.entry(span.text.clone()).or_insert(0) += 1;
            }
        }
    }

    fn report(&self) -> Option<String> {
        let mut lines = vec![format!("mention texts ({} distinct), top {}:", self.counts.len(), TOP_N)];
        for (text, n) in top_counts(&self.counts) {
            lines.push(format!("  {n:>6}  {text}"));
        }
        Some(lines.join("\n"))
    }
}

/// Tabulates predicted (surface text, identifier set) frequencies.
#[derive(Debug, Default)]
pub struct MentionEntityTabulator {
    counts: HashMap<(String, String), usize>,
}

impl EvalStage for MentionEntityTabulator {
    fn name(&self) -> &'static str {
        "mention-entity-counts"
    }

    fn process_batch(&mut self, units: &mut [ProcessingUnit]) {
        for unit in units.iter() {
            for span in unit.best_prediction() {
                let ids = join_identifiers(&span.entities).unwrap_or_else(|| "-".to_string());
                *self.counts.entry((span.text.clone(), ids)).or_insert(0) += 1;
            }
        }
    }

    fn report(&self) -> Option<String> {
        let mut lines = vec![format!(
            "mention/entity pairs ({} distinct), top {}:",
            self.counts.len(),
            TOP_N
        )];
        for ((text, ids), n) in top_counts(&self.counts) {
            lines.push(format!("  {n:>6}  {text} -> {ids}"));
        }
        Some(lines.join("\n"))
    }
}

/// Counts units, gold annotations, and predicted annotations.
#[derive(Debug, Default)]
pub struct InstanceCounter {
    units: usize,
    with_gold: usize,
    gold_spans: usize,
    predicted_spans: usize,
}

impl EvalStage for InstanceCounter {
    fn name(&self) -> &'static str {
        "instance-counts"
    }

    fn process_batch(&mut self, units: &mut [ProcessingUnit]) {
        for unit in units.iter() {
            self.units += 1;
            if let Some(gold) = &unit.gold {
                self.with_gold += 1;
                self.gold_spans += gold.len();
            }
            self.predicted_spans += unit.best_prediction().len();
        }
    }

    fn report(&self) -> Option<String> {
        Some(format!(
            "units={} (with gold: {}), gold spans={}, predicted spans={}",
            self.units, self.with_gold, self.gold_spans, self.predicted_spans
        ))
    }
}

/// Renders a per-unit gold-vs-predicted HTML diff view.
pub struct HtmlDiffWriter {
    path: PathBuf,
    rows: Vec<String>,
}

impl HtmlDiffWriter {
    /// Create a writer targeting `path`; the file is written at finish.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            rows: Vec::new(),
        }
    }

    fn render_spans(spans: &[AnnotatedSpan]) -> String {
        if spans.is_empty() {
            return "<em>none</em>".to_string();
        }
        spans
            .iter()
            .map(|s| {
                let ids = join_identifiers(&s.entities).unwrap_or_else(|| "-".to_string());
                format!(
                    "[{}..{}] {} ({}: {})",
                    s.start,
                    s.end,
                    escape(&s.text),
                    escape(&s.entity_class),
                    escape(&ids)
                )
            })
            .collect::<Vec<_>>()
            .join("<br>")
    }
}

impl EvalStage for HtmlDiffWriter {
    fn name(&self) -> &'static str {
        "html-diff"
    }

    fn process_batch(&mut self, units: &mut [ProcessingUnit]) {
        for unit in units.iter() {
            let Some(gold) = &unit.gold else { continue };
            let predicted = unit.best_prediction();
            let agree = gold.len() == predicted.len()
                && gold.iter().zip(predicted).all(|(g, p)| {
                    g.same_bounds(p) && g.entity_class == p.entity_class
                });
            self.rows.push(format!(
                "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                if agree { "match" } else { "diff" },
                escape(&unit.doc_id),
                escape(&unit.text),
                Self::render_spans(gold),
                Self::render_spans(predicted),
            ));
        }
    }

    fn finish(&mut self) -> Result<()> {
        let html = format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
             <style>table{{border-collapse:collapse}}td{{border:1px solid #999;\
             padding:4px;vertical-align:top}}tr.diff{{background:#fdd}}</style>\
             </head><body><table>\n\
             <tr><th>document</th><th>text</th><th>gold</th><th>predicted</th></tr>\n\
             {}\n</table></body></html>\n",
            self.rows.join("\n")
        );
        fs::write(&self.path, html)?;
        log::info!("Wrote analysis file {}", self.path.display());
        Ok(())
    }

    fn report(&self) -> Option<String> {
        None
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
