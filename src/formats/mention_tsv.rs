//! Flat mention table format (normalization only).
//!
//! Input rows are `docId<TAB>mention<TAB>class`; there is no recognition
//! step. Each row is abbreviation-expanded under its own document's context,
//! featurized, and pushed through the class's normalization predictor for a
//! single best candidate. The output row appends the best identifier and
//! canonical name, or two empty fields when nothing resolves — an empty
//! candidate list is a skip condition, not an error.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::runner::AnnotationRunner;

/// Adapter for the flat mention table format.
pub struct MentionTableAdapter;

impl MentionTableAdapter {
    /// Convert one file.
    pub fn convert(&self, input: &Path, output: &Path, runner: &AnnotationRunner) -> Result<()> {
        let reader = BufReader::new(File::open(input)?);
        let mut writer = BufWriter::new(File::create(output)?);

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 3 {
                return Err(Error::parse(format!(
                    "{}:{}: expected 3 tab-separated fields, found {}",
                    input.display(),
                    line_no + 1,
                    fields.len()
                )));
            }
            let (doc_id, mention, class) = (fields[0], fields[1], fields[2]);

            // Fresh per-row context: abbreviations come strictly from this
            // row's document.
            let ctx = runner.context_for(doc_id)?;
            let expanded = ctx.abbreviations.expand(mention);
            if expanded != mention {
                log::debug!("{doc_id}: '{mention}' expanded to '{expanded}'");
            }
            let vector = runner.featurizer().vectorize(&expanded);

            let best = match runner.normalizers().get(class) {
                Some(normalizer) => {
                    let ranked = normalizer.find_best(&vector, runner.lexicon(), 1);
                    ranked.best().map(|(_, e)| {
                        (e.primary_identifier.clone(), e.primary_name.clone())
                    })
                }
                None => {
                    log::warn!(
                        "{}:{}: no normalization predictor for class '{}'",
                        input.display(),
                        line_no + 1,
                        class
                    );
                    None
                }
            };
            match best {
                Some((id, name)) => writeln!(writer, "{doc_id}\t{mention}\t{class}\t{id}\t{name}")?,
                None => writeln!(writer, "{doc_id}\t{mention}\t{class}\t\t")?,
            }
        }
        writer.flush()?;
        Ok(())
    }
}
