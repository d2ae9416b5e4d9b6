//! Streaming title/abstract pair format.
//!
//! Input lines are `id|t|title` and `id|a|abstract`. Titles are cached by id
//! and echoed verbatim; when the matching abstract arrives, the unit text is
//! `"<title> <abstract>"` at absolute offset 0, the document is annotated,
//! and one tab-delimited row is written per predicted span. A single forward
//! pass, nothing buffered beyond the title cache.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::lexicon::join_identifiers;
use crate::runner::AnnotationRunner;
use crate::types::ProcessingUnit;

/// Adapter for the streaming title/abstract pair format.
pub struct PubtatorAdapter;

impl PubtatorAdapter {
    /// Convert one file.
    pub fn convert(&self, input: &Path, output: &Path, runner: &AnnotationRunner) -> Result<()> {
        let reader = BufReader::new(File::open(input)?);
        let mut writer = BufWriter::new(File::create(output)?);
        let mut titles: HashMap<String, String> = HashMap::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.splitn(3, '|').collect();
            if fields.len() < 2 {
                return Err(Error::parse(format!(
                    "{}:{}: expected id|type|text, found {} pipe-delimited fields",
                    input.display(),
                    line_no + 1,
                    fields.len()
                )));
            }
            let id = fields[0];
            let tag = fields[1];
            let text = fields.get(2).copied().unwrap_or("");

            match tag {
                "t" => {
                    writeln!(writer, "{id}|t|{text}")?;
                    titles.insert(id.to_string(), text.to_string());
                }
                "a" => {
                    writeln!(writer, "{id}|a|{text}")?;
                    let title = titles.remove(id).unwrap_or_else(|| {
                        log::warn!("Abstract for {id} arrived before its title");
                        String::new()
                    });
                    let combined = format!("{title} {text}");
                    let mut units =
                        runner.fan_out(vec![ProcessingUnit::new(id, combined, 0)]);
                    runner.annotate_document(id, &mut units)?;
                    self.emit_rows(&mut writer, id, &units)?;
                    writeln!(writer)?;
                }
                other => {
                    log::debug!(
                        "{}:{}: skipping line type '{}'",
                        input.display(),
                        line_no + 1,
                        other
                    );
                }
            }
        }
        writer.flush()?;
        Ok(())
    }

    fn emit_rows(
        &self,
        writer: &mut impl Write,
        id: &str,
        units: &[ProcessingUnit],
    ) -> Result<()> {
        for unit in units {
            for span in unit.best_prediction() {
                let start = unit.offset + span.start;
                let end = unit.offset + span.end;
                match join_identifiers(&span.entities) {
                    Some(ids) => writeln!(
                        writer,
                        "{id}\t{start}\t{end}\t{}\t{}\t{}",
                        span.text, span.entity_class, ids
                    )?,
                    None => writeln!(
                        writer,
                        "{id}\t{start}\t{end}\t{}\t{}",
                        span.text, span.entity_class
                    )?,
                }
            }
        }
        Ok(())
    }
}
