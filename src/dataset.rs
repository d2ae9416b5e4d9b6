//! Gold-annotated dataset loading for evaluation.
//!
//! Datasets are selected through a registry keyed by a discriminator tag in
//! the CLI descriptor (`TAG|PATH`), so an unknown provider is a startup
//! error with the offending tag in the message.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::offset::{char_len, char_slice};
use crate::types::{AnnotatedSpan, ProcessingUnit};

/// A gold-annotated evaluation dataset.
pub trait Dataset {
    /// Load every document as one unit with gold annotations attached.
    fn load(&self, lexicon: &Lexicon) -> Result<Vec<ProcessingUnit>>;

    /// Dataset name for logs.
    fn name(&self) -> &'static str;
}

/// Create a dataset from a pipe-delimited descriptor, e.g. `pubtator|gold.txt`.
pub fn create_dataset(descriptor: &str) -> Result<Box<dyn Dataset>> {
    let fields: Vec<&str> = descriptor.split('|').collect();
    match fields[0] {
        "pubtator" => {
            let path = fields
                .get(1)
                .ok_or_else(|| Error::invalid_input("dataset 'pubtator' requires a path"))?;
            Ok(Box::new(PubtatorDataset::new(PathBuf::from(path))))
        }
        other => Err(Error::unknown_provider(format!("dataset '{other}'"))),
    }
}

/// Title/abstract pairs with tab-delimited gold annotation rows.
pub struct PubtatorDataset {
    path: PathBuf,
}

struct RawDocument {
    title: String,
    abstract_text: String,
    gold_rows: Vec<(usize, usize, String, String, Option<String>)>,
}

impl PubtatorDataset {
    /// Create a dataset reading from `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn parse(&self) -> Result<(Vec<String>, HashMap<String, RawDocument>)> {
        let content = fs::read_to_string(&self.path)?;
        let mut order: Vec<String> = Vec::new();
        let mut docs: HashMap<String, RawDocument> = HashMap::new();

        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let error_at = |msg: String| {
                Error::parse(format!("{}:{}: {msg}", self.path.display(), line_no + 1))
            };

            if line.contains('\t') {
                // Gold annotation row: id start end text class [identifiers]
                let fields: Vec<&str> = line.split('\t').collect();
                if fields.len() != 5 && fields.len() != 6 {
                    return Err(error_at(format!(
                        "expected 5 or 6 tab-separated fields, found {}",
                        fields.len()
                    )));
                }
                let start: usize = fields[1]
                    .parse()
                    .map_err(|_| error_at(format!("bad start offset '{}'", fields[1])))?;
                let end: usize = fields[2]
                    .parse()
                    .map_err(|_| error_at(format!("bad end offset '{}'", fields[2])))?;
                let doc = docs
                    .get_mut(fields[0])
                    .ok_or_else(|| error_at(format!("annotation before text for '{}'", fields[0])))?;
                doc.gold_rows.push((
                    start,
                    end,
                    fields[3].to_string(),
                    fields[4].to_string(),
                    fields.get(5).map(|s| s.to_string()),
                ));
            } else {
                let fields: Vec<&str> = line.splitn(3, '|').collect();
                if fields.len() < 2 {
                    return Err(error_at("expected id|type|text".to_string()));
                }
                let (id, tag) = (fields[0], fields[1]);
                let text = fields.get(2).copied().unwrap_or("");
                let doc = docs.entry(id.to_string()).or_insert_with(|| {
                    order.push(id.to_string());
                    RawDocument {
                        title: String::new(),
                        abstract_text: String::new(),
                        gold_rows: Vec::new(),
                    }
                });
                match tag {
                    "t" => doc.title = text.to_string(),
                    "a" => doc.abstract_text = text.to_string(),
                    other => log::debug!(
                        "{}:{}: skipping line type '{}'",
                        self.path.display(),
                        line_no + 1,
                        other
                    ),
                }
            }
        }
        Ok((order, docs))
    }
}

impl Dataset for PubtatorDataset {
    fn load(&self, lexicon: &Lexicon) -> Result<Vec<ProcessingUnit>> {
        let (order, mut docs) = self.parse()?;
        let mut units = Vec::with_capacity(order.len());
        for id in order {
            let Some(raw) = docs.remove(&id) else { continue };
            let text = format!("{} {}", raw.title, raw.abstract_text);
            let total = char_len(&text);
            let mut unit = ProcessingUnit::new(&id, text, 0);
            let mut gold = Vec::with_capacity(raw.gold_rows.len());
            for (start, end, surface, class, ids) in raw.gold_rows {
                if end > total || start > end {
                    return Err(Error::parse(format!(
                        "{}: annotation {start}..{end} outside document {id} (length {total})",
                        self.path.display()
                    )));
                }
                let actual = char_slice(&unit.text, start, end);
                if actual != surface {
                    log::warn!(
                        "{id}: annotation text mismatch at {start}..{end}: '{surface}' vs '{actual}'"
                    );
                }
                let entities = match &ids {
                    Some(ids) => {
                        let resolved: Vec<_> = ids
                            .split('|')
                            .filter_map(|one| lexicon.get(one).cloned())
                            .collect();
                        if resolved.is_empty() {
                            vec![lexicon.unknown_for(&class)]
                        } else {
                            resolved
                        }
                    }
                    None => vec![lexicon.unknown_for(&class)],
                };
                gold.push(AnnotatedSpan::new(start, end, surface, class, entities, 1.0));
            }
            unit.gold = Some(gold);
            units.push(unit);
        }
        log::info!("Loaded {} documents from {}", units.len(), self.path.display());
        Ok(units)
    }

    fn name(&self) -> &'static str {
        "pubtator"
    }
}
