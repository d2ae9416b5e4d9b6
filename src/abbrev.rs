//! Document-local abbreviation resolution.
//!
//! Abbreviations are scoped to a single document: the expansion of "CHF"
//! in one abstract says nothing about the next. Instead of a process-wide
//! resolver that must be cleared between documents, each document gets a
//! fresh [`DocContext`] holding its own [`AbbreviationResolver`], built from
//! the configured sources immediately before that document's units enter the
//! pipeline. Entries cannot leak across documents because the context is
//! dropped with the document.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Short-form to long-form map for one document.
#[derive(Debug, Clone, Default)]
pub struct AbbreviationResolver {
    map: HashMap<String, String>,
}

impl AbbreviationResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one abbreviation.
    pub fn insert(&mut self, short: impl Into<String>, long: impl Into<String>) {
        self.map.insert(short.into(), long.into());
    }

    /// Merge a batch of abbreviations.
    pub fn merge(&mut self, abbreviations: HashMap<String, String>) {
        self.map.extend(abbreviations);
    }

    /// Exact lookup of a short form.
    #[must_use]
    pub fn lookup(&self, short: &str) -> Option<&str> {
        self.map.get(short).map(String::as_str)
    }

    /// Replace every known short form occurring in `text` with its expansion.
    ///
    /// Longer short forms are applied first so "CHF-A" wins over "CHF".
    #[must_use]
    pub fn expand(&self, text: &str) -> String {
        let mut shorts: Vec<&String> = self.map.keys().collect();
        shorts.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        let mut out = text.to_string();
        for short in shorts {
            if out.contains(short.as_str()) {
                out = out.replace(short.as_str(), &self.map[short]);
            }
        }
        out
    }

    /// Iterate (short, long) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(s, l)| (s.as_str(), l.as_str()))
    }

    /// Number of abbreviations held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no abbreviations are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-document processing context, passed to every stage call.
#[derive(Debug, Clone, Default)]
pub struct DocContext {
    /// Identifier of the document being processed.
    pub doc_id: String,
    /// Abbreviations in effect for this document.
    pub abbreviations: AbbreviationResolver,
}

impl DocContext {
    /// Context with no abbreviations.
    #[must_use]
    pub fn empty(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            abbreviations: AbbreviationResolver::new(),
        }
    }
}

/// Contexts for every document in a batch, keyed by document id.
///
/// Batches in annotation mode hold one document; evaluation batches span a
/// whole corpus. Lookups for an unknown document yield an empty context.
#[derive(Debug, Default)]
pub struct ContextSet {
    by_doc: HashMap<String, DocContext>,
    empty: DocContext,
}

impl ContextSet {
    /// A set holding a single document's context.
    #[must_use]
    pub fn from_single(ctx: DocContext) -> Self {
        let mut set = Self::default();
        set.insert(ctx);
        set
    }

    /// Insert one document's context.
    pub fn insert(&mut self, ctx: DocContext) {
        self.by_doc.insert(ctx.doc_id.clone(), ctx);
    }

    /// Context for a document; empty when the document is unknown.
    #[must_use]
    pub fn get(&self, doc_id: &str) -> &DocContext {
        self.by_doc.get(doc_id).unwrap_or(&self.empty)
    }

    /// Number of documents with a context.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_doc.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_doc.is_empty()
    }
}

// =============================================================================
// Abbreviation sources
// =============================================================================

/// A pluggable provider of per-document abbreviations.
pub trait AbbreviationSource {
    /// Abbreviations for one document. Unknown documents yield an empty map.
    fn abbreviations_for(&self, doc_id: &str) -> Result<HashMap<String, String>>;

    /// Hook called before a new input file is converted; the folder source
    /// uses it to load the sidecar file matching the input file name.
    fn prepare_file(&mut self, _file_name: &str) -> Result<()> {
        Ok(())
    }

    /// Source name for logs.
    fn name(&self) -> &'static str;
}

/// Create a source from a pipe-delimited descriptor, e.g. `file|abbr.tsv`.
///
/// Known tags: `file` (one TSV of `doc<TAB>short<TAB>long` rows), `folder`
/// (a directory of per-input-file TSVs with the same row shape).
pub fn create_source(descriptor: &str) -> Result<Box<dyn AbbreviationSource>> {
    let fields: Vec<&str> = descriptor.split('|').collect();
    match fields[0] {
        "file" => {
            let path = fields
                .get(1)
                .ok_or_else(|| Error::invalid_input("abbreviation source 'file' requires a path"))?;
            Ok(Box::new(FileAbbreviationSource::load(Path::new(path))?))
        }
        "folder" => {
            let dir = fields.get(1).ok_or_else(|| {
                Error::invalid_input("abbreviation source 'folder' requires a directory")
            })?;
            Ok(Box::new(FolderAbbreviationSource::new(PathBuf::from(dir))))
        }
        other => Err(Error::unknown_provider(format!("abbreviation source '{other}'"))),
    }
}

fn parse_abbreviation_rows(
    content: &str,
    origin: &Path,
) -> Result<HashMap<String, HashMap<String, String>>> {
    let mut by_doc: HashMap<String, HashMap<String, String>> = HashMap::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            return Err(Error::parse(format!(
                "{}:{}: expected 3 tab-separated fields, found {}",
                origin.display(),
                line_no + 1,
                fields.len()
            )));
        }
        by_doc
            .entry(fields[0].to_string())
            .or_default()
            .insert(fields[1].to_string(), fields[2].to_string());
    }
    Ok(by_doc)
}

/// Source backed by a single abbreviation file covering many documents.
pub struct FileAbbreviationSource {
    by_doc: HashMap<String, HashMap<String, String>>,
}

impl FileAbbreviationSource {
    /// Load the whole file up front.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self {
            by_doc: parse_abbreviation_rows(&content, path)?,
        })
    }
}

impl AbbreviationSource for FileAbbreviationSource {
    fn abbreviations_for(&self, doc_id: &str) -> Result<HashMap<String, String>> {
        Ok(self.by_doc.get(doc_id).cloned().unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Source backed by a directory of per-input-file abbreviation files.
///
/// Before each input file is converted, [`AbbreviationSource::prepare_file`]
/// loads `<dir>/<input file name>`; a missing sidecar is not an error.
pub struct FolderAbbreviationSource {
    dir: PathBuf,
    by_doc: HashMap<String, HashMap<String, String>>,
}

impl FolderAbbreviationSource {
    /// Create a source reading from `dir`.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            by_doc: HashMap::new(),
        }
    }
}

impl AbbreviationSource for FolderAbbreviationSource {
    fn abbreviations_for(&self, doc_id: &str) -> Result<HashMap<String, String>> {
        Ok(self.by_doc.get(doc_id).cloned().unwrap_or_default())
    }

    fn prepare_file(&mut self, file_name: &str) -> Result<()> {
        self.by_doc.clear();
        let path = self.dir.join(file_name);
        if !path.is_file() {
            log::debug!("No abbreviation sidecar at {}", path.display());
            return Ok(());
        }
        let content = fs::read_to_string(&path)?;
        self.by_doc = parse_abbreviation_rows(&content, &path)?;
        log::debug!(
            "Loaded abbreviations for {} documents from {}",
            self.by_doc.len(),
            path.display()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "folder"
    }
}

/// Build the context for one document from the configured sources.
pub fn build_context(
    sources: &[Box<dyn AbbreviationSource>],
    doc_id: &str,
) -> Result<DocContext> {
    let mut ctx = DocContext::empty(doc_id);
    for source in sources {
        ctx.abbreviations.merge(source.abbreviations_for(doc_id)?);
    }
    Ok(ctx)
}
