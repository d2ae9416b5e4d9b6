//! Span-dropping correction passes.

use std::collections::HashSet;

use regex::Regex;

use crate::error::{Error, Result};
use crate::types::ProcessingUnit;

/// Drops predicted spans whose exact surface text is a negating modifier
/// phrase ("absence of ..." style constructs are not findings).
#[derive(Debug, Clone)]
pub struct FalseModifierRemover {
    phrases: HashSet<String>,
}

impl FalseModifierRemover {
    /// The stock phrase list.
    #[must_use]
    pub fn default_phrases() -> HashSet<String> {
        ["absence of", "absence of any"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Create a remover over a phrase denylist.
    #[must_use]
    pub fn new(phrases: HashSet<String>) -> Self {
        Self { phrases }
    }

    /// Drop matching spans from every unit's best prediction.
    pub fn apply(&self, units: &mut [ProcessingUnit]) {
        for unit in units {
            if let Some(spans) = unit.best_prediction_mut() {
                spans.retain(|s| !self.phrases.contains(&s.text));
            }
        }
    }
}

impl Default for FalseModifierRemover {
    fn default() -> Self {
        Self::new(Self::default_phrases())
    }
}

/// Drops predicted spans whose exact surface text is on a configured
/// denylist of known false positives.
#[derive(Debug, Clone, Default)]
pub struct MentionTextFilter {
    texts: HashSet<String>,
}

impl MentionTextFilter {
    /// Create a filter over exact surface texts.
    #[must_use]
    pub fn new(texts: impl IntoIterator<Item = String>) -> Self {
        Self {
            texts: texts.into_iter().collect(),
        }
    }

    /// Drop matching spans from every unit's best prediction.
    pub fn apply(&self, units: &mut [ProcessingUnit]) {
        for unit in units {
            if let Some(spans) = unit.best_prediction_mut() {
                spans.retain(|s| !self.texts.contains(&s.text));
            }
        }
    }
}

/// Drops predicted spans whose surface text matches a glob-style pattern.
///
/// `*` matches any run of characters; `\*` is a literal asterisk. Everything
/// else matches literally. Patterns are anchored to the whole surface text.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    patterns: Vec<Regex>,
}

impl PatternFilter {
    /// Compile glob-style patterns.
    pub fn from_globs(globs: &[String]) -> Result<Self> {
        let patterns = globs
            .iter()
            .map(|g| glob_to_regex(g))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether any pattern matches `text`.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }

    /// Drop matching spans from every unit's best prediction.
    pub fn apply(&self, units: &mut [ProcessingUnit]) {
        for unit in units {
            if let Some(spans) = unit.best_prediction_mut() {
                spans.retain(|s| !self.matches(&s.text));
            }
        }
    }
}

fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'*') => {
                chars.next();
                pattern.push_str(r"\*");
            }
            '*' => pattern.push_str(".*"),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| Error::parse(format!("bad filter pattern '{glob}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnnotatedSpan;

    fn unit_with(texts: &[&str]) -> ProcessingUnit {
        let mut unit = ProcessingUnit::new("d", "irrelevant", 0);
        let spans: Vec<AnnotatedSpan> = texts
            .iter()
            .map(|t| AnnotatedSpan::new(0, t.chars().count(), *t, "Disease", vec![], 0.5))
            .collect();
        unit.predictions.add(1.0, spans);
        unit
    }

    #[test]
    fn false_modifier_drops_exact_matches_only() {
        let mut units = vec![unit_with(&["absence of", "absence of tumor"])];
        FalseModifierRemover::default().apply(&mut units);
        let remaining = units[0].best_prediction();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].text, "absence of tumor");
    }

    #[test]
    fn text_filter_drops_denylisted_spans() {
        let mut units = vec![unit_with(&["TNF", "tumor necrosis"])];
        MentionTextFilter::new(["TNF".to_string()]).apply(&mut units);
        assert_eq!(units[0].best_prediction().len(), 1);
    }

    #[test]
    fn glob_wildcard_and_literal_escape() {
        let filter =
            PatternFilter::from_globs(&["*deficiency".to_string(), r"p\*".to_string()]).unwrap();
        assert!(filter.matches("iron deficiency"));
        assert!(!filter.matches("deficiency anemia"));
        // Escaped asterisk is a literal, not a wildcard
        assert!(filter.matches("p*"));
        assert!(!filter.matches("p53"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let filter = PatternFilter::from_globs(&["a.b".to_string()]).unwrap();
        assert!(filter.matches("a.b"));
        assert!(!filter.matches("axb"));
    }
}
