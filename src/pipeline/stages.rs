//! The core annotation stages.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::abbrev::DocContext;
use crate::error::Result;
use crate::lexicon::Lexicon;
use crate::model::{tied_best, MentionFeaturizer, NormalizerSet, RecognitionModel};
use crate::pipeline::PipelineStage;
use crate::types::{AnnotatedSpan, MentionName, ProcessingUnit, RankedList, Segment, Token};

/// How many normalization candidates the annotator keeps per mention.
const NORMALIZATION_RANKS: usize = 10;

/// Split unit text into alphanumeric-run and punctuation tokens with
/// character offsets.
#[must_use]
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start = 0usize;
    let mut current = String::new();
    for (pos, c) in text.chars().enumerate() {
        if c.is_alphanumeric() {
            if current.is_empty() {
                start = pos;
            }
            current.push(c);
        } else {
            if !current.is_empty() {
                tokens.push(Token {
                    start,
                    end: pos,
                    text: std::mem::take(&mut current),
                    features: None,
                });
            }
            if !c.is_whitespace() {
                tokens.push(Token {
                    start: pos,
                    end: pos + 1,
                    text: c.to_string(),
                    features: None,
                });
            }
        }
    }
    if !current.is_empty() {
        let end = text.chars().count();
        tokens.push(Token {
            start,
            end,
            text: current,
            features: None,
        });
    }
    tokens
}

/// Tokenizer stage: fills `unit.tokens`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Tokenizer;

impl PipelineStage for Tokenizer {
    fn name(&self) -> &'static str {
        "tokenizer"
    }

    fn process(&self, unit: &mut ProcessingUnit, _ctx: &DocContext) -> Result<()> {
        unit.tokens = tokenize(&unit.text);
        Ok(())
    }
}

/// Segmenter stage: generates all candidate token spans up to a maximum
/// token length.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    max_length: usize,
}

impl Segmenter {
    /// Create a segmenter bounded at `max_length` tokens per segment.
    #[must_use]
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }

    /// Maximum segment length in tokens.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl PipelineStage for Segmenter {
    fn name(&self) -> &'static str {
        "segmenter"
    }

    fn process(&self, unit: &mut ProcessingUnit, _ctx: &DocContext) -> Result<()> {
        let mut segments = Vec::new();
        for first in 0..unit.tokens.len() {
            for last in (first + 1)..=(first + self.max_length).min(unit.tokens.len()) {
                let start = unit.tokens[first].start;
                let end = unit.tokens[last - 1].end;
                let text = crate::offset::char_slice(&unit.text, start, end);
                segments.push(Segment {
                    start,
                    end,
                    first_token: first,
                    last_token: last,
                    mention: MentionName::new(text),
                    features: None,
                });
            }
        }
        unit.segments = segments;
        Ok(())
    }
}

/// Abbreviation expansion stage: rewrites segment mention text through the
/// document context before featurization, so downstream predictors see the
/// long form.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbbreviationExpander;

impl PipelineStage for AbbreviationExpander {
    fn name(&self) -> &'static str {
        "abbreviation-expander"
    }

    fn process(&self, unit: &mut ProcessingUnit, ctx: &DocContext) -> Result<()> {
        if ctx.abbreviations.is_empty() {
            return Ok(());
        }
        for segment in &mut unit.segments {
            let expanded = ctx.abbreviations.expand(&segment.mention.text);
            if expanded != segment.mention.text {
                segment.mention.text = expanded;
            }
        }
        Ok(())
    }
}

/// Mention featurization stage: fills token, segment, and mention vectors.
pub struct SegmentMentionFeaturizer {
    featurizer: Arc<MentionFeaturizer>,
}

impl SegmentMentionFeaturizer {
    /// Create the stage around a shared featurizer.
    #[must_use]
    pub fn new(featurizer: Arc<MentionFeaturizer>) -> Self {
        Self { featurizer }
    }
}

impl PipelineStage for SegmentMentionFeaturizer {
    fn name(&self) -> &'static str {
        "mention-featurizer"
    }

    fn process(&self, unit: &mut ProcessingUnit, _ctx: &DocContext) -> Result<()> {
        for token in &mut unit.tokens {
            token.features = Some(self.featurizer.vectorize(&token.text));
        }
        for segment in &mut unit.segments {
            self.featurizer.process(&mut segment.mention);
            segment.features = segment.mention.vector.clone();
        }
        Ok(())
    }
}

/// Core annotator stage: recognition over candidate segments, then
/// normalization of the accepted mentions.
pub struct Annotator {
    lexicon: Arc<Lexicon>,
    recognition: RecognitionModel,
    normalizers: Arc<NormalizerSet>,
}

impl Annotator {
    /// Create the annotator around shared model references.
    #[must_use]
    pub fn new(
        lexicon: Arc<Lexicon>,
        recognition: RecognitionModel,
        normalizers: Arc<NormalizerSet>,
    ) -> Self {
        Self {
            lexicon,
            recognition,
            normalizers,
        }
    }

    /// The recognition predictor in use.
    #[must_use]
    pub fn recognition(&self) -> &RecognitionModel {
        &self.recognition
    }
}

impl PipelineStage for Annotator {
    fn name(&self) -> &'static str {
        "annotator"
    }

    fn process(&self, unit: &mut ProcessingUnit, _ctx: &DocContext) -> Result<()> {
        // Score every (segment, class) pair, then keep the best
        // non-overlapping candidates greedily by score.
        let mut candidates: Vec<(f64, usize, &str)> = Vec::new();
        for (idx, segment) in unit.segments.iter().enumerate() {
            let Some(features) = segment.features.as_ref() else {
                continue;
            };
            for class in self.recognition.entity_classes() {
                let score = self.recognition.score(class, features);
                if score > 0.0 {
                    candidates.push((score, idx, class.as_str()));
                }
            }
        }
        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| unit.segments[a.1].start.cmp(&unit.segments[b.1].start))
        });

        let mut spans: Vec<AnnotatedSpan> = Vec::new();
        for (recognition_score, idx, class) in candidates {
            let segment = &unit.segments[idx];
            if spans.iter().any(|s| s.covers(segment.start, segment.end)) {
                continue;
            }
            let (entities, score) = match (
                segment.mention.vector.as_ref(),
                self.normalizers.get(class),
            ) {
                (Some(vector), Some(normalizer)) => {
                    let ranked = normalizer.find_best(vector, &self.lexicon, NORMALIZATION_RANKS);
                    match ranked.best() {
                        Some((s, _)) => (tied_best(&ranked), s),
                        None => (vec![self.lexicon.unknown_for(class)], recognition_score),
                    }
                }
                _ => (vec![self.lexicon.unknown_for(class)], recognition_score),
            };
            spans.push(AnnotatedSpan::new(
                segment.start,
                segment.end,
                crate::offset::char_slice(&unit.text, segment.start, segment.end),
                class,
                entities,
                score,
            ));
        }
        spans.sort_by_key(|s| (s.start, s.end));

        let total: f64 = spans.iter().map(|s| s.score).sum();
        let mut predictions = RankedList::new(1);
        predictions.add(total, spans);
        unit.predictions = predictions;
        Ok(())
    }
}

/// Memory reclaim stage: drops heavy per-token/per-segment feature state and
/// all prediction ranks past the best once no consumer needs them.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureReclaimer;

impl PipelineStage for FeatureReclaimer {
    fn name(&self) -> &'static str {
        "feature-reclaimer"
    }

    fn process(&self, unit: &mut ProcessingUnit, _ctx: &DocContext) -> Result<()> {
        for token in &mut unit.tokens {
            token.features = None;
        }
        for segment in &mut unit.segments {
            segment.features = None;
            segment.mention.vector = None;
        }
        unit.predictions.truncate_to_best();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abbrev::DocContext;

    #[test]
    fn tokenize_tracks_char_offsets() {
        let tokens = tokenize("CHF, improved");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["CHF", ",", "improved"]);
        assert_eq!((tokens[0].start, tokens[0].end), (0, 3));
        assert_eq!((tokens[1].start, tokens[1].end), (3, 4));
        assert_eq!((tokens[2].start, tokens[2].end), (5, 13));
    }

    #[test]
    fn segmenter_length_floor_is_one() {
        assert_eq!(Segmenter::new(0).max_length(), 1);
    }

    #[test]
    fn segmenter_respects_max_length() {
        let mut unit = ProcessingUnit::new("d", "congestive heart failure", 0);
        let ctx = DocContext::empty("d");
        Tokenizer.process(&mut unit, &ctx).unwrap();
        Segmenter::new(2).process(&mut unit, &ctx).unwrap();
        assert!(unit
            .segments
            .iter()
            .all(|s| s.last_token - s.first_token <= 2));
        // 3 unigrams + 2 bigrams
        assert_eq!(unit.segments.len(), 5);

        Segmenter::new(3).process(&mut unit, &ctx).unwrap();
        assert_eq!(unit.segments.len(), 6);
        assert!(unit
            .segments
            .iter()
            .any(|s| s.mention.text == "congestive heart failure"));
    }

    #[test]
    fn expander_rewrites_mentions_from_context() {
        let mut unit = ProcessingUnit::new("d", "CHF", 0);
        let mut ctx = DocContext::empty("d");
        ctx.abbreviations.insert("CHF", "congestive heart failure");
        Tokenizer.process(&mut unit, &ctx).unwrap();
        Segmenter::new(5).process(&mut unit, &ctx).unwrap();
        AbbreviationExpander.process(&mut unit, &ctx).unwrap();
        assert_eq!(unit.segments[0].mention.text, "congestive heart failure");
        // Surface offsets are untouched
        assert_eq!((unit.segments[0].start, unit.segments[0].end), (0, 3));
    }

    #[test]
    fn reclaimer_drops_feature_state() {
        let mut unit = ProcessingUnit::new("d", "x", 0);
        unit.tokens = tokenize("x");
        unit.tokens[0].features = Some(crate::types::SparseVector::from_pairs(vec![(0, 1.0)]));
        FeatureReclaimer.process(&mut unit, &DocContext::empty("d")).unwrap();
        assert!(unit.tokens[0].features.is_none());
    }
}
