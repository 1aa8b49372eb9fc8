//! Best-effort encyclopedia enrichment
//!
//! Named features (wilderness areas, peaks, passes) get a short encyclopedia
//! summary attached when a sufficiently confident title match exists.
//! Enrichment is strictly best-effort: a failed lookup logs a warning and
//! leaves the feature unenriched, it never fails a batch.

use crate::Result;
use crate::attribute::FeatureRecord;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Candidates scoring below this bigram similarity are considered a different
/// subject entirely, not a spelling variant
const MIN_MATCH_SIMILARITY: f64 = 0.4;

/// A short encyclopedia summary for one subject
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub title: String,
    pub extract: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A queryable store of summaries
///
/// `search` returns candidate summaries for a name, best first. Sources may
/// be backed by anything from an in-memory snapshot to a remote API; errors
/// are per-lookup and recoverable.
pub trait SummarySource: Sync {
    fn search(&self, name: &str) -> Result<Vec<Summary>>;
}

/// A [`SummarySource`] over an in-memory snapshot of summaries
#[derive(Debug, Default)]
pub struct StaticSummarySource {
    summaries: Vec<Summary>,
}

impl StaticSummarySource {
    pub fn new(summaries: Vec<Summary>) -> Self {
        Self { summaries }
    }

    /// Load a snapshot from a JSON array of summaries
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let summaries = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(Self::new(summaries))
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

impl SummarySource for StaticSummarySource {
    fn search(&self, name: &str) -> Result<Vec<Summary>> {
        let mut scored: Vec<(f64, &Summary)> = self
            .summaries
            .iter()
            .map(|s| (bigram_similarity(name, &s.title), s))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(5).map(|(_, s)| s.clone()).collect())
    }
}

/// Pick the best candidate for `name`, if any is confident enough
///
/// An exact match after normalization always wins. Otherwise the most
/// bigram-similar candidate is taken, provided it clears the similarity
/// floor; ties keep the earlier candidate.
pub fn best_match<'a>(name: &str, candidates: &'a [Summary]) -> Option<&'a Summary> {
    let wanted = normalize_name(name);
    if let Some(exact) = candidates
        .iter()
        .find(|c| normalize_name(&c.title) == wanted)
    {
        return Some(exact);
    }

    candidates
        .iter()
        .map(|c| (bigram_similarity(name, &c.title), c))
        .filter(|(score, _)| *score >= MIN_MATCH_SIMILARITY)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c)
}

/// Enrich every named record in place, returning how many got a summary
///
/// Lookups run in parallel; record order is untouched. Unnamed records and
/// failed lookups are skipped.
pub fn enrich_features(records: &mut [FeatureRecord], source: &dyn SummarySource) -> usize {
    records
        .par_iter_mut()
        .map(|record| {
            let Some(name) = record.name.as_deref() else {
                return 0usize;
            };
            match source.search(name) {
                Ok(candidates) => match best_match(name, &candidates) {
                    Some(summary) => {
                        record.summary = Some(summary.clone());
                        1
                    }
                    None => {
                        tracing::debug!(name, "no confident summary match");
                        0
                    }
                },
                Err(err) => {
                    tracing::warn!(name, error = %err, "summary lookup failed, skipping");
                    0
                }
            }
        })
        .sum()
}

/// Lowercase, alphanumeric-only, single-space-separated form of a name
fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Dice coefficient over character bigrams of the normalized names
fn bigram_similarity(a: &str, b: &str) -> f64 {
    let a_grams = bigrams(&normalize_name(a));
    let b_grams = bigrams(&normalize_name(b));
    if a_grams.is_empty() || b_grams.is_empty() {
        return 0.0;
    }
    let shared = a_grams.intersection(&b_grams).count();
    2.0 * shared as f64 / (a_grams.len() + b_grams.len()) as f64
}

fn bigrams(s: &str) -> BTreeSet<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}
