//! Pharma/biotech affiliation filter.
//!
//! An affiliation counts as industry when it matches an industry-indicator
//! pattern and no academic-exclusion pattern. A paper is kept when at least
//! one author has such an affiliation. The pattern lists come from
//! [`FilterSettings`] so the heuristic can be tuned without code changes.

use crate::config::FilterSettings;
use crate::error::{PapersError, Result};
use crate::models::{FilterResult, PaperRecord};
use regex::{RegexSet, RegexSetBuilder};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Compiled affiliation heuristic
#[derive(Debug, Clone)]
pub struct AffiliationFilter {
    industry: RegexSet,
    academic: RegexSet,
    industry_overrides_academic: bool,
    unlisted_is_industry: bool,
}

impl AffiliationFilter {
    /// Compile the configured pattern lists.
    pub fn new(settings: &FilterSettings) -> Result<Self> {
        Ok(Self {
            industry: compile("industry", &settings.industry_patterns)?,
            academic: compile("academic", &settings.academic_patterns)?,
            industry_overrides_academic: settings.industry_overrides_academic,
            unlisted_is_industry: settings.unlisted_is_industry,
        })
    }

    /// Classify a single affiliation string
    pub fn is_industry(&self, affiliation: &str) -> bool {
        let affiliation = affiliation.trim();
        if affiliation.is_empty() {
            return false;
        }

        let industry = self.industry.is_match(affiliation);
        let academic = self.academic.is_match(affiliation);

        match (industry, academic) {
            (true, false) => true,
            (true, true) => self.industry_overrides_academic,
            (false, false) => self.unlisted_is_industry,
            (false, true) => false,
        }
    }

    /// Match one paper, returning `None` when no author qualifies
    pub fn matches(&self, paper: &PaperRecord) -> Option<FilterResult> {
        let mut matched_affiliations = BTreeSet::new();
        let mut industry_authors = Vec::new();

        for author in &paper.authors {
            let mut author_matched = false;
            for affiliation in &author.affiliations {
                if self.is_industry(affiliation) {
                    matched_affiliations.insert(affiliation.clone());
                    author_matched = true;
                }
            }
            if author_matched && !author.name.is_empty() {
                industry_authors.push(author.name.clone());
            }
        }

        if matched_affiliations.is_empty() {
            return None;
        }

        debug!(
            id = %paper.id,
            affiliations = matched_affiliations.len(),
            "Paper has industry affiliation"
        );

        Some(FilterResult {
            paper: paper.clone(),
            matched_affiliations,
            industry_authors,
        })
    }

    /// Keep the papers with at least one industry-affiliated author
    pub fn filter(&self, records: &[PaperRecord]) -> Vec<FilterResult> {
        let results: Vec<FilterResult> = records.iter().filter_map(|p| self.matches(p)).collect();
        info!(
            total = records.len(),
            matched = results.len(),
            "Affiliation filter complete"
        );
        results
    }
}

fn compile(kind: &str, patterns: &[String]) -> Result<RegexSet> {
    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .build()
        .map_err(|e| PapersError::Config(format!("Invalid {} pattern: {}", kind, e)))
}
