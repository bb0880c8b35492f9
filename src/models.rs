//! Typed records produced by the parser and consumed by the filter and writer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single PubMed article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PaperRecord {
    /// PubMed id (PMID)
    pub id: String,
    pub title: String,
    pub publication_date: Option<PublicationDate>,
    /// Authors in listed order
    pub authors: Vec<Author>,
}

impl PaperRecord {
    /// Email of the corresponding author, if one was found
    pub fn corresponding_email(&self) -> Option<&str> {
        self.authors
            .iter()
            .find(|a| a.is_corresponding)
            .and_then(|a| a.email.as_deref())
    }
}

/// Author of a paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Author {
    /// "ForeName LastName" or the collective name
    pub name: String,
    /// Affiliation strings in listed order (empty when none were given)
    pub affiliations: Vec<String>,
    /// First email address found in the affiliation text
    pub email: Option<String>,
    pub is_corresponding: bool,
}

impl Author {
    /// Primary affiliation
    pub fn affiliation(&self) -> Option<&str> {
        self.affiliations.first().map(String::as_str)
    }
}

/// Publication date with the precision PubMed provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicationDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl PublicationDate {
    pub fn new(year: i32, month: Option<u32>, day: Option<u32>) -> Self {
        // A day without a month is meaningless
        let day = month.and(day);
        Self { year, month, day }
    }

    /// Full calendar date, when year, month and day are all known and valid
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month?, self.day?)
    }
}

impl fmt::Display for PublicationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.month, self.day) {
            (Some(m), Some(d)) => write!(f, "{:04}-{:02}-{:02}", self.year, m, d),
            (Some(m), None) => write!(f, "{:04}-{:02}", self.year, m),
            _ => write!(f, "{:04}", self.year),
        }
    }
}

/// A paper retained by the affiliation filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterResult {
    pub paper: PaperRecord,
    /// Affiliations that triggered inclusion (sorted, deduplicated)
    pub matched_affiliations: BTreeSet<String>,
    /// Names of authors with a matching affiliation, in author order
    pub industry_authors: Vec<String>,
}
