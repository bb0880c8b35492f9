//! Runtime settings.
//!
//! Settings come from built-in defaults, an optional JSON file and CLI/env
//! overrides applied by the binary. Every field has a default, so a partial
//! config file is valid.

use crate::error::{PapersError, Result};
use crate::pubmed::{DEFAULT_BASE_URL, MAX_RESULTS_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Default config path: `<config_dir>/get-papers-list/config.json`
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join("get-papers-list").join("config.json"))
        .ok_or_else(|| PapersError::Config("Cannot determine config directory".to_string()))
}

/// All settings for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub search: SearchSettings,
    pub filter: FilterSettings,
}

/// E-utilities connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// E-utilities base URL
    pub base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Retries for transient failures (network, 429, 5xx)
    pub max_retries: u32,
    /// First backoff delay, doubled on every retry
    pub initial_backoff_ms: u64,
    /// NCBI API key (raises the rate limit from 3 to 10 requests/s)
    pub api_key: Option<String>,
    /// Contact email sent to NCBI
    pub email: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            max_retries: 3,
            initial_backoff_ms: 500,
            api_key: None,
            email: None,
        }
    }
}

/// Search and fetch sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub max_results: usize,
    /// Ids requested per esearch page
    pub page_size: usize,
    /// Ids per efetch request
    pub batch_size: usize,
    /// Concurrent efetch requests
    pub concurrency: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: 100,
            page_size: 500,
            batch_size: 200,
            concurrency: 3,
        }
    }
}

/// Affiliation heuristic.
///
/// Patterns are case-insensitive regular expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub industry_patterns: Vec<String>,
    pub academic_patterns: Vec<String>,
    /// Industry match wins even when an academic pattern also matches
    pub industry_overrides_academic: bool,
    /// Affiliations matching neither list count as industry
    pub unlisted_is_industry: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        let industry = [
            r"pharmaceutic",
            r"\bpharma\b",
            r"biopharma",
            r"\bbiotech",
            r"therapeutics\b",
            r"\bdiagnostics\b",
            r"\bbiologics\b",
            r"\bbiosciences\b",
            r"\binc\b",
            r"\bltd\b",
            r"\blimited\b",
            r"\bllc\b",
            r"\bgmbh\b",
            r"\bcorp\b",
            r"\bcorporation\b",
            r"\bplc\b",
            r"\b(pfizer|novartis|roche|genentech|merck|astrazeneca|sanofi|glaxosmithkline|gsk|janssen|amgen|gilead|bayer|abbvie|eli lilly|bristol[- ]myers squibb|moderna|biogen|regeneron|takeda|novo nordisk|boehringer ingelheim|daiichi sankyo|astellas|eisai)\b",
        ];
        let academic = [
            r"universi",
            r"\bcollege\b",
            r"\bhospital",
            r"\bschool of\b",
            r"\bfaculty of\b",
            r"\bmedical cent(er|re)\b",
            r"\bcancer cent(er|re)\b",
            r"\bresearch cent(er|re)\b",
            r"\bclinic\b",
            r"\bacademy\b",
            r"\binstitute of\b",
            r"\bnational institutes? of health\b",
            r"\b(cnrs|inserm)\b",
        ];

        Self {
            industry_patterns: industry.iter().map(|s| s.to_string()).collect(),
            academic_patterns: academic.iter().map(|s| s.to_string()).collect(),
            industry_overrides_academic: false,
            unlisted_is_industry: false,
        }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit path must exist. Without one, the default path is used
    /// when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default_path = default_config_path()?;
                if !default_path.exists() {
                    debug!(path = ?default_path, "No config file, using defaults");
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let content = std::fs::read_to_string(&path)?;
        let settings = Self::from_json(&content)?;
        info!(path = ?path, "Loaded config");
        Ok(settings)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check bounds and the base URL
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.http.base_url)
            .map_err(|e| PapersError::Config(format!("Invalid base_url '{}': {}", self.http.base_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PapersError::Config(format!(
                "base_url must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.http.timeout_secs == 0 {
            return Err(PapersError::Config("timeout_secs must be positive".to_string()));
        }

        let search = &self.search;
        check_range("max_results", search.max_results, 1, MAX_RESULTS_LIMIT)?;
        check_range("page_size", search.page_size, 1, MAX_RESULTS_LIMIT)?;
        check_range("batch_size", search.batch_size, 1, 1000)?;
        check_range("concurrency", search.concurrency, 1, 10)?;

        if self.filter.industry_patterns.is_empty() && !self.filter.unlisted_is_industry {
            return Err(PapersError::Config(
                "industry_patterns is empty, no paper could ever match".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_range(name: &str, value: usize, min: usize, max: usize) -> Result<()> {
    if value < min || value > max {
        return Err(PapersError::Validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}
