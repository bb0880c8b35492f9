//! Search → fetch → parse → filter.
//!
//! Search failures are fatal. Detail failures are not: a failed or malformed
//! batch costs only the papers it could not deliver, and those are reported in
//! [`RunReport::skipped`]. A run where every paper was skipped is an error.

use crate::error::{PapersError, Result};
use crate::filter::AffiliationFilter;
use crate::models::{FilterResult, PaperRecord};
use crate::parser;
use crate::pubmed::{FetchOutcome, PubmedClient};
use std::collections::HashSet;
use tracing::{info, warn};

/// A paper that could not be fetched or decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPaper {
    pub id: String,
    pub reason: String,
}

/// Outcome of a full run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Ids returned by the search
    pub total_ids: usize,
    /// Records successfully parsed
    pub parsed: usize,
    pub results: Vec<FilterResult>,
    pub skipped: Vec<SkippedPaper>,
}

impl RunReport {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Run the whole pipeline for one query
pub async fn run(
    client: &PubmedClient,
    filter: &AffiliationFilter,
    query: &str,
    max_results: usize,
) -> Result<RunReport> {
    let ids = client.search(query, max_results).await?;
    let (records, skipped) = fetch_records(client, &ids).await;

    for paper in &skipped {
        warn!(id = %paper.id, reason = %paper.reason, "Skipped paper");
    }

    if records.is_empty() {
        if let Some(first) = skipped.first() {
            return Err(PapersError::FetchFailed {
                count: skipped.len(),
                reason: first.reason.clone(),
            });
        }
    }

    let results = filter.filter(&records);

    info!(
        ids = ids.len(),
        parsed = records.len(),
        skipped = skipped.len(),
        matched = results.len(),
        "Pipeline complete"
    );

    Ok(RunReport {
        total_ids: ids.len(),
        parsed: records.len(),
        results,
        skipped,
    })
}

/// Fetch and parse records for `ids`.
///
/// A multi-id batch that fails to decode is refetched one id at a time, so a
/// single bad article does not take its whole batch down with it.
pub async fn fetch_records(
    client: &PubmedClient,
    ids: &[String],
) -> (Vec<PaperRecord>, Vec<SkippedPaper>) {
    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for FetchOutcome { ids: batch, payload } in client.fetch_details(ids).await {
        let parsed = payload.and_then(|body| parse_batch(&batch, &body));

        match parsed {
            Ok(papers) => collect_batch(&batch, papers, &mut records, &mut skipped),
            Err(e @ PapersError::MalformedResponse { .. }) if batch.len() > 1 => {
                warn!(
                    ids = batch.len(),
                    error = %e,
                    "Malformed batch, refetching ids individually"
                );
                for id in &batch {
                    let single = std::slice::from_ref(id);
                    let result = client
                        .fetch_batch(single)
                        .await
                        .and_then(|body| parse_batch(single, &body));
                    match result {
                        Ok(papers) => collect_batch(single, papers, &mut records, &mut skipped),
                        Err(e) => skipped.push(SkippedPaper {
                            id: id.clone(),
                            reason: e.to_string(),
                        }),
                    }
                }
            }
            Err(e) => {
                let reason = e.to_string();
                skipped.extend(batch.into_iter().map(|id| SkippedPaper {
                    id,
                    reason: reason.clone(),
                }));
            }
        }
    }

    (records, skipped)
}

/// Parse a payload, labelling decode errors with the requested ids
fn parse_batch(ids: &[String], body: &str) -> Result<Vec<PaperRecord>> {
    parser::parse(body).map_err(|e| match e {
        PapersError::MalformedResponse { message, .. } => PapersError::MalformedResponse {
            id: ids.join(","),
            message,
        },
        other => other,
    })
}

/// Keep parsed papers and record requested ids the payload left out
fn collect_batch(
    requested: &[String],
    papers: Vec<PaperRecord>,
    records: &mut Vec<PaperRecord>,
    skipped: &mut Vec<SkippedPaper>,
) {
    let returned: HashSet<&str> = papers.iter().map(|p| p.id.as_str()).collect();
    for id in requested {
        if !returned.contains(id.as_str()) {
            skipped.push(SkippedPaper {
                id: id.clone(),
                reason: "Missing from efetch response".to_string(),
            });
        }
    }
    records.extend(papers);
}
