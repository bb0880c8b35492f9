//! CSV and console rendering of filtered papers.

use crate::error::Result;
use crate::models::FilterResult;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// CSV header row
pub const CSV_HEADERS: [&str; 6] = [
    "PubmedID",
    "Title",
    "Publication Date",
    "Non-academic Author(s)",
    "Company Affiliation(s)",
    "Corresponding Author Email",
];

/// Separator for multi-valued cells
const LIST_SEPARATOR: &str = "; ";

/// Placeholder for a missing email
const MISSING: &str = "N/A";

/// Where results go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    File(PathBuf),
    Stdout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Comma-separated values with a header row
    #[default]
    Csv,
    /// Human-readable table
    Table,
}

/// One output row
#[derive(Debug, Serialize)]
struct CsvRow {
    pubmed_id: String,
    title: String,
    publication_date: String,
    industry_authors: String,
    company_affiliations: String,
    corresponding_email: String,
}

impl From<&FilterResult> for CsvRow {
    fn from(r: &FilterResult) -> Self {
        Self {
            pubmed_id: r.paper.id.clone(),
            title: r.paper.title.clone(),
            publication_date: r
                .paper
                .publication_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            industry_authors: r.industry_authors.join(LIST_SEPARATOR),
            company_affiliations: r
                .matched_affiliations
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
            corresponding_email: r
                .paper
                .corresponding_email()
                .unwrap_or(MISSING)
                .to_string(),
        }
    }
}

impl CsvRow {
    fn cells(&self) -> [&str; 6] {
        [
            &self.pubmed_id,
            &self.title,
            &self.publication_date,
            &self.industry_authors,
            &self.company_affiliations,
            &self.corresponding_email,
        ]
    }
}

/// Write results to a file or stdout
pub fn write(results: &[FilterResult], destination: &Destination, format: OutputFormat) -> Result<()> {
    match destination {
        Destination::Stdout => {
            let stdout = io::stdout();
            write_to(results, stdout.lock(), format)
        }
        Destination::File(path) => {
            let file = File::create(path)?;
            write_to(results, BufWriter::new(file), format)?;
            info!(path = ?path, rows = results.len(), "Results saved");
            Ok(())
        }
    }
}

/// Write results to any writer
pub fn write_to<W: Write>(results: &[FilterResult], writer: W, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Csv => write_csv(results, writer),
        OutputFormat::Table => write_table(results, writer),
    }
}

fn write_csv<W: Write>(results: &[FilterResult], writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    wtr.write_record(CSV_HEADERS)?;
    for result in results {
        wtr.serialize(CsvRow::from(result))?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_table<W: Write>(results: &[FilterResult], mut writer: W) -> Result<()> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(CSV_HEADERS.to_vec());

    for result in results {
        table.add_row(CsvRow::from(result).cells().to_vec());
    }

    writeln!(writer, "{table}")?;
    writer.flush()?;
    Ok(())
}

/// Read the PubmedID column back from a CSV file
pub fn read_ids(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut ids = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(id) = record.get(0) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}
