//! # get_papers_list
//!
//! Fetch PubMed papers with at least one pharmaceutical/biotech-affiliated
//! author and export them as CSV.
//!
//! ## Modules
//!
//! - [`pubmed`] - E-utilities client (esearch/efetch)
//! - [`parser`] - efetch XML to [`models::PaperRecord`]
//! - [`filter`] - Affiliation heuristic
//! - [`output`] - CSV and console table writer
//! - [`pipeline`] - End-to-end run with skip accounting
//! - [`config`] - Settings file and defaults
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use get_papers_list::{config::Settings, filter::AffiliationFilter, pipeline, pubmed::PubmedClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::default();
//!     let client = PubmedClient::from_settings(&settings)?;
//!     let filter = AffiliationFilter::new(&settings.filter)?;
//!     let report = pipeline::run(&client, &filter, "cancer immunotherapy", 20).await?;
//!     println!("Found {} industry papers", report.results.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod pubmed;

pub use error::{PapersError, Result};
