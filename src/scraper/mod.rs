//! Listing scraper.
//!
//! Downloads the storage rental listing, parses it into unit records and
//! upserts them into the unit catalog.

mod fetcher;
mod job;
mod parser;

use thiserror::Error;

pub use fetcher::{HttpFetcher, PageFetcher};
pub use job::{ScrapeReport, Scraper};
pub use parser::{ListingLayout, ListingParser, ParseError, ParsedListing, SkippedRow};

/// Errors that abort a whole scrape cycle.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to parse listing: {0}")]
    Parse(#[from] ParseError),

    #[error("Scrape cancelled")]
    Cancelled,
}
