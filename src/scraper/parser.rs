//! Listing page parser.
//!
//! The page groups units by storage facility. Each storage block carries its
//! city in an attribute and its name in a heading; each unit row inside it
//! carries its availability in an attribute and its details in child cells:
//!
//! ```html
//! <section class="storage" data-city="Moscow">
//!   <h2 class="storage-name">StorageA</h2>
//!   <table>
//!     <tr class="unit" data-available="true">
//!       <td class="unit-size">Medium</td>
//!       <td class="unit-dimension">2x3 m</td>
//!       <td class="unit-price">4 500 ₽</td>
//!       <td class="unit-description">Ground floor</td>
//!     </tr>
//!   </table>
//! </section>
//! ```
//!
//! The selectors are configurable through [`ListingLayout`], which can be
//! loaded from a JSON file when the site changes its markup.

use std::path::Path;

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use thiserror::Error;

use crate::store::{UnitKey, UnitRecord};

/// Document-level parse failures. Per-row problems are reported as
/// [`SkippedRow`]s instead.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("No storage blocks matched '{0}'; the page layout may have changed")]
    NoStorageBlocks(String),

    #[error("Invalid listing layout in {path}: {reason}")]
    Layout { path: String, reason: String },
}

/// CSS selectors and attribute names describing the listing page.
///
/// Fields left out of a JSON layout keep their default values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListingLayout {
    pub storage_block: String,
    pub city_attr: String,
    pub storage_name: String,
    pub unit_row: String,
    pub available_attr: String,
    pub size: String,
    pub dimension: String,
    pub price: String,
    pub description: String,
}

impl Default for ListingLayout {
    fn default() -> Self {
        Self {
            storage_block: "section.storage".to_owned(),
            city_attr: "data-city".to_owned(),
            storage_name: ".storage-name".to_owned(),
            unit_row: ".unit".to_owned(),
            available_attr: "data-available".to_owned(),
            size: ".unit-size".to_owned(),
            dimension: ".unit-dimension".to_owned(),
            price: ".unit-price".to_owned(),
            description: ".unit-description".to_owned(),
        }
    }
}

impl ListingLayout {
    /// Reads a layout override from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ParseError> {
        let invalid = |reason: String| ParseError::Layout {
            path: path.display().to_string(),
            reason,
        };
        let json = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))
    }
}

/// A storage block or unit row that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// Where the row sits on the page, e.g. `storage 2, unit 5`.
    pub location: String,
    pub reason: String,
}

/// Output of one parse pass.
#[derive(Debug, Default)]
pub struct ParsedListing {
    pub records: Vec<UnitRecord>,
    pub skipped: Vec<SkippedRow>,
}

/// Parser with the layout's selectors compiled once.
#[derive(Debug)]
pub struct ListingParser {
    storage_block: Selector,
    storage_name: Selector,
    unit_row: Selector,
    size: Selector,
    dimension: Selector,
    price: Selector,
    description: Selector,
    layout: ListingLayout,
}

fn compile(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|e| ParseError::Selector {
        selector: selector.to_owned(),
        reason: format!("{e:?}"),
    })
}

impl ListingParser {
    pub fn new(layout: ListingLayout) -> Result<Self, ParseError> {
        Ok(Self {
            storage_block: compile(&layout.storage_block)?,
            storage_name: compile(&layout.storage_name)?,
            unit_row: compile(&layout.unit_row)?,
            size: compile(&layout.size)?,
            dimension: compile(&layout.dimension)?,
            price: compile(&layout.price)?,
            description: compile(&layout.description)?,
            layout,
        })
    }

    /// Parses a listing document into unit records.
    pub fn parse(&self, html: &str) -> Result<ParsedListing, ParseError> {
        let document = Html::parse_document(html);
        let blocks: Vec<ElementRef<'_>> = document.select(&self.storage_block).collect();
        if blocks.is_empty() {
            return Err(ParseError::NoStorageBlocks(self.layout.storage_block.clone()));
        }

        let mut listing = ParsedListing::default();
        for (block_index, block) in blocks.into_iter().enumerate() {
            let block_location = format!("storage {}", block_index + 1);

            let city = block
                .value()
                .attr(&self.layout.city_attr)
                .map(normalize)
                .filter(|c| !c.is_empty());
            let storage_name = self.text_of(block, &self.storage_name);

            let (Some(city), Some(storage_name)) = (city, storage_name) else {
                listing.skipped.push(SkippedRow {
                    location: block_location,
                    reason: "missing city or storage name".to_owned(),
                });
                continue;
            };

            for (row_index, row) in block.select(&self.unit_row).enumerate() {
                let location = format!("{block_location}, unit {}", row_index + 1);
                match self.parse_row(row, &city, &storage_name) {
                    Ok(record) => listing.records.push(record),
                    Err(reason) => listing.skipped.push(SkippedRow { location, reason }),
                }
            }
        }

        Ok(listing)
    }

    fn parse_row(
        &self,
        row: ElementRef<'_>,
        city: &str,
        storage_name: &str,
    ) -> Result<UnitRecord, String> {
        let size = self
            .text_of(row, &self.size)
            .ok_or_else(|| "missing unit size".to_owned())?;

        let available = match row.value().attr(&self.layout.available_attr) {
            // No explicit flag: being listed is the only signal we have.
            None => true,
            Some(raw) => parse_availability(raw)
                .ok_or_else(|| format!("unrecognised availability '{raw}'"))?,
        };

        Ok(UnitRecord {
            key: UnitKey::new(city, storage_name, size),
            dimension: self.text_of(row, &self.dimension).unwrap_or_default(),
            price: self
                .text_of(row, &self.price)
                .and_then(|p| parse_price(&p)),
            available,
            description: self.text_of(row, &self.description).unwrap_or_default(),
        })
    }

    /// Whitespace-normalized text of the first match, if non-empty.
    fn text_of(&self, scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
        scope
            .select(selector)
            .next()
            .map(|el| normalize(&el.text().collect::<String>()))
            .filter(|text| !text.is_empty())
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Interprets an availability flag.
fn parse_availability(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "available" | "free" => Some(true),
        "false" | "0" | "no" | "unavailable" | "occupied" | "busy" => Some(false),
        _ => None,
    }
}

/// Extracts the first number from a price label such as `4 500 ₽`,
/// `1 250,50 руб/мес` or `1,250.50 ₽`.
///
/// Spaces between digit groups are dropped. The last `,` or `.` is the
/// decimal separator when both kinds appear, or when it occurs once and is
/// not followed by exactly three digits; every other separator groups
/// thousands.
fn parse_price(raw: &str) -> Option<f64> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;

    let mut run = String::new();
    let mut chars = raw[start..].chars().peekable();
    while let Some(c) = chars.next() {
        let digit_follows = chars.peek().is_some_and(char::is_ascii_digit);
        match c {
            '0'..='9' => run.push(c),
            ',' | '.' if digit_follows => run.push(c),
            c if c.is_whitespace() && digit_follows => {}
            _ => break,
        }
    }

    let decimal_at = run.rfind([',', '.']).filter(|&at| {
        let separator = &run[at..=at];
        let mixed = run.contains(',') && run.contains('.');
        mixed || (run.matches(separator).count() == 1 && run.len() - at - 1 != 3)
    });

    let number: String = run
        .char_indices()
        .filter_map(|(at, c)| match c {
            '0'..='9' => Some(c),
            _ if Some(at) == decimal_at => Some('.'),
            _ => None,
        })
        .collect();
    number.parse().ok()
}
