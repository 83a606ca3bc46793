// Listing store: the canonical collection plus the active filtered/sorted view
//
// The store is plain owned state. Whoever renders the view owns one and passes it
// around; filter and sort results are assigned back here and nowhere else.

use crate::error::CoreError;
use crate::filter::{self, FilterOptions};
use crate::histogram::{self, Histogram};
use crate::models::{FilterCriteria, Listing, SortCriteria};
use crate::sort;

// Outcome of loading a collection. Empty is a normal state, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Empty,
    Loaded(usize),
}

// Decodes a listing collection, rejecting anything that is not a JSON array
pub fn parse_listings(bytes: &[u8]) -> Result<Vec<Listing>, CoreError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    parse_listings_value(value)
}

pub fn parse_listings_value(value: serde_json::Value) -> Result<Vec<Listing>, CoreError> {
    match value {
        serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
        other => Err(CoreError::MalformedInput(format!(
            "expected an array of listings, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListingStore {
    all: Vec<Listing>,
    view: Vec<Listing>,
    filter: FilterCriteria,
    sort: SortCriteria,
}

impl ListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> &[Listing] {
        &self.all
    }

    pub fn view(&self) -> &[Listing] {
        &self.view
    }

    pub fn filter(&self) -> &FilterCriteria {
        &self.filter
    }

    pub fn sort(&self) -> &SortCriteria {
        &self.sort
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    // Swaps the whole collection in one assignment. Used for the initial load
    // and again when an enrichment run returns; never merged field by field.
    pub fn replace(&mut self, listings: Vec<Listing>) -> LoadOutcome {
        self.all = listings;
        self.refresh();
        tracing::info!(listings = self.all.len(), "Listing store replaced");
        if self.all.is_empty() {
            LoadOutcome::Empty
        } else {
            LoadOutcome::Loaded(self.all.len())
        }
    }

    pub fn apply_filter(&mut self, criteria: FilterCriteria) -> &[Listing] {
        self.filter = criteria;
        self.refresh();
        &self.view
    }

    pub fn reset_filters(&mut self) -> &[Listing] {
        self.apply_filter(FilterCriteria::default())
    }

    // Header click on `field`
    pub fn toggle_sort(&mut self, field: &str) -> &[Listing] {
        self.sort.toggle(field);
        sort::sort_listings(&mut self.view, &self.sort.field, self.sort.direction);
        &self.view
    }

    pub fn set_sort(&mut self, criteria: SortCriteria) -> &[Listing] {
        self.sort = criteria;
        sort::sort_listings(&mut self.view, &self.sort.field, self.sort.direction);
        &self.view
    }

    pub fn options(&self) -> FilterOptions {
        filter::derive_options(&self.all)
    }

    // Price distribution over the whole collection, not just the view
    pub fn histogram(&self, bucket_count: usize) -> Histogram {
        histogram::bin(self.all.iter().filter_map(Listing::known_price), bucket_count)
    }

    fn refresh(&mut self) {
        self.view = filter::apply_filter(&self.all, &self.filter);
        sort::sort_listings(&mut self.view, &self.sort.field, self.sort.direction);
    }
}
