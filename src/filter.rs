// Filter engine: option derivation and predicate filtering over listings

use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::{FilterCriteria, Listing};

// Distinct values offered in the brand / size dropdowns
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct FilterOptions {
    pub brands: Vec<String>,
    pub sizes: Vec<String>,
}

// Collects non-empty direct `brand` / `size` values, deduplicated and sorted.
// Direct fields only, same as the predicate in `matches`.
pub fn derive_options(listings: &[Listing]) -> FilterOptions {
    let distinct = |pick: fn(&Listing) -> Option<&String>| -> Vec<String> {
        listings
            .iter()
            .filter_map(pick)
            .filter(|v| !v.is_empty())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    };

    FilterOptions {
        brands: distinct(|l| l.brand.as_ref()),
        sizes: distinct(|l| l.size.as_ref()),
    }
}

fn constraint(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl FilterCriteria {
    pub fn is_unconstrained(&self) -> bool {
        constraint(&self.brand).is_none()
            && constraint(&self.size).is_none()
            && self.price_min.is_none()
            && self.price_max.is_none()
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        let brand_ok = constraint(&self.brand).is_none_or(|b| listing.brand.as_deref() == Some(b));
        let size_ok = constraint(&self.size).is_none_or(|s| listing.size.as_deref() == Some(s));

        let min = self.price_min.unwrap_or(0.0);
        let max = self.price_max.unwrap_or(f64::INFINITY);
        let price = listing.price_or_zero();
        let price_ok = price >= min && price <= max;

        brand_ok && size_ok && price_ok
    }
}

// Pure: never mutates the input, always returns a (possibly empty) subset in input order
pub fn apply_filter(listings: &[Listing], criteria: &FilterCriteria) -> Vec<Listing> {
    let filtered: Vec<Listing> = listings
        .iter()
        .filter(|listing| criteria.matches(listing))
        .cloned()
        .collect();
    tracing::debug!(
        total = listings.len(),
        kept = filtered.len(),
        ?criteria,
        "Applied listing filter"
    );
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bike(brand: Option<&str>, size: Option<&str>, price: Option<f64>) -> Listing {
        Listing {
            title: format!("{:?} {:?}", brand, size),
            brand: brand.map(String::from),
            size: size.map(String::from),
            price,
            ..Default::default()
        }
    }

    fn sample() -> Vec<Listing> {
        vec![
            bike(Some("Trek"), Some("M"), Some(500.0)),
            bike(Some("Kross"), Some("L"), Some(1500.0)),
            bike(None, Some("M"), None),
            bike(Some("Trek"), Some(""), Some(3200.0)),
            bike(Some("Author"), None, Some(0.0)),
        ]
    }

    #[test]
    fn brand_filter_keeps_only_matching_listing() {
        let listings = vec![
            bike(Some("Trek"), None, Some(500.0)),
            bike(Some("Kross"), None, Some(1500.0)),
        ];
        let criteria = FilterCriteria {
            brand: Some("Trek".into()),
            ..Default::default()
        };
        let result = apply_filter(&listings, &criteria);
        assert_eq!(result, vec![listings[0].clone()]);
    }

    #[test]
    fn empty_criteria_returns_everything_in_order() {
        let listings = sample();
        assert_eq!(apply_filter(&listings, &FilterCriteria::default()), listings);

        let blank_strings = FilterCriteria {
            brand: Some(String::new()),
            size: Some(String::new()),
            ..Default::default()
        };
        assert!(blank_strings.is_unconstrained());
        assert_eq!(apply_filter(&listings, &blank_strings), listings);
    }

    #[test]
    fn filter_is_idempotent_and_a_subset() {
        let listings = sample();
        let criteria = FilterCriteria {
            size: Some("M".into()),
            price_max: Some(1000.0),
            ..Default::default()
        };
        let once = apply_filter(&listings, &criteria);
        let twice = apply_filter(&once, &criteria);
        assert_eq!(once, twice);
        assert!(once.iter().all(|l| listings.contains(l)));
        assert!(once.iter().all(|l| criteria.matches(l)));
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn missing_price_counts_as_zero() {
        let listings = sample();
        let with_min = FilterCriteria {
            price_min: Some(1.0),
            ..Default::default()
        };
        let kept = apply_filter(&listings, &with_min);
        assert!(kept.iter().all(|l| l.price_or_zero() >= 1.0));
        assert_eq!(kept.len(), 3);

        let zero_min = FilterCriteria {
            price_min: Some(0.0),
            price_max: Some(100.0),
            ..Default::default()
        };
        assert_eq!(apply_filter(&listings, &zero_min).len(), 2);
    }

    #[test]
    fn price_bounds_are_inclusive() {
        let listings = sample();
        let exact = FilterCriteria {
            price_min: Some(1500.0),
            price_max: Some(1500.0),
            ..Default::default()
        };
        let kept = apply_filter(&listings, &exact);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].brand.as_deref(), Some("Kross"));
    }

    #[test]
    fn options_are_distinct_sorted_and_non_empty() {
        let options = derive_options(&sample());
        assert_eq!(options.brands, vec!["Author", "Kross", "Trek"]);
        assert_eq!(options.sizes, vec!["L", "M"]);
    }
}
