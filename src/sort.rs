// Sort engine: orders listings by one field and direction
//
// Values come from the listing's direct field. Missing or falsy values sort as the
// number 0, and numbers order before any text, so a listing without a brand lands
// ahead of every branded one when sorting by brand ascending.

use std::cmp::Ordering;

use crate::fields::{self, FieldValue};
use crate::models::{Listing, SortCriteria, SortDirection};

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
}

fn sort_key(listing: &Listing, field: &str) -> SortKey {
    match fields::direct_value(listing, field) {
        Some(value) if !value.is_falsy() => match value {
            FieldValue::Number(n) => SortKey::Number(n),
            FieldValue::Text(s) => SortKey::Text(s),
        },
        _ => SortKey::Number(0.0),
    }
}

fn compare_keys(a: &SortKey, b: &SortKey) -> Ordering {
    match (a, b) {
        (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(y),
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
        (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
    }
}

// In place. Ties keep no guaranteed relative order
pub fn sort_listings(listings: &mut [Listing], field: &str, direction: SortDirection) {
    // Extract each key once
    let mut keyed: Vec<(SortKey, Listing)> = listings
        .iter_mut()
        .map(|l| (sort_key(l, field), std::mem::take(l)))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| match direction {
        SortDirection::Asc => compare_keys(a, b),
        SortDirection::Desc => compare_keys(b, a),
    });

    for (slot, (_, listing)) in listings.iter_mut().zip(keyed) {
        *slot = listing;
    }
}

// Returns a sorted copy, leaving the caller's collection in its original order
pub fn sorted(listings: &[Listing], criteria: &SortCriteria) -> Vec<Listing> {
    let mut out = listings.to_vec();
    sort_listings(&mut out, &criteria.field, criteria.direction);
    out
}
