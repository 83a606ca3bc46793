// Field resolution for listings.
//
// Scraped listings carry technical attributes in two shapes: lifted onto the
// listing itself (`brand`, `condition`, ...) or only inside the raw
// `parameters` table under the marketplace's own label (`"Marka"`,
// `"Stan"`, ...). `resolve_field` hides that union behind one lookup.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::models::Listing;

// Canonical field name -> marketplace parameter label
static PARAMETER_LABELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("brand", "Marka"),
        ("condition", "Stan"),
        ("color", "Kolor"),
        ("frame_material", "Materiał ramy"),
        ("brake_type", "Typ hamulca"),
        ("derailleur_type", "Rodzaj przerzutki"),
        ("wheel_size", "Rozmiar koła"),
        ("seller_type", "Typ sprzedawcy"),
        ("size", "Rozmiar ramy"),
    ])
});

// Marketplace label for a canonical field, if the parameter table has one.
pub fn parameter_label(canonical: &str) -> Option<&'static str> {
    PARAMETER_LABELS.get(canonical).copied()
}

// A value read straight off the listing, before any fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    // Falsy in the sense the view uses: empty text, zero or NaN.
    pub fn is_falsy(&self) -> bool {
        match self {
            FieldValue::Number(n) => *n == 0.0 || n.is_nan(),
            FieldValue::Text(s) => s.is_empty(),
        }
    }

    pub fn to_display(&self) -> String {
        match self {
            FieldValue::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

fn text(value: &Option<String>) -> Option<FieldValue> {
    value.as_ref().map(|s| FieldValue::Text(s.clone()))
}

// Direct field lookup only. Unknown names fall through to the listing's
// preserved extra keys, so any scalar column the scraper wrote is sortable.
pub fn direct_value(listing: &Listing, field: &str) -> Option<FieldValue> {
    match field {
        "title" => Some(FieldValue::Text(listing.title.clone())),
        "price" => listing.price.map(FieldValue::Number),
        "url" => Some(FieldValue::Text(listing.url.clone())),
        "year" => listing.year.map(|y| FieldValue::Number(y as f64)),
        "location" => text(&listing.location),
        "date_added" => text(&listing.date_added),
        "brand" => text(&listing.brand),
        "size" => text(&listing.size),
        "description" => text(&listing.description),
        "condition" => text(&listing.condition),
        "color" => text(&listing.color),
        "derailleur_type" => text(&listing.derailleur_type),
        "brake_type" => text(&listing.brake_type),
        "frame_material" => text(&listing.frame_material),
        "wheel_size" => text(&listing.wheel_size),
        "seller_type" => text(&listing.seller_type),
        "bike_type" => text(&listing.bike_type),
        "frame_size_desc" => text(&listing.frame_size_desc),
        "gears" => text(&listing.gears),
        "weight" => text(&listing.weight),
        "suspension" => text(&listing.suspension),
        other => match listing.extra.get(other)? {
            serde_json::Value::Number(n) => n.as_f64().map(FieldValue::Number),
            serde_json::Value::String(s) => Some(FieldValue::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(FieldValue::Number(if *b { 1.0 } else { 0.0 })),
            _ => None,
        },
    }
}

// Direct field first, then the parameters table under the field's label.
// Falsy direct values do not shadow the fallback.
pub fn resolve_field(listing: &Listing, canonical: &str) -> Option<FieldValue> {
    if let Some(value) = direct_value(listing, canonical).filter(|v| !v.is_falsy()) {
        return Some(value);
    }
    let label = parameter_label(canonical)?;
    listing
        .parameters
        .as_ref()?
        .get(label)
        .filter(|v| !v.is_empty())
        .map(|v| FieldValue::Text(v.clone()))
}

// Resolved text for display, `-` when the listing has nothing for it.
pub fn display_field(listing: &Listing, canonical: &str) -> String {
    resolve_field(listing, canonical)
        .map(|v| v.to_display())
        .unwrap_or_else(|| "-".to_string())
}
