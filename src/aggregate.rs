// Backend-side statistics aggregation over stored listings
//
// summarize() covers what the scraper can know (prices, brands, locations);
// enhance() adds the sections that only exist once listings carry ai_analysis.

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;

use crate::models::{Listing, PriceStats, PriceTable, StatisticsSummary, Tally, UsedVsNew, ValueAssessment};

const DATE_FORMATS: [&str; 4] = ["%d-%m-%Y", "%Y-%m-%d", "%d.%m.%Y", "%Y.%m.%d"];
const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September", "October",
    "November", "December",
];

fn bump(tally: &mut Tally, key: &str) {
    *tally.entry(key.to_string()).or_insert(0) += 1;
}

// Descending by count; ties keep first-seen order
fn ranked(mut tally: Tally) -> Tally {
    tally.sort_by(|_, a, _, b| b.cmp(a));
    tally
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn price_stats(listings: &[Listing]) -> Option<PriceStats> {
    let mut prices: Vec<f64> = listings.iter().filter_map(Listing::known_price).collect();
    if prices.is_empty() {
        return None;
    }
    prices.sort_by(f64::total_cmp);
    Some(PriceStats {
        mean: prices.iter().sum::<f64>() / prices.len() as f64,
        median: median(&prices),
        min: prices[0],
        max: prices[prices.len() - 1],
    })
}

pub fn summarize(listings: &[Listing]) -> StatisticsSummary {
    let mut brands = Tally::new();
    let mut locations = Tally::new();
    let mut sizes = 0u64;

    for listing in listings {
        if let Some(brand) = non_empty(&listing.brand) {
            bump(&mut brands, brand);
        }
        if let Some(location) = non_empty(&listing.location) {
            bump(&mut locations, location);
        }
        if non_empty(&listing.size).is_some() {
            sizes += 1;
        }
    }

    StatisticsSummary {
        price_stats: price_stats(listings),
        total_listings: Some(listings.len() as u64),
        identified_brands: Some(brands.values().sum()),
        identified_sizes: Some(sizes),
        brand_counts: Some(ranked(brands)),
        location_counts: Some(ranked(locations)),
        ..Default::default()
    }
}

// Running sum + count for an average over priced listings only
#[derive(Default)]
struct Average {
    sum: f64,
    count: u64,
}

impl Average {
    fn add(&mut self, price: Option<f64>) {
        if let Some(price) = price {
            self.sum += price;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

fn averages(table: IndexMap<String, Average>) -> PriceTable {
    table
        .into_iter()
        .filter_map(|(key, avg)| avg.value().map(|v| (key, v)))
        .collect()
}

fn month_of(date_added: &str) -> Option<u32> {
    let trimmed = date_added.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .map(|date| date.month0())
}

fn is_new_condition(condition: &str) -> bool {
    matches!(condition.trim().to_lowercase().as_str(), "nowy" | "nowe" | "new")
}

// Adds the AI-derived sections on top of `base`. Sections are present (possibly
// empty) after this call, matching what the dashboard expects from an enriched run.
pub fn enhance(mut base: StatisticsSummary, listings: &[Listing]) -> StatisticsSummary {
    let mut bike_types = Tally::new();
    let mut frame_materials = Tally::new();
    let mut wheel_sizes = Tally::new();
    let mut conditions = Tally::new();
    let mut by_type: IndexMap<String, Average> = IndexMap::new();
    let mut by_brand: IndexMap<String, Average> = IndexMap::new();
    let (mut new, mut used) = (Average::default(), Average::default());
    let (mut new_count, mut used_count) = (0u64, 0u64);
    let mut assessments: Tally = [ValueAssessment::Fair, ValueAssessment::Overpriced, ValueAssessment::Underpriced]
        .iter()
        .map(|a| (a.as_str().to_string(), 0))
        .collect();
    let mut months = [0u64; 12];
    let (mut identified_types, mut identified_condition) = (0u64, 0u64);

    for listing in listings {
        let price = listing.known_price();
        let analysis = listing.ai_analysis.as_ref();

        if let Some(details) = analysis.and_then(|a| a.details()) {
            if let Some(kind) = non_empty(&details.bicycle_type) {
                identified_types += 1;
                bump(&mut bike_types, kind);
                by_type.entry(kind.to_string()).or_default().add(price);
            }
            if let Some(material) = non_empty(&details.frame_material) {
                bump(&mut frame_materials, material);
            }
            if let Some(wheel) = non_empty(&details.wheel_size) {
                bump(&mut wheel_sizes, wheel);
            }
            if let Some(condition) = non_empty(&details.condition) {
                identified_condition += 1;
                bump(&mut conditions, condition);
                if is_new_condition(condition) {
                    new_count += 1;
                    new.add(price);
                } else {
                    used_count += 1;
                    used.add(price);
                }
            }
        }

        if let Some(brand) = non_empty(&listing.brand) {
            by_brand.entry(brand.to_string()).or_default().add(price);
        }

        if let Some(assessment) = analysis.and_then(|a| a.assessment()) {
            bump(&mut assessments, assessment.as_str());
        }

        if let Some(month) = listing.date_added.as_deref().and_then(month_of) {
            months[month as usize] += 1;
        }
    }

    let monthly: Tally = MONTHS
        .iter()
        .zip(months)
        .filter(|(_, count)| *count > 0)
        .map(|(name, count)| (name.to_string(), count))
        .collect();

    base.bicycle_type_counts = Some(ranked(bike_types));
    base.avg_price_by_type = Some(averages(by_type));
    base.avg_price_by_brand = Some(averages(by_brand));
    base.frame_material_counts = Some(ranked(frame_materials));
    base.wheel_size_counts = Some(ranked(wheel_sizes));
    base.condition_counts = Some(ranked(conditions));
    base.used_vs_new = Some(UsedVsNew {
        new: new_count,
        used: used_count,
        avg_price_new: new.value(),
        avg_price_used: used.value(),
    });
    base.value_assessment_counts = Some(assessments);
    base.monthly_counts = Some(monthly);
    base.identified_bike_types = Some(identified_types);
    base.identified_condition = Some(identified_condition);
    base
}

// Keeps every section of `primary`, borrowing the ones it lacks from `fallback`
pub fn fill_missing(primary: StatisticsSummary, fallback: StatisticsSummary) -> StatisticsSummary {
    StatisticsSummary {
        price_stats: primary.price_stats.or(fallback.price_stats),
        total_listings: primary.total_listings.or(fallback.total_listings),
        identified_brands: primary.identified_brands.or(fallback.identified_brands),
        identified_sizes: primary.identified_sizes.or(fallback.identified_sizes),
        identified_bike_types: primary.identified_bike_types.or(fallback.identified_bike_types),
        identified_condition: primary.identified_condition.or(fallback.identified_condition),
        brand_counts: primary.brand_counts.or(fallback.brand_counts),
        location_counts: primary.location_counts.or(fallback.location_counts),
        bicycle_type_counts: primary.bicycle_type_counts.or(fallback.bicycle_type_counts),
        avg_price_by_type: primary.avg_price_by_type.or(fallback.avg_price_by_type),
        avg_price_by_brand: primary.avg_price_by_brand.or(fallback.avg_price_by_brand),
        frame_material_counts: primary.frame_material_counts.or(fallback.frame_material_counts),
        wheel_size_counts: primary.wheel_size_counts.or(fallback.wheel_size_counts),
        condition_counts: primary.condition_counts.or(fallback.condition_counts),
        used_vs_new: primary.used_vs_new.or(fallback.used_vs_new),
        value_assessment_counts: primary.value_assessment_counts.or(fallback.value_assessment_counts),
        monthly_counts: primary.monthly_counts.or(fallback.monthly_counts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listings() -> Vec<Listing> {
        serde_json::from_value(json!([
            {
                "title": "Kross Esker 4.0", "price": 4000, "url": "a", "brand": "Kross",
                "location": "Kraków", "size": "M", "date_added": "12-03-2024",
                "ai_analysis": {
                    "parsed_details": { "bicycle_type": "gravel", "condition": "Używany", "frame_material": "aluminium" },
                    "category": { "primary_category": "gravel" },
                    "value": { "value_analysis": { "value_assessment": "fair" } }
                }
            },
            {
                "title": "Kross Esker 2.0", "price": 2000, "url": "b", "brand": "Kross",
                "location": "Kraków", "date_added": "2024-01-20",
                "ai_analysis": {
                    "parsed_details": { "bicycle_type": "gravel", "condition": "Nowy", "wheel_size": "28\"" },
                    "value": { "value_analysis": { "value_assessment": "overpriced" } }
                }
            },
            {
                "title": "Trek", "price": 0, "url": "c", "brand": "Trek", "location": "Gdańsk",
                "date_added": "wczoraj",
                "ai_analysis": { "error": "No description available" }
            }
        ]))
        .unwrap()
    }

    #[test]
    fn summarize_counts_and_prices() {
        let summary = summarize(&listings());
        assert_eq!(summary.total_listings, Some(3));
        assert_eq!(summary.identified_brands, Some(3));
        assert_eq!(summary.identified_sizes, Some(1));
        let prices = summary.price_stats.unwrap();
        assert_eq!((prices.mean, prices.median, prices.min, prices.max), (3000.0, 3000.0, 2000.0, 4000.0));
        let brands: Vec<(&str, u64)> = summary
            .brand_counts
            .as_ref()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        assert_eq!(brands, vec![("Kross", 2), ("Trek", 1)]);
    }

    #[test]
    fn median_of_odd_count() {
        let listings: Vec<Listing> = [3.0, 1.0, 10.0]
            .iter()
            .map(|p| Listing { price: Some(*p), ..Default::default() })
            .collect();
        assert_eq!(price_stats(&listings).unwrap().median, 3.0);
        assert_eq!(price_stats(&[]), None);
    }

    #[test]
    fn enhance_adds_ai_sections() {
        let stats = enhance(StatisticsSummary::default(), &listings());
        assert_eq!(stats.identified_bike_types, Some(2));
        assert_eq!(stats.identified_condition, Some(2));
        assert_eq!(stats.bicycle_type_counts.as_ref().unwrap()["gravel"], 2);
        assert_eq!(stats.avg_price_by_type.as_ref().unwrap()["gravel"], 3000.0);
        // the unpriced Trek does not drag its brand average to zero
        let by_brand = stats.avg_price_by_brand.as_ref().unwrap();
        assert_eq!(by_brand["Kross"], 3000.0);
        assert!(!by_brand.contains_key("Trek"));

        let split = stats.used_vs_new.unwrap();
        assert_eq!((split.new, split.used), (1, 1));
        assert_eq!(split.avg_price_new, Some(2000.0));
        assert_eq!(split.avg_price_used, Some(4000.0));

        let values = stats.value_assessment_counts.as_ref().unwrap();
        assert_eq!((values["fair"], values["overpriced"], values["underpriced"]), (1, 1, 0));
    }

    #[test]
    fn monthly_counts_are_chronological() {
        let stats = enhance(StatisticsSummary::default(), &listings());
        let months: Vec<&str> = stats.monthly_counts.as_ref().unwrap().keys().map(String::as_str).collect();
        assert_eq!(months, vec!["January", "March"]);
    }

    #[test]
    fn fill_missing_prefers_primary() {
        let primary = StatisticsSummary {
            total_listings: Some(99),
            ..Default::default()
        };
        let merged = fill_missing(primary, summarize(&listings()));
        assert_eq!(merged.total_listings, Some(99));
        assert_eq!(merged.identified_sizes, Some(1));
    }
}
